//! SLF libraries: the game's data archives and the override ("patch") file
//! share one layout.
//!
//! ```text
//! header   532 bytes   name[256] base_path[256] entries used sort version subdirs reserved
//! content  ...         entry payloads
//! footer   280 × n     path[256] offset size reserved[16]
//! ```

pub mod patch;
pub mod slf;

use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image::format::layout;

pub use patch::PatchLibrary;
pub use slf::SlfArchive;

pub const HEADER_SIZE: usize = 532;
pub const ENTRY_SIZE: usize = 280;
const NAME_FIELD: usize = 256;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Library data too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },
    #[error("No entry named {0:?}")]
    EntryNotFound(String),
    #[error("Entry {path:?} spans {offset}+{size}, past the end of {len} bytes")]
    EntryOutOfBounds {
        path: String,
        offset: u32,
        size: u32,
        len: usize,
    },
    #[error("Path {0:?} does not fit in a 256-byte name field")]
    PathTooLong(String),
    #[error("Malformed library record")]
    Layout(#[from] bincode::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct HeaderCounts {
    entries: u32,
    used: u32,
    sort_key: u16,
    version: u16,
    contains_subdirs: u32,
    reserved: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct EntryRecord {
    offset: u32,
    size: u32,
    reserved: [u8; 16],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryHeader {
    pub name: String,
    pub base_path: String,
    pub entries: u32,
    pub used: u32,
    pub sort_key: u16,
    pub version: u16,
    pub contains_subdirs: u32,
}

impl LibraryHeader {
    pub fn read(data: &[u8]) -> Result<Self, ArchiveError> {
        if data.len() < HEADER_SIZE {
            return Err(ArchiveError::TooShort {
                needed: HEADER_SIZE,
                actual: data.len(),
            });
        }
        let counts: HeaderCounts = layout().deserialize(&data[2 * NAME_FIELD..HEADER_SIZE])?;
        Ok(Self {
            name: read_name(&data[..NAME_FIELD]),
            base_path: read_name(&data[NAME_FIELD..2 * NAME_FIELD]),
            entries: counts.entries,
            used: counts.used,
            sort_key: counts.sort_key,
            version: counts.version,
            contains_subdirs: counts.contains_subdirs,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), ArchiveError> {
        write_name(&self.name, out)?;
        write_name(&self.base_path, out)?;
        let counts = HeaderCounts {
            entries: self.entries,
            used: self.used,
            sort_key: self.sort_key,
            version: self.version,
            contains_subdirs: self.contains_subdirs,
            reserved: 0,
        };
        out.extend(layout().serialize(&counts)?);
        Ok(())
    }
}

/// One footer record: where an entry's bytes live inside the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub path: String,
    pub offset: u32,
    pub size: u32,
}

impl LibraryEntry {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset as usize..self.offset as usize + self.size as usize
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), ArchiveError> {
        write_name(&self.path, out)?;
        let record = EntryRecord {
            offset: self.offset,
            size: self.size,
            reserved: [0; 16],
        };
        out.extend(layout().serialize(&record)?);
        Ok(())
    }
}

/// Reads the `count` footer records at the end of `data`.
fn read_entries(data: &[u8], count: usize) -> Result<Vec<LibraryEntry>, ArchiveError> {
    let needed = HEADER_SIZE + count * ENTRY_SIZE;
    if data.len() < needed {
        return Err(ArchiveError::TooShort {
            needed,
            actual: data.len(),
        });
    }

    data[data.len() - count * ENTRY_SIZE..]
        .chunks_exact(ENTRY_SIZE)
        .map(|chunk| -> Result<LibraryEntry, ArchiveError> {
            let record: EntryRecord = layout().deserialize(&chunk[NAME_FIELD..])?;
            Ok(LibraryEntry {
                path: read_name(&chunk[..NAME_FIELD]),
                offset: record.offset,
                size: record.size,
            })
        })
        .collect()
}

fn fold(byte: u8) -> u8 {
    if byte == b'/' {
        b'\\'
    } else {
        byte.to_ascii_uppercase()
    }
}

/// Whether two library paths name the same entry. Matching ignores ASCII
/// case and treats `/` as `\`, the way the game looks files up.
pub fn same_path(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.bytes().zip(b.bytes()).all(|(x, y)| fold(x) == fold(y))
}

/// The normalized form two paths share when [`same_path`] holds.
pub fn path_key(path: &str) -> String {
    path.chars()
        .map(|c| if c == '/' { '\\' } else { c.to_ascii_uppercase() })
        .collect()
}

fn read_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Writes `name` NUL-padded to the fixed field width. One byte is always left
/// for the terminator.
fn write_name(name: &str, out: &mut Vec<u8>) -> Result<(), ArchiveError> {
    let bytes = name.as_bytes();
    if bytes.len() >= NAME_FIELD {
        return Err(ArchiveError::PathTooLong(name.to_string()));
    }
    out.extend_from_slice(bytes);
    out.resize(out.len() + NAME_FIELD - bytes.len(), 0);
    Ok(())
}

/// Resolves game paths through the override library first, then the
/// archive.
#[derive(Debug, Default)]
pub struct DataSource {
    archive: Option<SlfArchive>,
    overrides: PatchLibrary,
}

impl DataSource {
    pub fn new(archive: Option<SlfArchive>, overrides: PatchLibrary) -> Self {
        Self { archive, overrides }
    }

    /// The override for `path` if there is one, else the archive's copy.
    /// A path neither library holds is `Ok(None)`; an archive entry that
    /// points outside the archive is an error.
    pub fn get(&self, path: &str) -> Result<Option<&[u8]>, ArchiveError> {
        if let Some(data) = self.overrides.get(path) {
            return Ok(Some(data));
        }
        let Some(archive) = &self.archive else {
            return Ok(None);
        };
        match archive.extract(path) {
            Ok(data) => Ok(Some(data)),
            Err(ArchiveError::EntryNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn is_overridden(&self, path: &str) -> bool {
        self.overrides.get(path).is_some()
    }

    pub fn archive(&self) -> Option<&SlfArchive> {
        self.archive.as_ref()
    }

    pub fn overrides(&self) -> &PatchLibrary {
        &self.overrides
    }

    pub fn overrides_mut(&mut self) -> &mut PatchLibrary {
        &mut self.overrides
    }
}
