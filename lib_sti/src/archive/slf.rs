use log::{debug, warn};

use super::{read_entries, same_path, ArchiveError, LibraryEntry, LibraryHeader};

/// A read-only data archive. Entries are located through the footer table;
/// lookups ignore ASCII case like the game does.
#[derive(Debug, Clone)]
pub struct SlfArchive {
    header: LibraryHeader,
    entries: Vec<LibraryEntry>,
    data: Vec<u8>,
}

impl SlfArchive {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, ArchiveError> {
        let header = LibraryHeader::read(&data)?;
        let entries = read_entries(&data, header.entries as usize)?;
        debug!(
            "Archive {:?} lists {} entries",
            header.name,
            entries.len()
        );

        let broken = entries
            .iter()
            .filter(|e| e.range().end > data.len())
            .count();
        if broken > 0 {
            warn!("{} archive entries point past the end of the data", broken);
        }

        Ok(Self {
            header,
            entries,
            data,
        })
    }

    pub fn header(&self) -> &LibraryHeader {
        &self.header
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    pub fn find(&self, path: &str) -> Option<&LibraryEntry> {
        self.entries
            .iter()
            .find(|e| same_path(&e.path, path))
    }

    pub fn extract(&self, path: &str) -> Result<&[u8], ArchiveError> {
        let entry = self
            .find(path)
            .ok_or_else(|| ArchiveError::EntryNotFound(path.to_string()))?;
        self.read(entry)
    }

    pub fn extract_index(&self, index: usize) -> Result<&[u8], ArchiveError> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| ArchiveError::EntryNotFound(format!("#{}", index)))?;
        self.read(entry)
    }

    fn read(&self, entry: &LibraryEntry) -> Result<&[u8], ArchiveError> {
        self.data
            .get(entry.range())
            .ok_or_else(|| ArchiveError::EntryOutOfBounds {
                path: entry.path.clone(),
                offset: entry.offset,
                size: entry.size,
                len: self.data.len(),
            })
    }
}
