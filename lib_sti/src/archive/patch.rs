use std::collections::BTreeMap;

use log::{debug, info};

use super::{path_key, read_entries, ArchiveError, LibraryEntry, LibraryHeader, HEADER_SIZE};

const DEFAULT_BASE_PATH: &str = "Data\\";
const DEFAULT_SORT_KEY: u16 = 0xFFFF;
const DEFAULT_VERSION: u16 = 0x0200;

/// The override library: replacement files keyed by game path.
///
/// Lookups follow the same path rule as the archive (see
/// [`same_path`](super::same_path)); the spelling an entry was stored under is
/// what gets written. Entries are written sorted, starting right after the
/// header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchLibrary {
    pub name: String,
    pub base_path: String,
    sort_key: u16,
    version: u16,
    contains_subdirs: u32,
    /// Normalized path to (stored path, data)
    content: BTreeMap<String, (String, Vec<u8>)>,
}

impl Default for PatchLibrary {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            sort_key: DEFAULT_SORT_KEY,
            version: DEFAULT_VERSION,
            contains_subdirs: 1,
            content: BTreeMap::new(),
        }
    }
}

impl PatchLibrary {
    pub fn from_bytes(data: &[u8]) -> Result<Self, ArchiveError> {
        let header = LibraryHeader::read(data)?;
        let entries = read_entries(data, header.entries as usize)?;

        let mut content = BTreeMap::new();
        for entry in entries {
            let bytes = data
                .get(entry.range())
                .ok_or_else(|| ArchiveError::EntryOutOfBounds {
                    path: entry.path.clone(),
                    offset: entry.offset,
                    size: entry.size,
                    len: data.len(),
                })?;
            content.insert(path_key(&entry.path), (entry.path, bytes.to_vec()));
        }
        debug!("Override library holds {} entries", content.len());

        Ok(Self {
            name: header.name,
            base_path: header.base_path,
            sort_key: header.sort_key,
            version: header.version,
            contains_subdirs: header.contains_subdirs,
            content,
        })
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.content
            .get(&path_key(path))
            .map(|(_, data)| data.as_slice())
    }

    /// Adds or replaces an override and returns the one it displaced.
    pub fn set(&mut self, path: &str, data: Vec<u8>) -> Result<Option<Vec<u8>>, ArchiveError> {
        if path.len() >= 256 {
            return Err(ArchiveError::PathTooLong(path.to_string()));
        }
        Ok(self
            .content
            .insert(path_key(path), (path.to_string(), data))
            .map(|(_, old)| old))
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.content.remove(&path_key(path)).map(|(_, data)| data)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.content.values().map(|(path, _)| path.as_str())
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Library bytes, or `None` when there is nothing to override and the
    /// file should be removed instead.
    pub fn serialize(&self) -> Result<Option<Vec<u8>>, ArchiveError> {
        if self.content.is_empty() {
            return Ok(None);
        }

        let count = self.content.len() as u32;
        let header = LibraryHeader {
            name: self.name.clone(),
            base_path: self.base_path.clone(),
            entries: count,
            used: count,
            sort_key: self.sort_key,
            version: self.version,
            contains_subdirs: self.contains_subdirs,
        };

        let mut out = Vec::new();
        header.write(&mut out)?;

        let mut entries = Vec::with_capacity(self.content.len());
        for (path, data) in self.content.values() {
            entries.push(LibraryEntry {
                path: path.clone(),
                offset: out.len() as u32,
                size: data.len() as u32,
            });
            out.extend_from_slice(data);
        }
        for entry in &entries {
            entry.write(&mut out)?;
        }

        info!(
            "Serialized override library: {} entries, {} bytes",
            entries.len(),
            out.len()
        );
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::super::ENTRY_SIZE;
    use super::*;

    #[test]
    fn test_empty_library_serializes_to_none() {
        let mut library = PatchLibrary::default();
        assert_eq!(library.serialize().unwrap(), None);

        library.set("A.STI", vec![1]).unwrap();
        library.remove("A.STI");
        assert_eq!(library.serialize().unwrap(), None);
    }

    #[test]
    fn test_content_is_sorted_after_header() {
        let mut library = PatchLibrary::default();
        library.set("B.STI", vec![2, 2]).unwrap();
        library.set("A.STI", vec![1]).unwrap();

        let bytes = library.serialize().unwrap().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 3 + 2 * ENTRY_SIZE);
        assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + 3], &[1, 2, 2]);
        assert_eq!(&bytes[256..261], b"Data\\");
        assert_eq!(&bytes[520..528], &[0xFF, 0xFF, 0x00, 0x02, 1, 0, 0, 0]);

        let footer = &bytes[HEADER_SIZE + 3..];
        assert_eq!(&footer[..5], b"A.STI");
        assert_eq!(&footer[256..264], &[0x14, 0x02, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_round_trip_keeps_entries() {
        let mut library = PatchLibrary::default();
        library.set("FACES\\33.STI", vec![7; 40]).unwrap();
        library.set("FACES\\b_33.STI", vec![8; 3]).unwrap();
        assert_eq!(library.set("FACES\\33.STI", vec![9; 4]).unwrap(), Some(vec![7; 40]));

        let bytes = library.serialize().unwrap().unwrap();
        let reloaded = PatchLibrary::from_bytes(&bytes).unwrap();
        assert_eq!(reloaded, library);
        assert_eq!(reloaded.get("FACES\\33.STI"), Some(&[9u8; 4][..]));
        assert_eq!(
            reloaded.paths().collect::<Vec<_>>(),
            vec!["FACES\\33.STI", "FACES\\b_33.STI"]
        );
    }

    #[test]
    fn test_keys_ignore_case_and_separators() {
        let mut library = PatchLibrary::default();
        library.set("Portraits\\Large\\LVI.sti", vec![1]).unwrap();
        assert_eq!(library.get("PORTRAITS/LARGE/LVI.STI"), Some(&[1u8][..]));

        assert_eq!(
            library.set("PORTRAITS\\LARGE\\LVI.STI", vec![2]).unwrap(),
            Some(vec![1])
        );
        assert_eq!(library.len(), 1);
        assert_eq!(library.remove("portraits\\large\\lvi.sti"), Some(vec![2]));
        assert!(library.is_empty());
    }
}
