//! In-memory index backend, used in tests and for `--dry-run` previews
//! where no durable write is wanted.

use super::traits::{IndexStats, IndexStore};
use crate::error::IndexError;
use crate::model::Fingerprint;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryIndex {
    entries: Mutex<HashMap<(u64, [u8; 16]), PathBuf>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexStore for MemoryIndex {
    fn lookup(&self, fp: &Fingerprint) -> Result<Option<PathBuf>, IndexError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(&fp.key()).cloned())
    }

    fn insert(&self, fp: &Fingerprint, archive_relpath: &Path) -> Result<(), IndexError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(&fp.key()) {
            Some(existing) if existing == archive_relpath => Ok(()),
            Some(existing) => Err(IndexError::Conflict {
                existing: existing.clone(),
                attempted: archive_relpath.to_path_buf(),
            }),
            None => {
                entries.insert(fp.key(), archive_relpath.to_path_buf());
                Ok(())
            }
        }
    }

    fn prune_orphans(&self, root: &Path) -> Result<usize, IndexError> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, relpath| root.join(relpath).exists());
        Ok(before - entries.len())
    }

    fn entries_of_size(&self, size: u64) -> Result<Vec<([u8; 16], PathBuf)>, IndexError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|((s, _), _)| *s == size)
            .map(|((_, digest), path)| (*digest, path.clone()))
            .collect())
    }

    fn stats(&self) -> Result<IndexStats, IndexError> {
        Ok(IndexStats {
            total_entries: self.entries.lock().unwrap().len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DigestPhase;

    #[test]
    fn memory_index_insert_lookup() {
        let index = MemoryIndex::new();
        let fp = Fingerprint {
            size: 10,
            digest: [1; 16],
            phase: DigestPhase::Full,
        };
        index.insert(&fp, Path::new("a.jpg")).unwrap();
        assert_eq!(index.lookup(&fp).unwrap(), Some(PathBuf::from("a.jpg")));
    }
}
