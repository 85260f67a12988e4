//! Index backend trait definition.

use crate::error::IndexError;
use crate::model::Fingerprint;
use std::path::{Path, PathBuf};

/// Summary statistics over the index contents.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub total_entries: usize,
}

/// A durable key-value mapping from content fingerprint to archive-relative
/// path. Implementations must make `insert` and `lookup` safe to call from
/// the single-threaded organizer loop; workers never write the index.
pub trait IndexStore: Send + Sync {
    /// Look up the archive path for a fingerprint, if indexed.
    fn lookup(&self, fp: &Fingerprint) -> Result<Option<PathBuf>, IndexError>;

    /// Insert a new mapping. Fails with `IndexError::Conflict` if the key
    /// already maps to a different path; inserting the same key with the
    /// same path is a no-op success.
    fn insert(&self, fp: &Fingerprint, archive_relpath: &Path) -> Result<(), IndexError>;

    /// Remove every entry whose path no longer exists, relative to `root`.
    /// Returns the number of entries removed.
    fn prune_orphans(&self, root: &Path) -> Result<usize, IndexError>;

    /// Every entry sharing `size`, regardless of digest. Used by the
    /// organizer to detect a same-size `Tail` collision that must be
    /// resolved by promoting both sides to a `Full` digest before a
    /// duplicate decision is trusted.
    fn entries_of_size(&self, size: u64) -> Result<Vec<([u8; 16], PathBuf)>, IndexError>;

    /// Current index statistics.
    fn stats(&self) -> Result<IndexStats, IndexError>;
}
