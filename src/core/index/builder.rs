//! Rebuilds the persistent index directly from the archive tree, for
//! operators recovering from a lost or corrupted `index.sqlite3` (or
//! bootstrapping the index against an archive that predates this tool).
//!
//! Shares the hasher's two-phase fingerprinting and the organizer's
//! promote-before-trust rule for same-size collisions, but the tie-break
//! differs: within a single archive scan there is no "arrival order" to
//! prefer, so ties are broken lexically -- the file with the earlier path
//! is kept in place and every later one sharing its fingerprint is routed
//! to `dup_dir` as a `DestDuplicate`.

use crate::config::Config;
use crate::core::hasher::Hasher;
use crate::core::index::IndexStore;
use crate::core::reporter::ReportSink;
use crate::error::IndexError;
use crate::model::{DigestPhase, ReportRow};
use crate::paths;
use std::fs;
use std::path::{Path, PathBuf};

/// Rebuilds `index` from the files currently under `config.dest`.
pub struct IndexBuilder<'a> {
    config: &'a Config,
    index: &'a dyn IndexStore,
    hasher: &'a Hasher,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(config: &'a Config, index: &'a dyn IndexStore, hasher: &'a Hasher) -> Self {
        Self {
            config,
            index,
            hasher,
        }
    }

    /// Prune stale entries, then walk the archive in lexical order,
    /// fingerprinting and indexing each file. Returns the number of files
    /// newly indexed as canonical (duplicates routed to `dup_dir` don't
    /// count).
    pub fn run(&self, report: &mut ReportSink) -> Result<usize, IndexError> {
        self.index.prune_orphans(&self.config.dest)?;

        let mut files = Vec::new();
        collect_files(&self.config.dest, &self.config.data_dir, &mut files);
        files.sort();

        let mut indexed = 0;
        for path in files {
            if self.index_one(&path, report) {
                indexed += 1;
            }
        }
        Ok(indexed)
    }

    /// Returns `true` if `path` was indexed as canonical.
    fn index_one(&self, path: &Path, report: &mut ReportSink) -> bool {
        let mut fp = match self.hasher.fingerprint(path) {
            Ok(fp) => fp,
            Err(e) => {
                emit_error(report, path, "HashReadFailed", &e.to_string());
                return false;
            }
        };

        if fp.phase == DigestPhase::Tail {
            match self.index.entries_of_size(fp.size) {
                Ok(candidates) if !candidates.is_empty() => {
                    if let Ok(full) = self.hasher.promote(path) {
                        fp = full;
                    }
                    for (_, relpath) in &candidates {
                        let archived_path = self.config.dest.join(relpath);
                        if let Ok(full_candidate) = self.hasher.promote(&archived_path) {
                            let _ = self.index.insert(&full_candidate, relpath);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    emit_error(report, path, "IndexError", &e.to_string());
                    return false;
                }
            }
        }

        if self.config.dry_run {
            return true;
        }

        let relpath = path
            .strip_prefix(&self.config.dest)
            .unwrap_or(path)
            .to_path_buf();

        match self.index.insert(&fp, &relpath) {
            Ok(()) => true,
            Err(IndexError::Conflict { existing, .. }) => {
                self.quarantine_duplicate(path, &existing, report);
                false
            }
            Err(e) => {
                emit_error(report, path, "IndexError", &e.to_string());
                false
            }
        }
    }

    /// `path` duplicates content already canonically indexed at `kept`;
    /// move it to `dup_dir`, preserving its relative directory under the
    /// archive root.
    fn quarantine_duplicate(&self, path: &Path, kept: &Path, report: &mut ReportSink) {
        let rel_dir = path
            .parent()
            .and_then(|p| p.strip_prefix(&self.config.dest).ok())
            .unwrap_or_else(|| Path::new(""));
        let target_dir = self.config.dup_dir.join(rel_dir);

        if let Err(e) = fs::create_dir_all(&target_dir) {
            emit_error(report, path, "CreateDirFailed", &e.to_string());
            return;
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");

        match paths::unique_destination(&target_dir, name, 1000) {
            Some(dst) => match move_file(path, &dst) {
                Ok(()) => {
                    let _ = report.emit(&ReportRow::DestDuplicate {
                        kept: kept.to_path_buf(),
                        discarded: dst,
                    });
                }
                Err(e) => emit_error(report, path, "MoveFailed", &e.to_string()),
            },
            None => emit_error(report, path, "TargetExists", "no free destination name"),
        }
    }
}

fn emit_error(report: &mut ReportSink, path: &Path, kind: &str, detail: &str) {
    let _ = report.emit(&ReportRow::Error {
        src: path.to_path_buf(),
        kind: kind.to_string(),
        detail: detail.to_string(),
    });
}

fn collect_files(dir: &Path, exclude: &Path, out: &mut Vec<PathBuf>) {
    if dir == exclude {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path == exclude {
            continue;
        }
        if path.is_dir() {
            collect_files(&path, exclude, out);
        } else {
            out.push(path);
        }
    }
}

fn move_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    fs::copy(src, dst)?;
    fs::remove_file(src)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::index::MemoryIndex;
    use tempfile::TempDir;

    fn test_config(source: &Path, dest: &Path) -> Config {
        Config::resolve(None, Some(source.to_path_buf()), Some(dest.to_path_buf()), false).unwrap()
    }

    #[test]
    fn indexes_every_distinct_file_in_the_archive() {
        let root = TempDir::new().unwrap();
        let source = root.path().join("source");
        let dest = root.path().join("dest");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(dest.join("2024/03")).unwrap();
        fs::write(dest.join("2024/03/a.jpg"), b"alpha").unwrap();
        fs::write(dest.join("2024/03/b.jpg"), b"bravo").unwrap();

        let config = test_config(&source, &dest);
        let index = MemoryIndex::new();
        let hasher = Hasher::new(config.hash_threshold_bytes(), 1);
        let builder = IndexBuilder::new(&config, &index, &hasher);

        let mut report = ReportSink::create(&config.data_dir, "run-1", false).unwrap();
        let indexed = builder.run(&mut report).unwrap();

        assert_eq!(indexed, 2);
        assert_eq!(index.stats().unwrap().total_entries, 2);
    }

    #[test]
    fn lexically_later_duplicate_is_quarantined() {
        let root = TempDir::new().unwrap();
        let source = root.path().join("source");
        let dest = root.path().join("dest");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(dest.join("2024/03")).unwrap();
        fs::create_dir_all(dest.join("2024/04")).unwrap();
        fs::write(dest.join("2024/03/a.jpg"), b"identical content").unwrap();
        fs::write(dest.join("2024/04/b.jpg"), b"identical content").unwrap();

        let config = test_config(&source, &dest);
        let index = MemoryIndex::new();
        let hasher = Hasher::new(config.hash_threshold_bytes(), 1);
        let builder = IndexBuilder::new(&config, &index, &hasher);

        let mut report = ReportSink::create(&config.data_dir, "run-2", false).unwrap();
        let indexed = builder.run(&mut report).unwrap();

        assert_eq!(indexed, 1);
        assert_eq!(index.stats().unwrap().total_entries, 1);
        assert_eq!(report.counts().dest_duplicate, 1);
        assert!(!dest.join("2024/04/b.jpg").exists());
        assert!(dest.join("2024/03/a.jpg").exists());
        assert!(config.dup_dir.join("2024/04/b.jpg").exists());
    }

    #[test]
    fn dry_run_leaves_archive_and_index_untouched() {
        let root = TempDir::new().unwrap();
        let source = root.path().join("source");
        let dest = root.path().join("dest");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(dest.join("2024/03")).unwrap();
        fs::write(dest.join("2024/03/a.jpg"), b"identical content").unwrap();
        fs::write(dest.join("2024/03/b.jpg"), b"identical content").unwrap();

        let config =
            Config::resolve(None, Some(source), Some(dest.clone()), true).unwrap();
        let index = MemoryIndex::new();
        let hasher = Hasher::new(config.hash_threshold_bytes(), 1);
        let builder = IndexBuilder::new(&config, &index, &hasher);

        let mut report = ReportSink::create(&config.data_dir, "run-3", true).unwrap();
        let indexed = builder.run(&mut report).unwrap();

        assert_eq!(indexed, 2);
        assert_eq!(index.stats().unwrap().total_entries, 0);
        assert!(dest.join("2024/03/b.jpg").exists());
    }
}
