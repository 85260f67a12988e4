//! # Hasher Module
//!
//! Two-phase content fingerprinting: files at or under `tail_threshold`
//! bytes are hashed in full; larger files are hashed by their trailing
//! `tail_threshold` bytes only, which is far cheaper for video and avoids
//! reading gigabytes just to detect a duplicate. A `Tail` digest is never
//! trusted alone -- the organizer promotes to `Full` whenever the index
//! already holds another entry of the same size (see
//! [`IndexStore::entries_of_size`](crate::core::index::IndexStore)) before
//! committing a disposition.
//!
//! Hashing runs across a bounded rayon thread pool sized to `hash_workers`;
//! `fingerprint_all` preserves submission order in its output regardless of
//! which worker finishes first, so the organizer's "first wins" duplicate
//! tie-break stays deterministic.

use crate::error::HashError;
use crate::events::{Event, EventSender, HashEvent, HashProgress};
use crate::model::{DigestPhase, Fingerprint};
use md5::{Digest, Md5};
use rayon::prelude::*;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Computes two-phase content fingerprints, optionally in parallel.
pub struct Hasher {
    tail_threshold: u64,
    workers: usize,
}

impl Hasher {
    pub fn new(tail_threshold_bytes: u64, workers: usize) -> Self {
        Self {
            tail_threshold: tail_threshold_bytes,
            workers: workers.max(1),
        }
    }

    /// Fingerprint one file, picking `Full` or `Tail` by its size relative
    /// to `tail_threshold`.
    pub fn fingerprint(&self, path: &Path) -> Result<Fingerprint, HashError> {
        let size = stat_len(path)?;
        if size <= self.tail_threshold {
            self.full(path, size)
        } else {
            self.tail(path, size)
        }
    }

    /// Force a full-content re-hash, used when promoting a `Tail`
    /// fingerprint after a same-size collision in the index.
    pub fn promote(&self, path: &Path) -> Result<Fingerprint, HashError> {
        let size = stat_len(path)?;
        self.full(path, size)
    }

    fn full(&self, path: &Path, size: u64) -> Result<Fingerprint, HashError> {
        let mut file = open(path)?;
        let mut hasher = Md5::new();
        std::io::copy(&mut file, &mut hasher).map_err(|source| HashError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Fingerprint {
            size,
            digest: hasher.finalize().into(),
            phase: DigestPhase::Full,
        })
    }

    fn tail(&self, path: &Path, size: u64) -> Result<Fingerprint, HashError> {
        let mut file = open(path)?;
        let offset = size - self.tail_threshold;
        file.seek(SeekFrom::Start(offset))
            .map_err(|source| HashError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;

        let mut hasher = Md5::new();
        std::io::copy(&mut file, &mut hasher).map_err(|source| HashError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Fingerprint {
            size,
            digest: hasher.finalize().into(),
            phase: DigestPhase::Tail,
        })
    }

    /// Fingerprint every path, across a thread pool bounded to
    /// `hash_workers`. Results are returned in the same order as `paths`.
    pub fn fingerprint_all(
        &self,
        paths: &[PathBuf],
        events: &EventSender,
    ) -> Vec<(PathBuf, Result<Fingerprint, HashError>)> {
        events.send(Event::Hash(HashEvent::Started { total: paths.len() }));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build();

        let completed = AtomicUsize::new(0);
        let total = paths.len();

        let results = match pool {
            Ok(pool) => pool.install(|| {
                paths
                    .par_iter()
                    .map(|path| self.fingerprint_one_reporting(path, &completed, total, events))
                    .collect()
            }),
            Err(_) => paths
                .iter()
                .map(|path| self.fingerprint_one_reporting(path, &completed, total, events))
                .collect(),
        };

        events.send(Event::Hash(HashEvent::Completed {
            total_hashed: total,
        }));
        results
    }

    fn fingerprint_one_reporting(
        &self,
        path: &PathBuf,
        completed: &AtomicUsize,
        total: usize,
        events: &EventSender,
    ) -> (PathBuf, Result<Fingerprint, HashError>) {
        let result = self.fingerprint(path);
        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;

        match &result {
            Ok(_) => events.send(Event::Hash(HashEvent::Progress(HashProgress {
                completed: done,
                total,
                current_path: path.clone(),
            }))),
            Err(e) => events.send(Event::Hash(HashEvent::Error {
                path: path.clone(),
                message: e.to_string(),
            })),
        }

        (path.clone(), result)
    }
}

fn open(path: &Path) -> Result<File, HashError> {
    File::open(path).map_err(|source| HashError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn stat_len(path: &Path) -> Result<u64, HashError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| HashError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::null_sender;
    use tempfile::TempDir;

    #[test]
    fn small_file_gets_full_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"hello world").unwrap();

        let hasher = Hasher::new(10 * 1024 * 1024, 4);
        let fp = hasher.fingerprint(&path).unwrap();
        assert_eq!(fp.phase, DigestPhase::Full);
        assert_eq!(fp.size, 11);
    }

    #[test]
    fn large_file_gets_tail_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mov");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        let hasher = Hasher::new(1024, 4);
        let fp = hasher.fingerprint(&path).unwrap();
        assert_eq!(fp.phase, DigestPhase::Tail);
        assert_eq!(fp.size, 2048);
    }

    #[test]
    fn tail_digest_depends_only_on_trailing_bytes() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.mov");
        let b = dir.path().join("b.mov");

        let mut content_a = vec![1u8; 1024];
        content_a.extend(vec![9u8; 1024]);
        let mut content_b = vec![2u8; 1024];
        content_b.extend(vec![9u8; 1024]);

        std::fs::write(&a, &content_a).unwrap();
        std::fs::write(&b, &content_b).unwrap();

        let hasher = Hasher::new(1024, 4);
        let fp_a = hasher.fingerprint(&a).unwrap();
        let fp_b = hasher.fingerprint(&b).unwrap();

        // differing heads, identical tails -> same tail fingerprint
        assert_eq!(fp_a.key(), fp_b.key());

        // promotion (full hash) distinguishes them
        let full_a = hasher.promote(&a).unwrap();
        let full_b = hasher.promote(&b).unwrap();
        assert_ne!(full_a.key(), full_b.key());
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"deterministic content").unwrap();

        let hasher = Hasher::new(10 * 1024 * 1024, 4);
        let first = hasher.fingerprint(&path).unwrap();
        let second = hasher.fingerprint(&path).unwrap();
        assert_eq!(first.key(), second.key());
    }

    #[test]
    fn fingerprint_all_preserves_submission_order() {
        let dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for i in 0..20 {
            let path = dir.path().join(format!("{}.jpg", i));
            std::fs::write(&path, format!("content-{}", i)).unwrap();
            paths.push(path);
        }

        let hasher = Hasher::new(10 * 1024 * 1024, 4);
        let results = hasher.fingerprint_all(&paths, &null_sender());

        assert_eq!(results.len(), paths.len());
        for (expected, (actual_path, _)) in paths.iter().zip(results.iter()) {
            assert_eq!(expected, actual_path);
        }
    }

    #[test]
    fn fingerprint_all_reports_read_errors_without_losing_other_results() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.jpg");
        std::fs::write(&good, b"ok").unwrap();
        let missing = dir.path().join("missing.jpg");

        let hasher = Hasher::new(10 * 1024 * 1024, 4);
        let results = hasher.fingerprint_all(&[good.clone(), missing.clone()], &null_sender());

        assert!(results.iter().find(|(p, _)| p == &good).unwrap().1.is_ok());
        assert!(results
            .iter()
            .find(|(p, _)| p == &missing)
            .unwrap()
            .1
            .is_err());
    }
}
