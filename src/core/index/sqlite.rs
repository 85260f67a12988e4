//! SQLite-backed index, keyed on `(size, digest)`.
//!
//! Uses WAL (write-ahead logging) mode so readers aren't blocked by
//! in-flight writes. Each insert is committed before the corresponding
//! move is reported as successful (see the organizer), so the index
//! and the report stream never disagree after an abrupt termination.

use super::traits::{IndexStats, IndexStore};
use crate::error::IndexError;
use crate::model::Fingerprint;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct SqliteIndex {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteIndex {
    /// Open or create an index database at the given path.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IndexError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| IndexError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| IndexError::QueryFailed(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS fingerprints (
                size INTEGER NOT NULL,
                digest BLOB NOT NULL,
                archive_relpath TEXT NOT NULL,
                recorded_at INTEGER NOT NULL,
                PRIMARY KEY (size, digest)
            )",
            [],
        )
        .map_err(|e| IndexError::QueryFailed(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    fn now_ts() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, IndexError> {
        self.conn.lock().map_err(|_| IndexError::QueryFailed(format!(
            "index connection at {} poisoned",
            self.db_path.display()
        )))
    }
}

impl IndexStore for SqliteIndex {
    fn lookup(&self, fp: &Fingerprint) -> Result<Option<PathBuf>, IndexError> {
        let conn = self.lock()?;
        let (size, digest) = fp.key();

        let result: Result<String, _> = conn.query_row(
            "SELECT archive_relpath FROM fingerprints WHERE size = ?1 AND digest = ?2",
            params![size as i64, digest.to_vec()],
            |row| row.get(0),
        );

        match result {
            Ok(relpath) => Ok(Some(PathBuf::from(relpath))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(IndexError::QueryFailed(e.to_string())),
        }
    }

    fn insert(&self, fp: &Fingerprint, archive_relpath: &Path) -> Result<(), IndexError> {
        let conn = self.lock()?;
        let (size, digest) = fp.key();
        let relpath_str = archive_relpath.to_string_lossy().to_string();

        let existing: Result<String, _> = conn.query_row(
            "SELECT archive_relpath FROM fingerprints WHERE size = ?1 AND digest = ?2",
            params![size as i64, digest.to_vec()],
            |row| row.get(0),
        );

        match existing {
            Ok(existing_path) if existing_path == relpath_str => return Ok(()),
            Ok(existing_path) => {
                return Err(IndexError::Conflict {
                    existing: PathBuf::from(existing_path),
                    attempted: archive_relpath.to_path_buf(),
                })
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(e) => return Err(IndexError::QueryFailed(e.to_string())),
        }

        conn.execute(
            "INSERT INTO fingerprints (size, digest, archive_relpath, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![size as i64, digest.to_vec(), relpath_str, Self::now_ts()],
        )
        .map_err(|e| IndexError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    fn prune_orphans(&self, root: &Path) -> Result<usize, IndexError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare("SELECT size, digest, archive_relpath FROM fingerprints")
            .map_err(|e| IndexError::QueryFailed(e.to_string()))?;

        let rows: Vec<(i64, Vec<u8>, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .map_err(|e| IndexError::QueryFailed(e.to_string()))?
            .filter_map(|r| r.ok())
            .collect();

        drop(stmt);

        let mut count = 0;
        for (size, digest, relpath) in rows {
            if !root.join(&relpath).exists() {
                conn.execute(
                    "DELETE FROM fingerprints WHERE size = ?1 AND digest = ?2",
                    params![size, digest],
                )
                .map_err(|e| IndexError::QueryFailed(e.to_string()))?;
                count += 1;
            }
        }

        Ok(count)
    }

    fn entries_of_size(&self, size: u64) -> Result<Vec<([u8; 16], PathBuf)>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT digest, archive_relpath FROM fingerprints WHERE size = ?1")
            .map_err(|e| IndexError::QueryFailed(e.to_string()))?;

        let rows: Vec<(Vec<u8>, String)> = stmt
            .query_map(params![size as i64], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| IndexError::QueryFailed(e.to_string()))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows
            .into_iter()
            .filter_map(|(digest, relpath)| {
                let digest: [u8; 16] = digest.try_into().ok()?;
                Some((digest, PathBuf::from(relpath)))
            })
            .collect())
    }

    fn stats(&self) -> Result<IndexStats, IndexError> {
        let conn = self.lock()?;
        let total_entries: usize = conn
            .query_row("SELECT COUNT(*) FROM fingerprints", [], |row| {
                row.get::<_, i64>(0).map(|v| v as usize)
            })
            .map_err(|e| IndexError::QueryFailed(e.to_string()))?;

        Ok(IndexStats { total_entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DigestPhase;
    use tempfile::TempDir;

    fn fp(size: u64, byte: u8) -> Fingerprint {
        Fingerprint {
            size,
            digest: [byte; 16],
            phase: DigestPhase::Full,
        }
    }

    #[test]
    fn sqlite_index_creates_database() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("index.sqlite3");
        let index = SqliteIndex::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(index.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn insert_then_lookup_roundtrips() {
        let dir = TempDir::new().unwrap();
        let index = SqliteIndex::open(&dir.path().join("index.sqlite3")).unwrap();

        let fp = fp(1000, 0xAB);
        index.insert(&fp, Path::new("2024/03/a.jpg")).unwrap();

        let found = index.lookup(&fp).unwrap();
        assert_eq!(found, Some(PathBuf::from("2024/03/a.jpg")));
    }

    #[test]
    fn insert_conflict_on_different_path() {
        let dir = TempDir::new().unwrap();
        let index = SqliteIndex::open(&dir.path().join("index.sqlite3")).unwrap();

        let fp = fp(1000, 0xAB);
        index.insert(&fp, Path::new("2024/03/a.jpg")).unwrap();

        let err = index.insert(&fp, Path::new("2024/03/b.jpg"));
        assert!(matches!(err, Err(IndexError::Conflict { .. })));
    }

    #[test]
    fn insert_same_path_twice_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let index = SqliteIndex::open(&dir.path().join("index.sqlite3")).unwrap();

        let fp = fp(1000, 0xAB);
        index.insert(&fp, Path::new("2024/03/a.jpg")).unwrap();
        index.insert(&fp, Path::new("2024/03/a.jpg")).unwrap();
        assert_eq!(index.stats().unwrap().total_entries, 1);
    }

    #[test]
    fn entries_of_size_finds_same_size_rows_regardless_of_digest() {
        let dir = TempDir::new().unwrap();
        let index = SqliteIndex::open(&dir.path().join("index.sqlite3")).unwrap();

        index.insert(&fp(5_000, 1), Path::new("2024/03/a.jpg")).unwrap();
        index.insert(&fp(5_000, 2), Path::new("2024/03/b.jpg")).unwrap();
        index.insert(&fp(6_000, 3), Path::new("2024/03/c.jpg")).unwrap();

        let same_size = index.entries_of_size(5_000).unwrap();
        assert_eq!(same_size.len(), 2);
    }

    #[test]
    fn prune_orphans_removes_missing_files() {
        let root = TempDir::new().unwrap();
        let index = SqliteIndex::open(&root.path().join(".photox/index.sqlite3")).unwrap();

        std::fs::create_dir_all(root.path().join("2024/03")).unwrap();
        std::fs::write(root.path().join("2024/03/a.jpg"), b"x").unwrap();

        index.insert(&fp(1000, 1), Path::new("2024/03/a.jpg")).unwrap();
        index.insert(&fp(2000, 2), Path::new("2024/03/missing.jpg")).unwrap();

        let removed = index.prune_orphans(root.path()).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(index.stats().unwrap().total_entries, 1);
    }
}
