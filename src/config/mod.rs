//! # Config Module
//!
//! Resolves the single `Config` value threaded through every pipeline
//! stage: compiled-in defaults, overlaid with an optional `config.toml`,
//! overlaid with CLI flags. Every path is canonicalized before the
//! pipeline starts; no component reads the environment or an implicit
//! working directory on its own.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk representation of `config.toml`. Every field is optional so a
/// partial file only overrides what it names; defaults fill the rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub source: Option<PathBuf>,
    pub dest: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub dup_dir: Option<PathBuf>,
    pub orphan_aae_dir: Option<PathBuf>,
    pub second_check_dir: Option<PathBuf>,
    pub exiftool_chunk_size: Option<usize>,
    pub hash_workers: Option<usize>,
    pub hash_threshold_mb: Option<u64>,
}

/// Fully resolved, absolute-path configuration passed to every pipeline
/// component. The CLI-only `dry_run` override is never persisted to
/// `config.toml`.
#[derive(Debug, Clone)]
pub struct Config {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub data_dir: PathBuf,
    pub dup_dir: PathBuf,
    pub orphan_aae_dir: PathBuf,
    pub second_check_dir: PathBuf,
    pub exiftool_chunk_size: usize,
    pub hash_workers: usize,
    pub hash_threshold_mb: u64,
    pub dry_run: bool,
}

const DEFAULT_CHUNK_SIZE: usize = 800;
const DEFAULT_HASH_WORKERS: usize = 4;
const DEFAULT_HASH_THRESHOLD_MB: u64 = 10;

impl Config {
    pub fn index_db_path(&self) -> PathBuf {
        self.data_dir.join("index.sqlite3")
    }

    pub fn run_history_path(&self) -> PathBuf {
        self.data_dir.join("run_history.json")
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    pub fn reports_dir(&self, run_id: &str) -> PathBuf {
        self.data_dir.join("reports").join(format!("run-{}", run_id))
    }

    pub fn hash_threshold_bytes(&self) -> u64 {
        self.hash_threshold_mb * 1024 * 1024
    }

    /// Resolve a `Config`: start from defaults, overlay `file` (if given),
    /// overlay explicit CLI values, then canonicalize.
    ///
    /// `source` and `dest` are mandatory once overlaid from either the file
    /// or the CLI; a caller that supplies neither gets `ConfigError::Invalid`.
    pub fn resolve(
        file: Option<ConfigFile>,
        cli_source: Option<PathBuf>,
        cli_dest: Option<PathBuf>,
        dry_run: bool,
    ) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();

        let source = cli_source
            .or(file.source)
            .ok_or_else(|| ConfigError::Invalid("no source directory configured".to_string()))?;
        let dest = cli_dest
            .or(file.dest)
            .ok_or_else(|| ConfigError::Invalid("no destination archive configured".to_string()))?;

        let source = canonicalize_lenient(&source)?;
        let dest = canonicalize_lenient(&dest)?;

        let data_dir = file
            .data_dir
            .map(|p| resolve_relative_to(&dest, p))
            .unwrap_or_else(|| dest.join(".photox"));
        let dup_dir = file
            .dup_dir
            .map(|p| resolve_relative_to(&dest, p))
            .unwrap_or_else(|| data_dir.join("quarantine").join("duplicates"));
        let orphan_aae_dir = file
            .orphan_aae_dir
            .map(|p| resolve_relative_to(&dest, p))
            .unwrap_or_else(|| data_dir.join("quarantine").join("orphan_sidecars"));
        let second_check_dir = file
            .second_check_dir
            .map(|p| resolve_relative_to(&dest, p))
            .unwrap_or_else(|| data_dir.join("quarantine").join("unrecognized"));

        Ok(Config {
            source,
            dest,
            data_dir,
            dup_dir,
            orphan_aae_dir,
            second_check_dir,
            exiftool_chunk_size: file.exiftool_chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            hash_workers: file.hash_workers.unwrap_or(DEFAULT_HASH_WORKERS),
            hash_threshold_mb: file.hash_threshold_mb.unwrap_or(DEFAULT_HASH_THRESHOLD_MB),
            dry_run,
        })
    }

    /// Load `config.toml` from `path`, if it exists. A missing default path
    /// is not an error; an explicitly requested path that can't be read or
    /// parsed is.
    pub fn load_file(path: &Path, explicitly_requested: bool) -> Result<Option<ConfigFile>, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let parsed: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
                Ok(Some(parsed))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicitly_requested => Ok(None),
            Err(e) => Err(ConfigError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Write a fresh `config.toml` with defaults filled in. Only the `init`
    /// subcommand calls this; every other subcommand only reads.
    pub fn write_default_file(path: &Path, source: &Path, dest: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let file = ConfigFile {
            source: Some(source.to_path_buf()),
            dest: Some(dest.to_path_buf()),
            data_dir: None,
            dup_dir: None,
            orphan_aae_dir: None,
            second_check_dir: None,
            exiftool_chunk_size: Some(DEFAULT_CHUNK_SIZE),
            hash_workers: Some(DEFAULT_HASH_WORKERS),
            hash_threshold_mb: Some(DEFAULT_HASH_THRESHOLD_MB),
        };

        let serialized = toml::to_string_pretty(&file).map_err(|e| ConfigError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        std::fs::write(path, serialized).map_err(|e| ConfigError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

fn canonicalize_lenient(path: &Path) -> Result<PathBuf, ConfigError> {
    match path.canonicalize() {
        Ok(p) => Ok(p),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // dest may not exist yet on a first run; absolutize without requiring existence.
            let mut absolute = std::env::current_dir().map_err(|e| ConfigError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
            absolute.push(path);
            Ok(absolute)
        }
        Err(e) => Err(ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn resolve_relative_to(base: &Path, candidate: PathBuf) -> PathBuf {
    if candidate.is_absolute() {
        candidate
    } else {
        base.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolve_fails_without_source_or_dest() {
        let err = Config::resolve(None, None, None, false);
        assert!(err.is_err());
    }

    #[test]
    fn resolve_derives_quarantine_dirs_from_dest() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        let dest = dir.path().join("dest");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&dest).unwrap();

        let config = Config::resolve(None, Some(source), Some(dest.clone()), false).unwrap();
        assert_eq!(config.data_dir, dest.canonicalize().unwrap().join(".photox"));
        assert!(config.dup_dir.ends_with("quarantine/duplicates"));
        assert_eq!(config.exiftool_chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let dir = TempDir::new().unwrap();
        let file_source = dir.path().join("file_source");
        let cli_source = dir.path().join("cli_source");
        let dest = dir.path().join("dest");
        std::fs::create_dir_all(&file_source).unwrap();
        std::fs::create_dir_all(&cli_source).unwrap();
        std::fs::create_dir_all(&dest).unwrap();

        let file = ConfigFile {
            source: Some(file_source),
            dest: Some(dest.clone()),
            ..Default::default()
        };

        let config = Config::resolve(Some(file), Some(cli_source.clone()), None, false).unwrap();
        assert_eq!(config.source, cli_source.canonicalize().unwrap());
    }

    #[test]
    fn missing_default_config_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let result = Config::load_file(&dir.path().join("config.toml"), false).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = Config::load_file(&dir.path().join("config.toml"), true);
        assert!(result.is_err());
    }

    #[test]
    fn write_and_load_default_file_roundtrips() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        let source = dir.path().join("source");
        let dest = dir.path().join("dest");

        Config::write_default_file(&config_path, &source, &dest).unwrap();
        let loaded = Config::load_file(&config_path, true).unwrap().unwrap();
        assert_eq!(loaded.source, Some(source));
        assert_eq!(loaded.exiftool_chunk_size, Some(DEFAULT_CHUNK_SIZE));
    }
}
