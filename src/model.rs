//! Shared data model: file classification, media groups, fingerprints,
//! report rows and run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Classification of a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    PrimaryImage,
    PrimaryVideo,
    Sidecar,
    Unknown,
}

impl FileKind {
    /// Classify by case-insensitive extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "heic" | "heif" | "png" | "webp" | "gif" | "bmp" | "tiff" | "tif" => {
                FileKind::PrimaryImage
            }
            "mov" | "mp4" | "m4v" | "avi" | "3gp" => FileKind::PrimaryVideo,
            "aae" | "xmp" => FileKind::Sidecar,
            _ => FileKind::Unknown,
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, FileKind::PrimaryImage | FileKind::PrimaryVideo)
    }
}

/// One half of a two-phase content fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestPhase {
    /// Hash of the entire file.
    Full,
    /// Hash of the trailing `tail_threshold` bytes only.
    Tail,
}

/// Content fingerprint: size plus a 128-bit MD5 digest of either the whole
/// file or its tail sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size: u64,
    pub digest: [u8; 16],
    pub phase: DigestPhase,
}

impl Fingerprint {
    /// The key used for index lookups. Two fingerprints of different phase
    /// are never compared as equal by this key alone -- promotion must occur
    /// first so both are `Full` before a duplicate decision is trusted.
    pub fn key(&self) -> (u64, [u8; 16]) {
        (self.size, self.digest)
    }

    pub fn digest_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// A satellite file bound to a group's primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Satellite {
    /// The motion component of a Live Photo.
    PairedMotion(PathBuf),
    /// An edit-record sidecar (e.g. `.AAE`).
    Sidecar(PathBuf),
}

impl Satellite {
    pub fn path(&self) -> &PathBuf {
        match self {
            Satellite::PairedMotion(p) => p,
            Satellite::Sidecar(p) => p,
        }
    }
}

/// A logical media unit placed atomically: one primary plus zero or more
/// satellites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaGroup {
    pub primary: PathBuf,
    pub primary_kind: FileKind,
    pub satellites: Vec<Satellite>,
    pub capture_time: Option<DateTime<Utc>>,
    pub fingerprint: Option<Fingerprint>,
    pub size: u64,
}

impl MediaGroup {
    pub fn new(primary: PathBuf, primary_kind: FileKind, size: u64) -> Self {
        Self {
            primary,
            primary_kind,
            satellites: Vec::new(),
            capture_time: None,
            fingerprint: None,
            size,
        }
    }

    /// All paths in this group, primary first.
    pub fn all_paths(&self) -> Vec<&PathBuf> {
        let mut paths = vec![&self.primary];
        paths.extend(self.satellites.iter().map(|s| s.path()));
        paths
    }

    pub fn stem(&self) -> Option<&str> {
        self.primary.file_stem().and_then(|s| s.to_str())
    }
}

/// One row of run-scoped audit output. One row is emitted per affected file,
/// not per group, so satellites get their own audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReportRow {
    Moved {
        src: PathBuf,
        dst: PathBuf,
        group_stem: String,
    },
    Duplicate {
        src: PathBuf,
        existing_dst: PathBuf,
    },
    DestDuplicate {
        kept: PathBuf,
        discarded: PathBuf,
    },
    OrphanSidecar {
        src: PathBuf,
        dst: PathBuf,
    },
    Unrecognized {
        src: PathBuf,
        dst: PathBuf,
    },
    Error {
        src: PathBuf,
        kind: String,
        detail: String,
    },
}

impl ReportRow {
    /// The CSV stream this row belongs in (`core::report` picks the file by
    /// this name).
    pub fn sink_name(&self) -> &'static str {
        match self {
            ReportRow::Moved { .. } => "moved",
            ReportRow::Duplicate { .. } => "duplicate",
            ReportRow::DestDuplicate { .. } => "dest_duplicate",
            ReportRow::OrphanSidecar { .. } => "orphan_aae",
            ReportRow::Unrecognized { .. } => "unrecognized",
            ReportRow::Error { .. } => "error",
        }
    }
}

/// Per-run counters summarized in `summary.json` and `run_history.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounts {
    pub moved: usize,
    pub duplicate: usize,
    pub dest_duplicate: usize,
    pub error: usize,
    pub orphan_sidecar: usize,
    pub unrecognized: usize,
}

/// One entry in the persistent run ledger (`run_history.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub counts: RunCounts,
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_extensions() {
        assert_eq!(FileKind::from_extension("HEIC"), FileKind::PrimaryImage);
        assert_eq!(FileKind::from_extension("mov"), FileKind::PrimaryVideo);
        assert_eq!(FileKind::from_extension("AAE"), FileKind::Sidecar);
        assert_eq!(FileKind::from_extension("txt"), FileKind::Unknown);
    }

    #[test]
    fn fingerprint_key_ignores_phase() {
        let a = Fingerprint {
            size: 10,
            digest: [1; 16],
            phase: DigestPhase::Tail,
        };
        let b = Fingerprint {
            size: 10,
            digest: [1; 16],
            phase: DigestPhase::Full,
        };
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn group_all_paths_includes_satellites() {
        let mut group = MediaGroup::new(PathBuf::from("/a/IMG_1.HEIC"), FileKind::PrimaryImage, 10);
        group
            .satellites
            .push(Satellite::PairedMotion(PathBuf::from("/a/IMG_1.MOV")));
        group
            .satellites
            .push(Satellite::Sidecar(PathBuf::from("/a/IMG_1.AAE")));
        assert_eq!(group.all_paths().len(), 3);
        assert_eq!(group.stem(), Some("IMG_1"));
    }

    #[test]
    fn report_row_sink_names() {
        let row = ReportRow::Moved {
            src: PathBuf::from("/a"),
            dst: PathBuf::from("/b"),
            group_stem: "IMG_1".to_string(),
        };
        assert_eq!(row.sink_name(), "moved");
    }
}
