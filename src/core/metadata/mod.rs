//! # Metadata Module
//!
//! Resolves capture time for media primaries by invoking `exiftool` as a
//! subprocess, batched across `chunk_size` paths per invocation to amortize
//! process-startup cost. Tries, in order: `DateTimeOriginal`, `CreateDate`,
//! `MediaCreateDate`, `FileModifyDate`. A batch-level failure (non-zero
//! exit, unparsable JSON) falls back to probing each path in that batch
//! individually so one bad file doesn't cost the whole batch.

use crate::error::MetadataError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

const TAGS: &[&str] = &[
    "DateTimeOriginal",
    "CreateDate",
    "MediaCreateDate",
    "FileModifyDate",
];

#[derive(Debug, Deserialize, Default)]
struct ExifRecord {
    #[serde(rename = "SourceFile")]
    source_file: Option<String>,
    #[serde(rename = "DateTimeOriginal")]
    date_time_original: Option<String>,
    #[serde(rename = "CreateDate")]
    create_date: Option<String>,
    #[serde(rename = "MediaCreateDate")]
    media_create_date: Option<String>,
    #[serde(rename = "FileModifyDate")]
    file_modify_date: Option<String>,
}

impl ExifRecord {
    fn resolve(&self) -> Option<DateTime<Utc>> {
        [
            &self.date_time_original,
            &self.create_date,
            &self.media_create_date,
            &self.file_modify_date,
        ]
        .into_iter()
        .find_map(|field| field.as_deref().and_then(parse_exif_timestamp))
    }
}

/// Parse an exiftool timestamp of the form `YYYY:MM:DD HH:MM:SS[+-HH:MM]`.
/// The timezone offset, if present, is trimmed -- exiftool's default `-j`
/// output is otherwise ambiguous about source timezone, so we treat the
/// naive part as UTC rather than guess.
fn parse_exif_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let naive_part = raw.split(['+', '-']).next().unwrap_or(raw).trim();
    NaiveDateTime::parse_from_str(naive_part, "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Batched capture-time prober backed by an external `exiftool` process.
pub struct MetadataProber {
    chunk_size: usize,
}

impl MetadataProber {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Resolve capture times for every path, batching `chunk_size` at a
    /// time. Paths with no resolvable timestamp are simply absent from the
    /// returned map -- that's `MetadataMissing`, not an error.
    pub fn probe(&self, paths: &[PathBuf]) -> HashMap<PathBuf, DateTime<Utc>> {
        let mut resolved = HashMap::new();

        for chunk in paths.chunks(self.chunk_size) {
            match self.probe_batch(chunk) {
                Ok(records) => merge_records(&mut resolved, chunk, records),
                Err(e) => {
                    tracing::warn!(count = chunk.len(), error = %e, "metadata batch failed, retrying singly");
                    for path in chunk {
                        if let Ok(records) = self.probe_batch(std::slice::from_ref(path)) {
                            merge_records(&mut resolved, std::slice::from_ref(path), records);
                        }
                    }
                }
            }
        }

        resolved
    }

    fn probe_batch(&self, paths: &[PathBuf]) -> Result<Vec<ExifRecord>, MetadataError> {
        let mut cmd = Command::new("exiftool");
        cmd.arg("-j");
        for tag in TAGS {
            cmd.arg(format!("-{}", tag));
        }
        cmd.args(paths);

        let output = cmd.output().map_err(|e| MetadataError::ProbeFailed {
            count: paths.len(),
            reason: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(MetadataError::ProbeFailed {
                count: paths.len(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| MetadataError::ProbeFailed {
            count: paths.len(),
            reason: e.to_string(),
        })
    }
}

fn merge_records(
    resolved: &mut HashMap<PathBuf, DateTime<Utc>>,
    paths: &[PathBuf],
    records: Vec<ExifRecord>,
) {
    // exiftool's -j output is positional per input path when SourceFile
    // matches; fall back to position if the field is absent.
    for (i, record) in records.iter().enumerate() {
        let path = record
            .source_file
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| paths.get(i).cloned());

        if let (Some(path), Some(time)) = (path, record.resolve()) {
            resolved.insert(path, time);
        }
    }
}
