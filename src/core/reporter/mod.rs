//! # Report sink
//!
//! Per-run audit trail: one CSV stream per disposition, a `summary.json`
//! written at run-end, and a `run_history.json` ledger appended across
//! runs. Every CSV is opened append-only at sink creation and written to
//! as each row is emitted, so a crash mid-run still leaves a readable
//! partial audit -- there is no buffered, all-at-once write.

use crate::error::ReportError;
use crate::model::{ReportRow, RunCounts, RunRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const SINKS: &[&str] = &[
    "moved",
    "duplicate",
    "dest_duplicate",
    "error",
    "orphan_aae",
    "unrecognized",
];

fn header_for(sink: &str) -> &'static str {
    match sink {
        "moved" => "run_id,timestamp,src_path,dst_path,group_stem",
        "duplicate" => "run_id,timestamp,src_path,existing_path",
        "dest_duplicate" => "run_id,timestamp,src_path,existing_path",
        "error" => "run_id,timestamp,src_path,error_kind,error_detail",
        "orphan_aae" => "run_id,timestamp,src_path,dst_path",
        "unrecognized" => "run_id,timestamp,src_path,dst_path",
        _ => unreachable!("unknown sink {sink}"),
    }
}

/// Quote a CSV field only if it needs it -- paths rarely contain commas or
/// quotes, but the report is the source of truth for manual recovery, so a
/// single bad filename must not silently shift columns.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn path_field(path: &Path) -> String {
    csv_field(&path.display().to_string())
}

/// Streams report rows to per-disposition CSV files and produces the
/// run-end summary and ledger entry.
pub struct ReportSink {
    run_id: String,
    dir: PathBuf,
    writers: HashMap<&'static str, File>,
    counts: RunCounts,
    dry_run: bool,
}

impl ReportSink {
    /// Create `<data_dir>/reports/run-<run_id>/` and open every CSV stream.
    /// In dry-run mode every filename carries a `_dryrun` suffix, per spec.
    pub fn create(data_dir: &Path, run_id: &str, dry_run: bool) -> Result<Self, ReportError> {
        let dir = data_dir.join("reports").join(format!("run-{}", run_id));
        fs::create_dir_all(&dir).map_err(|source| ReportError::OpenFailed {
            path: dir.clone(),
            source,
        })?;

        let mut writers = HashMap::new();
        let suffix = if dry_run { "_dryrun" } else { "" };

        for sink in SINKS {
            let path = dir.join(format!("{sink}{suffix}.csv"));
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| ReportError::OpenFailed {
                    path: path.clone(),
                    source,
                })?;

            if file
                .metadata()
                .map(|m| m.len() == 0)
                .unwrap_or(true)
            {
                writeln!(file, "{}", header_for(sink))
                    .map_err(|e| ReportError::WriteFailed(e.to_string()))?;
            }

            writers.insert(*sink, file);
        }

        Ok(Self {
            run_id: run_id.to_string(),
            dir,
            writers,
            counts: RunCounts::default(),
            dry_run,
        })
    }

    pub fn reports_dir(&self) -> &Path {
        &self.dir
    }

    /// Append one row to its CSV stream and fold it into the run counters.
    pub fn emit(&mut self, row: &ReportRow) -> Result<(), ReportError> {
        let sink = row.sink_name();
        let line = self.format_row(row);

        let file = self
            .writers
            .get_mut(sink)
            .expect("every ReportRow::sink_name() has a registered writer");

        writeln!(file, "{line}").map_err(|e| ReportError::WriteFailed(e.to_string()))?;
        self.update_counts(row);
        Ok(())
    }

    fn format_row(&self, row: &ReportRow) -> String {
        let ts = Utc::now().to_rfc3339();
        match row {
            ReportRow::Moved {
                src,
                dst,
                group_stem,
            } => format!(
                "{},{ts},{},{},{}",
                self.run_id,
                path_field(src),
                path_field(dst),
                csv_field(group_stem)
            ),
            ReportRow::Duplicate { src, existing_dst } => format!(
                "{},{ts},{},{}",
                self.run_id,
                path_field(src),
                path_field(existing_dst)
            ),
            ReportRow::DestDuplicate { kept, discarded } => format!(
                "{},{ts},{},{}",
                self.run_id,
                path_field(discarded),
                path_field(kept)
            ),
            ReportRow::OrphanSidecar { src, dst } => format!(
                "{},{ts},{},{}",
                self.run_id,
                path_field(src),
                path_field(dst)
            ),
            ReportRow::Unrecognized { src, dst } => format!(
                "{},{ts},{},{}",
                self.run_id,
                path_field(src),
                path_field(dst)
            ),
            ReportRow::Error { src, kind, detail } => format!(
                "{},{ts},{},{},{}",
                self.run_id,
                path_field(src),
                csv_field(kind),
                csv_field(detail)
            ),
        }
    }

    fn update_counts(&mut self, row: &ReportRow) {
        match row {
            ReportRow::Moved { .. } => self.counts.moved += 1,
            ReportRow::Duplicate { .. } => self.counts.duplicate += 1,
            ReportRow::DestDuplicate { .. } => self.counts.dest_duplicate += 1,
            ReportRow::OrphanSidecar { .. } => self.counts.orphan_sidecar += 1,
            ReportRow::Unrecognized { .. } => self.counts.unrecognized += 1,
            ReportRow::Error { .. } => self.counts.error += 1,
        }
    }

    pub fn counts(&self) -> &RunCounts {
        &self.counts
    }

    /// Flush `summary.json` for this run and append its `RunRecord` to the
    /// persistent `run_history.json` ledger. Consumes the sink: no more
    /// rows may be emitted once the run is summarized.
    pub fn finish(self, data_dir: &Path, started_at: DateTime<Utc>) -> Result<RunRecord, ReportError> {
        for (_, mut file) in self.writers {
            let _ = file.flush();
        }

        let record = RunRecord {
            run_id: self.run_id.clone(),
            started_at,
            finished_at: Utc::now(),
            counts: self.counts.clone(),
            dry_run: self.dry_run,
        };

        let summary_path = self.dir.join("summary.json");
        let summary_json = serde_json::to_string_pretty(&record)
            .map_err(|e| ReportError::SerializationFailed(e.to_string()))?;
        fs::write(&summary_path, summary_json).map_err(|source| ReportError::OpenFailed {
            path: summary_path,
            source,
        })?;

        append_run_history(data_dir, &record)?;

        Ok(record)
    }
}

fn append_run_history(data_dir: &Path, record: &RunRecord) -> Result<(), ReportError> {
    let history_path = data_dir.join("run_history.json");

    let mut history: Vec<RunRecord> = match fs::read_to_string(&history_path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(source) => {
            return Err(ReportError::OpenFailed {
                path: history_path,
                source,
            })
        }
    };

    history.push(record.clone());

    let serialized = serde_json::to_string_pretty(&history)
        .map_err(|e| ReportError::SerializationFailed(e.to_string()))?;
    fs::write(&history_path, serialized).map_err(|source| ReportError::OpenFailed {
        path: history_path,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_opens_every_sink_with_a_header() {
        let dir = TempDir::new().unwrap();
        let sink = ReportSink::create(dir.path(), "run-1", false).unwrap();
        let reports_dir = sink.reports_dir().to_path_buf();
        drop(sink);

        for name in SINKS {
            let contents = fs::read_to_string(reports_dir.join(format!("{name}.csv"))).unwrap();
            assert_eq!(contents.lines().count(), 1);
        }
    }

    #[test]
    fn dry_run_suffixes_csv_filenames() {
        let dir = TempDir::new().unwrap();
        let sink = ReportSink::create(dir.path(), "run-2", true).unwrap();
        assert!(sink.reports_dir().join("moved_dryrun.csv").exists());
    }

    #[test]
    fn emit_appends_row_and_updates_counts() {
        let dir = TempDir::new().unwrap();
        let mut sink = ReportSink::create(dir.path(), "run-3", false).unwrap();

        sink.emit(&ReportRow::Moved {
            src: PathBuf::from("/src/a.jpg"),
            dst: PathBuf::from("/dest/2024/03/a.jpg"),
            group_stem: "a".to_string(),
        })
        .unwrap();

        assert_eq!(sink.counts().moved, 1);
        let contents = fs::read_to_string(sink.reports_dir().join("moved.csv")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn finish_writes_summary_and_appends_history() {
        let dir = TempDir::new().unwrap();
        let mut sink = ReportSink::create(dir.path(), "run-4", false).unwrap();
        sink.emit(&ReportRow::Unrecognized {
            src: PathBuf::from("/src/b.jpg"),
            dst: PathBuf::from("/dest/quarantine/unrecognized/b.jpg"),
        })
        .unwrap();

        let reports_dir = sink.reports_dir().to_path_buf();
        let record = sink.finish(dir.path(), Utc::now()).unwrap();
        assert_eq!(record.counts.unrecognized, 1);
        assert!(reports_dir.join("summary.json").exists());

        let history: Vec<RunRecord> =
            serde_json::from_str(&fs::read_to_string(dir.path().join("run_history.json")).unwrap())
                .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].run_id, "run-4");
    }

    #[test]
    fn csv_field_quotes_commas_and_quotes() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("a\"b"), "\"a\"\"b\"");
    }
}
