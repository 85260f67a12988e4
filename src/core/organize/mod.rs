//! # Organizer
//!
//! The orchestrator: for each media group, resolves a disposition
//! (archived, quarantined as a duplicate, quarantined as unrecognized, or
//! errored) and performs the transactional filesystem move, committing the
//! index before the corresponding `Moved` row is emitted. Standalone
//! orphan sidecars (no primary shares their stem anywhere in their
//! directory) are handled separately from grouped placement.
//!
//! Runs single-threaded by design: the "first wins" duplicate tie-break
//! and the report's row ordering both depend on processing groups in the
//! deterministic order the grouper produced them.

use crate::config::Config;
use crate::core::hasher::Hasher;
use crate::core::index::IndexStore;
use crate::core::reporter::ReportSink;
use crate::error::{HashError, OrganizeError};
use crate::events::{Event, EventSender, OrganizeEvent, OrganizeProgress};
use crate::model::{DigestPhase, Fingerprint, MediaGroup, ReportRow};
use crate::paths;
use chrono::{DateTime, Datelike, Local, Utc};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const MAX_DESTINATION_ATTEMPTS: u32 = 1000;

/// A cooperative, cloneable cancellation flag. Checked between groups, not
/// mid-group: a group's placement is atomic, so cancellation takes effect
/// only at a group boundary.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Consults the index and hasher to place, quarantine, or fail each group
/// the grouper produced.
pub struct Organizer<'a> {
    config: &'a Config,
    index: &'a dyn IndexStore,
    hasher: &'a Hasher,
}

impl<'a> Organizer<'a> {
    pub fn new(config: &'a Config, index: &'a dyn IndexStore, hasher: &'a Hasher) -> Self {
        Self {
            config,
            index,
            hasher,
        }
    }

    /// Process every group in submission order. `fingerprints` holds the
    /// bulk-hashed result for each group's primary, keyed by primary path,
    /// computed by the pipeline before calling here.
    pub fn process(
        &self,
        groups: Vec<MediaGroup>,
        fingerprints: &HashMap<PathBuf, Result<Fingerprint, HashError>>,
        report: &mut ReportSink,
        events: &EventSender,
        cancel: &CancellationToken,
    ) {
        let total = groups.len();
        events.send(Event::Organize(OrganizeEvent::Started { total_groups: total }));

        let mut claims: HashSet<PathBuf> = HashSet::new();

        for (i, mut group) in groups.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            self.process_group(&mut group, fingerprints, report, &mut claims);

            events.send(Event::Organize(OrganizeEvent::Progress(OrganizeProgress {
                completed: i + 1,
                total,
            })));
        }
    }

    /// Place every orphan sidecar the grouper could not bind, preserving
    /// its relative source directory under `orphan_aae_dir`.
    pub fn process_orphan_sidecars(
        &self,
        orphans: Vec<PathBuf>,
        report: &mut ReportSink,
        claims: &mut HashSet<PathBuf>,
    ) {
        for src in orphans {
            let rel_dir = self.relative_source_dir(&src);
            let target_dir = self.config.orphan_aae_dir.join(&rel_dir);
            self.ensure_dir(&target_dir);

            let name = file_name_or(&src, "sidecar");
            match self.reserve(&target_dir, &name, claims) {
                Some(dst) => match self.move_file(&src, &dst) {
                    Ok(()) => {
                        let _ = report.emit(&ReportRow::OrphanSidecar { src, dst });
                    }
                    Err(e) => self.emit_error(&src, "MoveFailed", &e.to_string(), report),
                },
                None => self.emit_error(&src, "TargetExists", "no free destination name", report),
            }
        }
    }

    fn process_group(
        &self,
        group: &mut MediaGroup,
        fingerprints: &HashMap<PathBuf, Result<Fingerprint, HashError>>,
        report: &mut ReportSink,
        claims: &mut HashSet<PathBuf>,
    ) {
        // Step 1: time resolution.
        let Some(capture_time) = group.capture_time else {
            self.quarantine(
                group,
                &self.config.second_check_dir.clone(),
                QuarantineKind::Unrecognized,
                report,
                claims,
            );
            return;
        };

        // Step 2: fingerprinting (already bulk-computed upstream).
        let mut fp = match fingerprints.get(&group.primary) {
            Some(Ok(fp)) => *fp,
            Some(Err(e)) => {
                self.error_group(group, "HashReadFailed", &e.to_string(), report);
                return;
            }
            None => {
                self.error_group(group, "HashReadFailed", "fingerprint not computed", report);
                return;
            }
        };
        group.fingerprint = Some(fp);

        // Step 3: duplicate check, promoting a Tail fingerprint first if a
        // same-size entry is already indexed.
        let existing = match self.lookup_with_promotion(&mut fp, group) {
            Ok(existing) => existing,
            Err(e) => {
                self.error_group(group, "IndexError", &e.to_string(), report);
                return;
            }
        };
        group.fingerprint = Some(fp);

        if let Some(existing_dst) = existing {
            self.quarantine_duplicate(group, &existing_dst, report, claims);
            return;
        }

        // Steps 4 and 5: placement, then index commit before reporting.
        self.place_group(group, capture_time, fp, report, claims);
    }

    /// Checks the index for any other same-size entry when the current
    /// fingerprint is still a `Tail` digest; on a match, promotes both
    /// sides to `Full` before trusting a hit or miss. Stale `Tail`-keyed
    /// rows for already-promoted archive paths are left in the index --
    /// harmless, since lookups always use the fresher `Full` key from here
    /// on for this content.
    fn lookup_with_promotion(
        &self,
        fp: &mut Fingerprint,
        group: &MediaGroup,
    ) -> Result<Option<PathBuf>, crate::error::IndexError> {
        if fp.phase == DigestPhase::Tail {
            let candidates = self.index.entries_of_size(fp.size)?;
            if !candidates.is_empty() {
                if let Ok(full) = self.hasher.promote(&group.primary) {
                    *fp = full;
                }

                if !self.config.dry_run {
                    for (_, relpath) in &candidates {
                        let archived_path = self.config.dest.join(relpath);
                        if let Ok(full_candidate) = self.hasher.promote(&archived_path) {
                            let _ = self.index.insert(&full_candidate, relpath);
                        }
                    }
                }
            }
        }

        self.index.lookup(fp)
    }

    fn place_group(
        &self,
        group: &MediaGroup,
        capture_time: DateTime<Utc>,
        fp: Fingerprint,
        report: &mut ReportSink,
        claims: &mut HashSet<PathBuf>,
    ) {
        let local = capture_time.with_timezone(&Local);
        let target_dir = self
            .config
            .dest
            .join(format!("{:04}", local.year()))
            .join(format!("{:02}", local.month()));
        self.ensure_dir(&target_dir);

        let primary_name = file_name_or(&group.primary, "file");
        let Some(primary_dst) = self.reserve(&target_dir, &primary_name, claims) else {
            self.error_group(group, "TargetExists", "no free destination name for primary", report);
            return;
        };

        if let Err(e) = self.move_file(&group.primary, &primary_dst) {
            report_move_error(&group.primary, &e, report);
            return;
        }

        let final_stem = primary_dst
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("file")
            .to_string();

        let mut moved = vec![(group.primary.clone(), primary_dst.clone())];

        for satellite in &group.satellites {
            let src = satellite.path();
            let name = match src.extension().and_then(|e| e.to_str()) {
                Some(ext) => format!("{final_stem}.{ext}"),
                None => final_stem.clone(),
            };

            match self.reserve(&target_dir, &name, claims) {
                Some(dst) => match self.move_file(src, &dst) {
                    Ok(()) => moved.push((src.clone(), dst)),
                    Err(e) => report_move_error(src, &e, report),
                },
                None => self.emit_error(src, "TargetExists", "no free destination name for satellite", report),
            }
        }

        if !self.config.dry_run {
            let archive_relpath = primary_dst
                .strip_prefix(&self.config.dest)
                .unwrap_or(&primary_dst)
                .to_path_buf();

            if let Err(e) = self.index.insert(&fp, &archive_relpath) {
                // The move already happened and there is no rollback path;
                // the report is the record of what actually occurred.
                self.emit_error(&group.primary, "IndexConflict", &e.to_string(), report);
                return;
            }
        }

        for (src, dst) in moved {
            let _ = report.emit(&ReportRow::Moved {
                src,
                dst,
                group_stem: final_stem.clone(),
            });
        }
    }

    fn quarantine_duplicate(
        &self,
        group: &MediaGroup,
        existing_dst: &Path,
        report: &mut ReportSink,
        claims: &mut HashSet<PathBuf>,
    ) {
        let rel_dir = self.relative_source_dir(&group.primary);
        let target_dir = self.config.dup_dir.join(&rel_dir);
        self.ensure_dir(&target_dir);

        for path in group.all_paths() {
            let name = file_name_or(path, "file");
            match self.reserve(&target_dir, &name, claims) {
                Some(dst) => match self.move_file(path, &dst) {
                    Ok(()) => {
                        let _ = report.emit(&ReportRow::Duplicate {
                            src: path.clone(),
                            existing_dst: existing_dst.to_path_buf(),
                        });
                    }
                    Err(e) => report_move_error(path, &e, report),
                },
                None => self.emit_error(path, "TargetExists", "no free destination name", report),
            }
        }
    }

    fn quarantine(
        &self,
        group: &MediaGroup,
        quarantine_root: &Path,
        kind: QuarantineKind,
        report: &mut ReportSink,
        claims: &mut HashSet<PathBuf>,
    ) {
        let rel_dir = self.relative_source_dir(&group.primary);
        let target_dir = quarantine_root.join(&rel_dir);
        self.ensure_dir(&target_dir);

        for path in group.all_paths() {
            let name = file_name_or(path, "file");
            match self.reserve(&target_dir, &name, claims) {
                Some(dst) => match self.move_file(path, &dst) {
                    Ok(()) => {
                        let row = match kind {
                            QuarantineKind::Unrecognized => ReportRow::Unrecognized {
                                src: path.clone(),
                                dst,
                            },
                        };
                        let _ = report.emit(&row);
                    }
                    Err(e) => report_move_error(path, &e, report),
                },
                None => self.emit_error(path, "TargetExists", "no free destination name", report),
            }
        }
    }

    fn error_group(&self, group: &MediaGroup, kind: &str, detail: &str, report: &mut ReportSink) {
        for path in group.all_paths() {
            self.emit_error(path, kind, detail, report);
        }
    }

    fn emit_error(&self, path: &Path, kind: &str, detail: &str, report: &mut ReportSink) {
        let _ = report.emit(&ReportRow::Error {
            src: path.to_path_buf(),
            kind: kind.to_string(),
            detail: detail.to_string(),
        });
    }

    fn ensure_dir(&self, dir: &Path) {
        if !self.config.dry_run {
            let _ = fs::create_dir_all(dir);
        }
    }

    fn relative_source_dir(&self, path: &Path) -> PathBuf {
        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        parent
            .strip_prefix(&self.config.source)
            .unwrap_or(parent)
            .to_path_buf()
    }

    fn reserve(&self, dir: &Path, desired_name: &str, claims: &mut HashSet<PathBuf>) -> Option<PathBuf> {
        if self.config.dry_run {
            reserve_virtual(dir, desired_name, claims, MAX_DESTINATION_ATTEMPTS)
        } else {
            paths::unique_destination(dir, desired_name, MAX_DESTINATION_ATTEMPTS)
        }
    }

    /// In dry-run mode no file is ever created, so collision detection
    /// falls back to `exists()` plus an in-memory claim set scoped to this
    /// run -- good enough since the organizer is single-threaded.
    fn move_file(&self, src: &Path, dst: &Path) -> Result<(), OrganizeError> {
        if self.config.dry_run {
            return Ok(());
        }

        if !src.exists() {
            return Err(OrganizeError::SourceMissing {
                path: src.to_path_buf(),
            });
        }

        if fs::rename(src, dst).is_ok() {
            return Ok(());
        }

        let source_size = fs::metadata(src)
            .map_err(|e| move_failed(src, dst, e.to_string()))?
            .len();
        fs::copy(src, dst).map_err(|e| move_failed(src, dst, e.to_string()))?;

        let dest_size = fs::metadata(dst)
            .map_err(|e| move_failed(src, dst, e.to_string()))?
            .len();
        if dest_size != source_size {
            let _ = fs::remove_file(dst);
            return Err(move_failed(
                src,
                dst,
                format!("copy verification failed: source {source_size} bytes, dest {dest_size} bytes"),
            ));
        }

        fs::remove_file(src).map_err(|e| move_failed(src, dst, e.to_string()))
    }
}

enum QuarantineKind {
    Unrecognized,
}

fn move_failed(src: &Path, dst: &Path, reason: String) -> OrganizeError {
    OrganizeError::MoveFailed {
        src: src.to_path_buf(),
        dst: dst.to_path_buf(),
        reason,
    }
}

fn report_move_error(src: &Path, error: &OrganizeError, report: &mut ReportSink) {
    let _ = report.emit(&ReportRow::Error {
        src: src.to_path_buf(),
        kind: "MoveFailed".to_string(),
        detail: error.to_string(),
    });
}

fn file_name_or(path: &Path, fallback: &str) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(fallback)
        .to_string()
}

fn reserve_virtual(
    dir: &Path,
    desired_name: &str,
    claims: &mut HashSet<PathBuf>,
    max_attempts: u32,
) -> Option<PathBuf> {
    let path = Path::new(desired_name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str());

    let candidate = dir.join(desired_name);
    if !candidate.exists() && claims.insert(candidate.clone()) {
        return Some(candidate);
    }

    for n in 1..=max_attempts {
        let name = match ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let candidate = dir.join(name);
        if !candidate.exists() && claims.insert(candidate.clone()) {
            return Some(candidate);
        }
    }

    None
}
