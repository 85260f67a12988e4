//! # Pipeline
//!
//! Wires the stages together: group the source tree, resolve capture
//! times, fingerprint primaries, place or quarantine every group, and
//! write the run's report. A SIGINT/SIGTERM handler flips a shared
//! [`CancellationToken`] so a long run can be stopped cleanly between
//! group boundaries without losing the audit trail already written.

use crate::config::Config;
use crate::core::grouper::MediaGrouper;
use crate::core::hasher::Hasher;
use crate::core::index::{IndexBuilder, IndexStore, MemoryIndex, SqliteIndex};
use crate::core::metadata::MetadataProber;
use crate::core::organize::{CancellationToken, Organizer};
use crate::core::reporter::ReportSink;
use crate::error::{HashError, Result};
use crate::events::{Event, EventSender, PipelineEvent, PipelinePhase, PipelineSummary, ProbeEvent};
use crate::model::{Fingerprint, MediaGroup, RunCounts, RunRecord};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

/// Runs the full archive pipeline, or rebuilds the index from the archive
/// tree directly, over a resolved [`Config`].
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Group, probe, hash, and place every file under `config.source`,
    /// writing a full run report. Returns the finished [`RunRecord`].
    pub fn run(&self, events: &EventSender) -> Result<RunRecord> {
        let run_id = new_run_id();
        let started_at = chrono::Utc::now();
        let clock = Instant::now();
        events.send(Event::Pipeline(PipelineEvent::Started {
            run_id: run_id.clone(),
        }));

        let cancel = install_cancellation_handler();
        let index = self.open_index()?;
        let hasher = Hasher::new(self.config.hash_threshold_bytes(), self.config.hash_workers);
        let mut report = ReportSink::create(&self.config.data_dir, &run_id, self.config.dry_run)?;

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Grouping,
        }));
        let grouping = MediaGrouper::scan(&self.config.source, events)?;
        let mut groups = grouping.groups;
        let total_groups = groups.len();

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Probing,
        }));
        self.resolve_capture_times(&mut groups, events);

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Hashing,
        }));
        let fingerprints = self.fingerprint_timed_primaries(&groups, &hasher, events);

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Organizing,
        }));
        let organizer = Organizer::new(&self.config, index.as_ref(), &hasher);
        organizer.process(groups, &fingerprints, &mut report, events, &cancel);

        let mut claims = HashSet::new();
        organizer.process_orphan_sidecars(grouping.orphan_sidecars, &mut report, &mut claims);

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Reporting,
        }));
        let counts = report.counts().clone();
        let record = report.finish(&self.config.data_dir, started_at)?;

        if cancel.is_cancelled() {
            events.send(Event::Pipeline(PipelineEvent::Cancelled));
        } else {
            let summary = summarize(&counts, total_groups, clock);
            events.send(Event::Pipeline(PipelineEvent::Completed { summary }));
        }

        Ok(record)
    }

    /// Rebuild the index from the archive tree at `config.dest`, routing
    /// any within-archive duplicate discovered along the way to
    /// `dup_dir`. Does not touch `config.source`.
    pub fn build_index(&self, events: &EventSender) -> Result<RunRecord> {
        let run_id = new_run_id();
        let started_at = chrono::Utc::now();
        let clock = Instant::now();
        events.send(Event::Pipeline(PipelineEvent::Started {
            run_id: run_id.clone(),
        }));

        let index = self.open_index()?;
        let hasher = Hasher::new(self.config.hash_threshold_bytes(), self.config.hash_workers);
        let mut report = ReportSink::create(&self.config.data_dir, &run_id, self.config.dry_run)?;

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Organizing,
        }));
        let builder = IndexBuilder::new(&self.config, index.as_ref(), &hasher);
        builder.run(&mut report)?;

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Reporting,
        }));
        let counts = report.counts().clone();
        let record = report.finish(&self.config.data_dir, started_at)?;

        let summary = summarize(&counts, 0, clock);
        events.send(Event::Pipeline(PipelineEvent::Completed { summary }));

        Ok(record)
    }

    fn open_index(&self) -> Result<Box<dyn IndexStore>> {
        if self.config.dry_run {
            Ok(Box::new(MemoryIndex::new()))
        } else {
            Ok(Box::new(SqliteIndex::open(&self.config.index_db_path())?))
        }
    }

    fn resolve_capture_times(&self, groups: &mut [MediaGroup], events: &EventSender) {
        let prober = MetadataProber::new(self.config.exiftool_chunk_size);
        let primaries: Vec<PathBuf> = groups.iter().map(|g| g.primary.clone()).collect();

        events.send(Event::Probe(ProbeEvent::Started {
            total_groups: groups.len(),
        }));
        let resolved = prober.probe(&primaries);

        let mut resolved_count = 0;
        let mut unresolved_count = 0;
        for group in groups.iter_mut() {
            group.capture_time = resolved.get(&group.primary).copied();
            if group.capture_time.is_some() {
                resolved_count += 1;
            } else {
                unresolved_count += 1;
            }
        }

        events.send(Event::Probe(ProbeEvent::Completed {
            resolved: resolved_count,
            unresolved: unresolved_count,
        }));
    }

    fn fingerprint_timed_primaries(
        &self,
        groups: &[MediaGroup],
        hasher: &Hasher,
        events: &EventSender,
    ) -> HashMap<PathBuf, std::result::Result<Fingerprint, HashError>> {
        let to_hash: Vec<PathBuf> = groups
            .iter()
            .filter(|g| g.capture_time.is_some())
            .map(|g| g.primary.clone())
            .collect();

        hasher.fingerprint_all(&to_hash, events).into_iter().collect()
    }
}

fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Installs a `ctrlc` handler that flips the returned token on SIGINT or
/// SIGTERM. Failure to install (e.g. a handler is already registered in
/// the process) is non-fatal -- the run simply can't be cancelled early.
fn install_cancellation_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let for_handler = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || for_handler.cancel()) {
        tracing::warn!(error = %e, "failed to install cancellation handler");
    }
    cancel
}

fn summarize(counts: &RunCounts, total_groups: usize, clock: Instant) -> PipelineSummary {
    PipelineSummary {
        total_groups,
        moved: counts.moved,
        duplicate: counts.duplicate,
        dest_duplicate: counts.dest_duplicate,
        error: counts.error,
        orphan_sidecar: counts.orphan_sidecar,
        unrecognized: counts.unrecognized,
        duration_ms: clock.elapsed().as_millis() as u64,
    }
}
