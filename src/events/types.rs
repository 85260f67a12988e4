//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the archive pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Media-grouping phase events.
    Group(GroupEvent),
    /// Metadata-probing phase events.
    Probe(ProbeEvent),
    /// Hashing phase events.
    Hash(HashEvent),
    /// Placement phase events.
    Organize(OrganizeEvent),
    /// Pipeline-level events.
    Pipeline(PipelineEvent),
}

/// Events during the grouping phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GroupEvent {
    Started { paths: Vec<PathBuf> },
    Progress(GroupProgress),
    GroupFound { stem: String },
    Error { path: PathBuf, message: String },
    Completed { total_groups: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupProgress {
    pub directories_scanned: usize,
    pub groups_found: usize,
    pub current_path: PathBuf,
}

/// Events during the metadata-probing phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProbeEvent {
    Started { total_groups: usize },
    Progress(ProbeProgress),
    BatchFailed { count: usize, message: String },
    Completed { resolved: usize, unresolved: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeProgress {
    pub completed: usize,
    pub total: usize,
}

/// Events during the hashing phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HashEvent {
    Started { total: usize },
    Progress(HashProgress),
    Promoted { path: PathBuf },
    Error { path: PathBuf, message: String },
    Completed { total_hashed: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashProgress {
    pub completed: usize,
    pub total: usize,
    pub current_path: PathBuf,
}

/// Events during placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrganizeEvent {
    Started { total_groups: usize },
    Progress(OrganizeProgress),
    GroupPlaced { stem: String, dest: PathBuf },
    GroupQuarantined { stem: String, reason: String },
    GroupErrored { stem: String, message: String },
    Completed { summary: PipelineSummary },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeProgress {
    pub completed: usize,
    pub total: usize,
}

/// Pipeline-level events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    Started { run_id: String },
    PhaseChanged { phase: PipelinePhase },
    Completed { summary: PipelineSummary },
    Cancelled,
    Error { message: String },
}

/// Phases of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    Grouping,
    Probing,
    Hashing,
    Organizing,
    Reporting,
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub total_groups: usize,
    pub moved: usize,
    pub duplicate: usize,
    pub dest_duplicate: usize,
    pub error: usize,
    pub orphan_sidecar: usize,
    pub unrecognized: usize,
    pub duration_ms: u64,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::Grouping => write!(f, "Grouping"),
            PipelinePhase::Probing => write!(f, "Probing"),
            PipelinePhase::Hashing => write!(f, "Hashing"),
            PipelinePhase::Organizing => write!(f, "Organizing"),
            PipelinePhase::Reporting => write!(f, "Reporting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Group(GroupEvent::Progress(GroupProgress {
            directories_scanned: 10,
            groups_found: 50,
            current_path: PathBuf::from("/photos"),
        }));

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Group(GroupEvent::Progress(p)) => {
                assert_eq!(p.groups_found, 50);
            }
            _ => panic!("wrong event type"),
        }
    }

    #[test]
    fn pipeline_summary_is_serializable() {
        let summary = PipelineSummary {
            total_groups: 1000,
            moved: 900,
            duplicate: 50,
            dest_duplicate: 10,
            error: 5,
            orphan_sidecar: 20,
            unrecognized: 15,
            duration_ms: 5000,
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("900"));
    }
}
