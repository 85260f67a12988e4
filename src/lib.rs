//! # Photo Archivist
//!
//! Organizes a photo and video source tree into a deduplicated,
//! date-partitioned archive.
//!
//! ## Core Philosophy
//! - **Never lose a file** - duplicates and ambiguous cases are quarantined
//!   for review, never deleted
//! - **Deterministic** - the same input tree produces the same archive
//!   layout and the same report, run after run
//! - **Audit everything** - every placement, duplicate, and error is a row
//!   in this run's report, and every run is recorded in a persistent ledger
//!
//! ## Architecture
//! - `core` - grouping, metadata probing, hashing, indexing, and placement
//! - `model` - shared data types threaded through every stage
//! - `config` - resolves the one `Config` value every stage reads
//! - `paths` - file classification and collision-free destination naming
//! - `events` - event-driven progress reporting (GUI-ready)
//! - `error` - error types, one enum per subsystem

pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod model;
pub mod paths;

// Re-export commonly used types at the crate root
pub use error::{ArchivistError, Result};
