//! # Core Module
//!
//! The archive engine, staged in the order the pipeline runs them.
//!
//! ## Modules
//! - `grouper` - walks the source tree and assembles media groups
//! - `metadata` - resolves capture time via `exiftool`
//! - `hasher` - two-phase content fingerprinting
//! - `index` - durable fingerprint -> archive path mapping
//! - `organize` - places, quarantines, or errors each group
//! - `reporter` - per-run CSV audit trail and run-history ledger
//! - `pipeline` - wires the above into `run` and `build_index`

pub mod grouper;
pub mod hasher;
pub mod index;
pub mod metadata;
pub mod organize;
pub mod pipeline;
pub mod reporter;
