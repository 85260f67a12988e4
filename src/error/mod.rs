//! # Error Module
//!
//! Error types for the archive pipeline, one enum per subsystem, aggregated
//! into a top-level error. Every variant carries enough context (a path, at
//! minimum) to turn directly into a report row.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level pipeline error
#[derive(Error, Debug)]
pub enum ArchivistError {
    #[error("Grouping error: {0}")]
    Group(#[from] GroupError),

    #[error("Metadata probe error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Organize error: {0}")]
    Organize(#[from] OrganizeError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from the media grouper (directory walk + classification)
#[derive(Error, Debug)]
pub enum GroupError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from capture-time resolution
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Metadata probe subprocess failed for batch of {count} paths: {reason}")]
    ProbeFailed { count: usize, reason: String },

    #[error("Metadata probe produced unparsable output for {path}: {reason}")]
    MalformedOutput { path: PathBuf, reason: String },
}

/// Errors from content fingerprinting
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to read {path} for hashing: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the persistent index store
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to open index at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Index query failed: {0}")]
    QueryFailed(String),

    #[error(
        "Fingerprint already maps to a different path: existing={existing}, attempted={attempted}"
    )]
    Conflict {
        existing: PathBuf,
        attempted: PathBuf,
    },
}

/// Errors from group placement
#[derive(Error, Debug)]
pub enum OrganizeError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source file vanished before placement: {path}")]
    SourceMissing { path: PathBuf },

    #[error("Could not find a free destination name for {path} after {attempts} attempts")]
    TargetExhausted { path: PathBuf, attempts: u32 },

    #[error("Failed to move {src} to {dst}: {reason}")]
    MoveFailed {
        src: PathBuf,
        dst: PathBuf,
        reason: String,
    },
}

/// Errors from report generation
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to open report file {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write report row: {0}")]
    WriteFailed(String),

    #[error("Failed to serialize run history: {0}")]
    SerializationFailed(String),
}

/// Errors from configuration resolution
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {reason}")]
    ParseFailed { path: PathBuf, reason: String },

    #[error("Failed to write config file {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, ArchivistError>;
