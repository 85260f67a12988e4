//! # photo-archivist CLI
//!
//! Command-line entry point. Exit codes: `0` success (including a run that
//! completed with some files reported as errors), `1` configuration or
//! environment failure, `2` a fatal I/O failure that prevented the run
//! from starting at all.

mod cli;

use photo_archivist::error::ArchivistError;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("error: {e}");
        std::process::exit(exit_code_for(&e));
    }
}

fn exit_code_for(error: &ArchivistError) -> i32 {
    match error {
        ArchivistError::Config(_) => 1,
        _ => 2,
    }
}
