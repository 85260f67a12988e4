//! # Path utilities
//!
//! Extension-based file classification and collision-free destination
//! naming. Collision resolution claims a name atomically via
//! `create_new` rather than checking `exists()` first, so two files
//! racing for the same suffix can't both win.

use crate::model::FileKind;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Classify a path by its extension.
pub fn classify(path: &Path) -> FileKind {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => FileKind::from_extension(ext),
        None => FileKind::Unknown,
    }
}

/// Reserve a destination path for `desired_name` under `dir`, inserting a
/// numeric suffix before the extension on collision (`name.ext`,
/// `name_1.ext`, `name_2.ext`, ...). The returned path is guaranteed to not
/// have existed at the moment this function claimed it -- the claim is an
/// empty file created with `create_new`, which the caller then overwrites
/// (rename) or removes (copy-then-verify path, where the destination is
/// created fresh by `fs::copy` anyway).
///
/// Returns `None` if no free name is found within `max_attempts`.
pub fn unique_destination(dir: &Path, desired_name: &str, max_attempts: u32) -> Option<PathBuf> {
    let path = Path::new(desired_name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str());

    let candidate = dir.join(desired_name);
    if claim(&candidate) {
        return Some(candidate);
    }

    for n in 1..=max_attempts {
        let name = match ext {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        };
        let candidate = dir.join(name);
        if claim(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Attempt to atomically claim `path` by creating it exclusively.
fn claim(path: &Path) -> bool {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .is_ok()
}
