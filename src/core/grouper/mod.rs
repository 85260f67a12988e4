//! # Grouper Module
//!
//! Walks a source tree and assembles [`MediaGroup`]s: one primary image or
//! video plus whatever satellites share its file stem in the same
//! directory. Two satellite kinds are recognized:
//!
//! - a Live Photo's paired motion video (primary image + same-stem video),
//! - an edit-record sidecar (`.AAE`, `.xmp`).
//!
//! The walk is sorted per directory so grouping is deterministic across
//! runs on the same input tree, which in turn makes the rest of the
//! pipeline (hashing order, duplicate tie-breaks) deterministic too.

use crate::error::GroupError;
use crate::events::{Event, EventSender, GroupEvent, GroupProgress};
use crate::model::{FileKind, MediaGroup, Satellite};
use crate::paths;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Output of one grouping pass.
pub struct GroupingResult {
    pub groups: Vec<MediaGroup>,
    /// Sidecars that could not be bound to exactly one group, e.g. because
    /// their stem was ambiguous within a directory or no primary shared it.
    pub orphan_sidecars: Vec<PathBuf>,
}

/// Builds media groups by walking `source` depth-first, sorted.
pub struct MediaGrouper;

impl MediaGrouper {
    pub fn scan(source: &Path, events: &EventSender) -> Result<GroupingResult, GroupError> {
        if !source.is_dir() {
            return Err(GroupError::DirectoryNotFound {
                path: source.to_path_buf(),
            });
        }

        events.send(Event::Group(GroupEvent::Started {
            paths: vec![source.to_path_buf()],
        }));

        let mut groups = Vec::new();
        let mut orphan_sidecars = Vec::new();
        let mut directories_scanned = 0usize;

        walk_dir(
            source,
            &mut groups,
            &mut orphan_sidecars,
            &mut directories_scanned,
            events,
        )?;

        events.send(Event::Group(GroupEvent::Completed {
            total_groups: groups.len(),
        }));

        Ok(GroupingResult {
            groups,
            orphan_sidecars,
        })
    }
}

fn walk_dir(
    dir: &Path,
    groups: &mut Vec<MediaGroup>,
    orphan_sidecars: &mut Vec<PathBuf>,
    directories_scanned: &mut usize,
    events: &EventSender,
) -> Result<(), GroupError> {
    *directories_scanned += 1;

    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|source_err| classify_read_error(dir, source_err))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    let mut subdirs = Vec::new();
    let mut images = Vec::new();
    let mut videos = Vec::new();
    let mut sidecars = Vec::new();

    for path in entries {
        if path.is_dir() {
            subdirs.push(path);
            continue;
        }

        match paths::classify(&path) {
            FileKind::PrimaryImage => images.push(path),
            FileKind::PrimaryVideo => videos.push(path),
            FileKind::Sidecar => sidecars.push(path),
            FileKind::Unknown => {}
        }
    }

    group_directory(dir, images, videos, sidecars, groups, orphan_sidecars)?;

    events.send(Event::Group(GroupEvent::Progress(GroupProgress {
        directories_scanned: *directories_scanned,
        groups_found: groups.len(),
        current_path: dir.to_path_buf(),
    })));

    for subdir in subdirs {
        walk_dir(&subdir, groups, orphan_sidecars, directories_scanned, events)?;
    }

    Ok(())
}

/// Group the files of a single directory. Live Photo pairing: an image and
/// a video with the same stem become one group (image primary, video
/// `PairedMotion`). Any video whose stem is not claimed by an image becomes
/// its own primary group. Sidecars bind to the one group with a matching
/// stem, if exactly one exists; otherwise they're reported as orphans.
fn group_directory(
    dir: &Path,
    images: Vec<PathBuf>,
    videos: Vec<PathBuf>,
    sidecars: Vec<PathBuf>,
    groups: &mut Vec<MediaGroup>,
    orphan_sidecars: &mut Vec<PathBuf>,
) -> Result<(), GroupError> {
    let mut videos_by_stem: HashMap<String, Vec<PathBuf>> = HashMap::new();
    for video in videos {
        if let Some(stem) = stem_of(&video) {
            videos_by_stem.entry(stem).or_default().push(video);
        }
    }

    let mut images_by_stem: HashMap<String, Vec<PathBuf>> = HashMap::new();
    for image in images {
        if let Some(stem) = stem_of(&image) {
            images_by_stem.entry(stem).or_default().push(image);
        }
    }

    let mut image_stems: Vec<String> = images_by_stem.keys().cloned().collect();
    image_stems.sort();
    for stem in image_stems {
        let mut stem_images = images_by_stem.remove(&stem).unwrap();
        stem_images.sort();
        // More than one image sharing a stem is ambiguous: both degrade to
        // independent primaries and the stem's video (if any) is left
        // unclaimed, falling through to the standalone-video handling below
        // rather than guessing which image it belongs to.
        let pairing_candidate = if stem_images.len() == 1 {
            videos_by_stem.remove(&stem)
        } else {
            None
        };

        for image in stem_images {
            let size = file_len(dir, &image)?;
            let mut group = MediaGroup::new(image.clone(), FileKind::PrimaryImage, size);

            if let Some(ref paired) = pairing_candidate {
                for video in paired {
                    group.satellites.push(Satellite::PairedMotion(video.clone()));
                }
            }

            groups.push(group);
        }
    }

    // Remaining videos (no same-stem image) are standalone primaries.
    let mut video_stems: Vec<String> = videos_by_stem.keys().cloned().collect();
    video_stems.sort();
    for stem in video_stems {
        let mut paired = videos_by_stem.remove(&stem).unwrap();
        paired.sort();
        for video in paired {
            let size = file_len(dir, &video)?;
            groups.push(MediaGroup::new(video, FileKind::PrimaryVideo, size));
        }
    }

    let mut sidecars_by_stem: HashMap<String, Vec<PathBuf>> = HashMap::new();
    for sidecar in sidecars {
        if let Some(stem) = stem_of(&sidecar) {
            sidecars_by_stem.entry(stem).or_default().push(sidecar);
        } else {
            orphan_sidecars.push(sidecar);
        }
    }

    let mut sidecar_stems: Vec<String> = sidecars_by_stem.keys().cloned().collect();
    sidecar_stems.sort();
    for stem in sidecar_stems {
        let stem_sidecars = sidecars_by_stem.remove(&stem).unwrap();
        let matching_groups: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.stem() == Some(stem.as_str()) && g.primary.parent() == Some(dir))
            .map(|(i, _)| i)
            .collect();

        if matching_groups.len() == 1 {
            let idx = matching_groups[0];
            for sidecar in stem_sidecars {
                groups[idx].satellites.push(Satellite::Sidecar(sidecar));
            }
        } else {
            // Either no primary shares this stem or more than one group in
            // this directory does -- ambiguous, so route to review instead
            // of guessing which group owns it.
            orphan_sidecars.extend(stem_sidecars);
        }
    }

    Ok(())
}

fn stem_of(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(String::from)
}

fn file_len(dir: &Path, path: &Path) -> Result<u64, GroupError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| classify_read_error(dir, source))
}

fn classify_read_error(path: &Path, source: std::io::Error) -> GroupError {
    if source.kind() == std::io::ErrorKind::PermissionDenied {
        GroupError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        GroupError::ReadDirectory {
            path: path.to_path_buf(),
            source,
        }
    }
}
