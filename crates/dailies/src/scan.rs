//! Scanner module for locating the first frame of an image sequence.
//!
//! The scanner lists a single sequence folder (no recursion), keeps the files
//! whose names end with one of the accepted extensions, and picks the
//! lexicographically smallest path. The folder is re-read on every call.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Checks if a file name ends with one of the accepted extensions (case-insensitive).
///
/// Extensions are matched as plain suffixes, so both `exr` and `.exr` work.
pub fn has_accepted_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    let name = name.to_lowercase();
    extensions
        .iter()
        .map(|ext| ext.as_ref().to_lowercase())
        .any(|ext| !ext.is_empty() && name.ends_with(&ext))
}

/// Lists every file directly inside `folder` that has an accepted extension.
///
/// Files are gathered extension by extension, in the order given, then the
/// combined set is sorted. Symlinks to files count as frames and keep their
/// link path. An unreadable or missing folder yields nothing.
pub fn list_sequence_frames<S: AsRef<str>>(folder: &Path, extensions: &[S]) -> Vec<PathBuf> {
    let entries: Vec<PathBuf> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    let mut frames = Vec::new();
    for ext in extensions {
        let ext = std::slice::from_ref(ext);
        frames.extend(
            entries
                .iter()
                .filter(|path| has_accepted_extension(path, ext))
                .cloned(),
        );
    }

    frames.sort();
    frames.dedup();
    frames
}

/// Finds the first frame of the sequence in `folder`.
///
/// Returns `None` when the folder does not exist, cannot be read, or holds no
/// file with an accepted extension. Callers treat that as something the
/// operator can fix, not as a fault.
pub fn find_first_frame<S: AsRef<str>>(folder: &Path, extensions: &[S]) -> Option<PathBuf> {
    list_sequence_frames(folder, extensions).into_iter().next()
}
