//! Eligible file discovery.

use super::CompressOptions;
use jwalk::WalkDir;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Files under `root` (recursively, dotfiles included) that match the
/// eligible extension set, plus any walk errors as `(path, message)`.
///
/// Symlinks are followed for the file check; a dangling link is still
/// returned so its job can report the failure.
pub fn discover(root: &Path, options: &CompressOptions) -> (Vec<PathBuf>, Vec<(PathBuf, String)>) {
    let mut files = Vec::new();
    let mut errors = Vec::new();

    for entry in WalkDir::new(root).skip_hidden(false).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                errors.push((path, e.to_string()));
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        let path = entry.path();
        if !options.is_eligible(&path) {
            continue;
        }
        if file_type.is_symlink() && fs::metadata(&path).is_ok_and(|m| !m.is_file()) {
            continue;
        }
        files.push(path);
    }

    (files, errors)
}
