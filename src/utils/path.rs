//! Path normalization.

use std::path::{Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first. Paths that do not exist yet (output
/// directories) are made absolute against the current directory instead.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

/// Resolve a configured path against the project root, expanding `~`.
///
/// ```ignore
/// resolve_under(Path::new("build"), root)        // -> <root>/build
/// resolve_under(Path::new("~/tpl"), root)        // -> $HOME/tpl
/// resolve_under(Path::new("/abs/out"), root)     // -> /abs/out
/// ```
pub fn resolve_under(path: &Path, root: &Path) -> PathBuf {
    let expanded = match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).into_owned()),
        None => path.to_path_buf(),
    };
    if expanded.is_absolute() {
        expanded
    } else {
        root.join(expanded)
    }
}

/// Display `path` relative to `base` when it lives underneath it.
pub fn relative_display(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
