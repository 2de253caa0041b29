//! Output layout composition.
//!
//! Copies a template tree into the output root, substituting every
//! registered token in file contents and relative file names before the
//! destination is written. Files that are not UTF-8 are copied verbatim.
//!
//! ```text
//! template/                    build/
//! ├── index.js        ──────▶  ├── index.js      (SERVER, BUILD_OPTIONS… resolved)
//! ├── handler.js      ──────▶  ├── handler.js
//! └── .env.example    ──────▶  └── .env.example
//! ```
//!
//! Any read or write failure is fatal.

mod template;
mod tokens;

pub use template::TemplateSource;
use template::RUNTIME_TEMPLATE;
pub use tokens::{BuildOptions, TokenSet};

use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("template directory `{0}` does not exist")]
    MissingTemplate(PathBuf),

    #[error("failed to read `{0}`")]
    Read(PathBuf, #[source] io::Error),

    #[error("failed to write `{0}`")]
    Write(PathBuf, #[source] io::Error),
}

/// Counts reported after composing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposeSummary {
    pub files: usize,
    /// Files whose content or name changed through substitution.
    pub substituted: usize,
}

/// Compose `source` into `out`, substituting `tokens`.
pub fn compose(
    source: &TemplateSource,
    out: &Path,
    tokens: &TokenSet,
) -> Result<ComposeSummary, LayoutError> {
    let mut summary = ComposeSummary::default();

    match source {
        TemplateSource::Embedded => {
            for file in RUNTIME_TEMPLATE {
                let changed = emit(out, file.path, file.content.as_bytes(), tokens)?;
                summary.record(changed);
            }
        }
        TemplateSource::Dir(dir) => {
            if !dir.is_dir() {
                return Err(LayoutError::MissingTemplate(dir.clone()));
            }
            for path in collect_files(dir).map_err(|e| LayoutError::Read(dir.clone(), e))? {
                let rel = path.strip_prefix(dir).unwrap_or(&path);
                let bytes = fs::read(&path).map_err(|e| LayoutError::Read(path.clone(), e))?;
                let changed = emit(out, &rel.to_string_lossy(), &bytes, tokens)?;
                summary.record(changed);
            }
        }
    }

    Ok(summary)
}

impl ComposeSummary {
    fn record(&mut self, substituted: bool) {
        self.files += 1;
        if substituted {
            self.substituted += 1;
        }
    }
}

/// Write one template file. Returns whether substitution changed anything.
///
/// The full destination content is resolved in memory first, so a token
/// can never straddle a write boundary.
fn emit(out: &Path, rel: &str, bytes: &[u8], tokens: &TokenSet) -> Result<bool, LayoutError> {
    let rel_out = tokens.apply(rel);
    let dest = out.join(rel_out.as_ref());

    let (content, content_changed) = match std::str::from_utf8(bytes) {
        Ok(text) => {
            let replaced = tokens.apply(text);
            let changed = replaced.as_ref() != text;
            (replaced.into_owned().into_bytes(), changed)
        }
        Err(_) => (bytes.to_vec(), false),
    };

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| LayoutError::Write(parent.to_path_buf(), e))?;
    }
    fs::write(&dest, content).map_err(|e| LayoutError::Write(dest.clone(), e))?;

    Ok(content_changed || rel_out.as_ref() != rel)
}

/// All regular files under `dir`, dotfiles included, in sorted order.
pub fn collect_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_recursive(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        // Follows symlinks: a linked directory is copied as a directory.
        if fs::metadata(&path).is_ok_and(|m| m.is_dir()) {
            collect_recursive(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// Recursively copy `src` into `dest`. Returns the number of files copied.
pub fn copy_tree(src: &Path, dest: &Path) -> io::Result<usize> {
    let files = collect_files(src)?;
    for path in &files {
        let rel = path.strip_prefix(src).unwrap_or(path);
        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(path, &target)?;
    }
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runtime_tokens(prefix: &str) -> TokenSet {
        TokenSet::for_runtime(
            prefix,
            &BuildOptions {
                development: false,
                dynamic_origin: false,
                xff_depth: 1,
                assets: true,
            },
        )
    }

    #[test]
    fn test_embedded_template_resolves_all_tokens() {
        let dir = TempDir::new().unwrap();
        let summary = compose(&TemplateSource::Embedded, dir.path(), &runtime_tokens("MYAPP_"))
            .unwrap();
        assert_eq!(summary.files, RUNTIME_TEMPLATE.len());

        let env = fs::read_to_string(dir.path().join("env.js")).unwrap();
        assert!(env.contains("const prefix = \"MYAPP_\";"));
        assert!(env.contains(r#""xff_depth":1"#));

        let handler = fs::read_to_string(dir.path().join("handler.js")).unwrap();
        assert!(handler.contains("from './server/index.js'"));
        assert!(handler.contains("from './server/manifest.js'"));

        let dotenv = fs::read_to_string(dir.path().join(".env.example")).unwrap();
        assert!(dotenv.contains("MYAPP_PORT=3000"));

        for file in RUNTIME_TEMPLATE {
            let text = fs::read_to_string(dir.path().join(file.path)).unwrap();
            for token in ["SERVER", "MANIFEST", "ENV_PREFIX", "BUILD_OPTIONS"] {
                assert!(!text.contains(token), "{} still contains {token}", file.path);
            }
        }
    }

    #[test]
    fn test_dir_template_substitutes_names_and_content() {
        let tpl = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::create_dir_all(tpl.path().join("conf")).unwrap();
        fs::write(tpl.path().join("conf/dotENV_PREFIXsettings"), "prefix=ENV_PREFIX\n").unwrap();
        fs::write(tpl.path().join("logo.bin"), [0xff, 0xfe, b'S', b'E']).unwrap();

        let summary = compose(
            &TemplateSource::Dir(tpl.path().to_path_buf()),
            out.path(),
            &runtime_tokens("MYAPP_"),
        )
        .unwrap();

        assert_eq!(summary, ComposeSummary { files: 2, substituted: 1 });
        let conf = fs::read_to_string(out.path().join("conf/MYAPP_settings")).unwrap();
        assert_eq!(conf, "prefix=\"MYAPP_\"\n");
        assert_eq!(
            fs::read(out.path().join("logo.bin")).unwrap(),
            vec![0xff, 0xfe, b'S', b'E']
        );
    }

    #[test]
    fn test_missing_template_dir() {
        let out = TempDir::new().unwrap();
        let err = compose(
            &TemplateSource::Dir(out.path().join("nope")),
            out.path(),
            &runtime_tokens(""),
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::MissingTemplate(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_destination_is_fatal() {
        let out = TempDir::new().unwrap();
        // A file where the output directory should be.
        let blocked = out.path().join("build");
        fs::write(&blocked, "").unwrap();

        let err = compose(&TemplateSource::Embedded, &blocked, &runtime_tokens("")).unwrap_err();
        assert!(matches!(err, LayoutError::Write(..)));
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_follows_linked_directories() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("real/nested")).unwrap();
        fs::write(src.path().join("real/nested/page.html"), "<p>").unwrap();
        std::os::unix::fs::symlink(src.path().join("real"), src.path().join("linked")).unwrap();

        assert_eq!(copy_tree(src.path(), dest.path()).unwrap(), 2);
        assert_eq!(
            fs::read_to_string(dest.path().join("linked/nested/page.html")).unwrap(),
            "<p>"
        );
        assert!(dest.path().join("real/nested/page.html").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_dir_template_with_linked_directory() {
        let shared = TempDir::new().unwrap();
        let tpl = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::write(shared.path().join("env.js"), "export const p = ENV_PREFIX;\n").unwrap();
        std::os::unix::fs::symlink(shared.path(), tpl.path().join("lib")).unwrap();

        let summary = compose(
            &TemplateSource::Dir(tpl.path().to_path_buf()),
            out.path(),
            &runtime_tokens("MYAPP_"),
        )
        .unwrap();

        assert_eq!(summary.files, 1);
        assert_eq!(
            fs::read_to_string(out.path().join("lib/env.js")).unwrap(),
            "export const p = \"MYAPP_\";\n"
        );
    }

    #[test]
    fn test_copy_tree_includes_dotfiles() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("_app/immutable")).unwrap();
        fs::write(src.path().join("_app/immutable/start.js"), "x").unwrap();
        fs::write(src.path().join(".well-known"), "y").unwrap();

        assert_eq!(copy_tree(src.path(), dest.path()).unwrap(), 2);
        assert!(dest.path().join("_app/immutable/start.js").is_file());
        assert!(dest.path().join(".well-known").is_file());
    }
}
