//! Codec selection and eligibility.

use rustc_hash::FxHashSet;
use std::{fmt, path::Path};

/// Extensions compressed when the caller does not choose: markup, script,
/// style, structured data, vector images and wasm modules.
pub const DEFAULT_EXTENSIONS: [&str; 7] = ["html", "js", "json", "css", "svg", "xml", "wasm"];

/// Compression codec; each writes a `<file>.<ext>` sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Gzip,
    Brotli,
}

impl Codec {
    /// Sibling file suffix (without the dot).
    pub const fn ext(self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Brotli => "br",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ext())
    }
}

/// Resolved settings for one precompression run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressOptions {
    pub gzip: bool,
    pub brotli: bool,
    pub extensions: FxHashSet<String>,
}

impl Default for CompressOptions {
    /// Both codecs off, default extension set.
    fn default() -> Self {
        Self {
            gzip: false,
            brotli: false,
            extensions: default_extensions(),
        }
    }
}

impl CompressOptions {
    /// Both codecs on, default extensions.
    pub fn both() -> Self {
        Self {
            gzip: true,
            brotli: true,
            ..Self::default()
        }
    }

    /// Replace the eligible extension set. Leading dots are ignored.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    /// Enabled codecs, gzip first.
    pub fn codecs(&self) -> Vec<Codec> {
        let mut codecs = Vec::with_capacity(2);
        if self.gzip {
            codecs.push(Codec::Gzip);
        }
        if self.brotli {
            codecs.push(Codec::Brotli);
        }
        codecs
    }

    pub fn is_enabled(&self) -> bool {
        self.gzip || self.brotli
    }

    /// Whether `path` has an eligible extension (case-sensitive).
    pub fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(e))
    }
}

pub fn default_extensions() -> FxHashSet<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect()
}
