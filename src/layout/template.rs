//! Template sources for the output layout.

use std::path::{Path, PathBuf};

/// One file of the built-in runtime template.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedFile {
    pub path: &'static str,
    pub content: &'static str,
}

/// Bun runtime entry shipped with the binary.
pub const RUNTIME_TEMPLATE: &[EmbeddedFile] = &[
    EmbeddedFile {
        path: "index.js",
        content: include_str!("files/index.js"),
    },
    EmbeddedFile {
        path: "handler.js",
        content: include_str!("files/handler.js"),
    },
    EmbeddedFile {
        path: "env.js",
        content: include_str!("files/env.js"),
    },
    EmbeddedFile {
        path: ".env.example",
        content: include_str!("files/.env.example"),
    },
];

/// Where the layout template comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// The runtime template compiled into the binary.
    Embedded,
    /// A user-provided directory, copied recursively.
    Dir(PathBuf),
}

impl TemplateSource {
    pub fn from_option(dir: Option<&Path>) -> Self {
        match dir {
            Some(dir) => Self::Dir(dir.to_path_buf()),
            None => Self::Embedded,
        }
    }
}

impl std::fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedded => write!(f, "built-in bun runtime"),
            Self::Dir(dir) => write!(f, "{}", dir.display()),
        }
    }
}
