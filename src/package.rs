//! Project descriptor (`package.json`) reading.
//!
//! Only the `dependencies` table matters here: every name in it stays
//! external to the server bundle and is resolved from `node_modules` at
//! runtime.

use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("failed to read `{0}`")]
    Io(PathBuf, #[source] io::Error),

    #[error("`{0}` is not a valid package descriptor")]
    Json(PathBuf, #[source] serde_json::Error),
}

/// Dependency name to version constraint, as declared by the project.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DependencyManifest {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

impl DependencyManifest {
    /// Read the descriptor at `path`. A missing file means no dependencies.
    pub fn load(path: &Path) -> Result<Self, PackageError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(PackageError::Io(path.to_path_buf(), e)),
        };
        Self::parse(&content).map_err(|e| PackageError::Json(path.to_path_buf(), e))
    }

    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Package names to leave out of the bundle, sorted.
    pub fn external_names(&self) -> Vec<String> {
        self.dependencies.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }
}
