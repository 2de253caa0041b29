//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration:\n{}", .0.iter().map(|m| format!("  → {m}")).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}
