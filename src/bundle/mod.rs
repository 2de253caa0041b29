//! Server bundling.
//!
//! The patched entry and the route manifest go through an external
//! bundler into a code-split ES module bundle under `<out>/server`. The
//! engine is a trait so the pipeline does not care which tool runs.
//!
//! | Engine   | Invocation                                  |
//! |----------|---------------------------------------------|
//! | `rollup` | `npx rollup index=… manifest=… --format es` |
//! | `bun`    | `bun build … --target bun --splitting`      |

mod bun;
mod rollup;

pub use bun::BunBundler;
pub use rollup::RollupBundler;

use crate::utils::exec::ExecError;
use jwalk::WalkDir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name pattern for shared chunks; the hash keeps rebuilds from
/// colliding with stale chunks.
pub const CHUNK_FILE_NAMES: &str = "chunks/[name]-[hash].js";

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle input `{name}` not found at `{path}`")]
    MissingInput { name: String, path: PathBuf },

    #[error("{engine} failed")]
    Engine {
        engine: &'static str,
        #[source]
        source: ExecError,
    },

    #[error("{engine} finished but `{path}` was not produced")]
    MissingOutput { engine: &'static str, path: PathBuf },
}

/// Supported bundling engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Rollup,
    Bun,
}

impl Engine {
    /// Argv prefix used when none is configured.
    pub fn default_command(self) -> Vec<String> {
        match self {
            Self::Rollup => vec!["npx".into(), "rollup".into()],
            Self::Bun => vec!["bun".into()],
        }
    }

    /// Build the bundler for this engine around an argv prefix.
    pub fn bundler(self, command: Vec<String>) -> Box<dyn Bundler> {
        match self {
            Self::Rollup => Box::new(RollupBundler::new(command)),
            Self::Bun => Box::new(BunBundler::new(command)),
        }
    }
}

/// Everything one bundler run needs. Built once per run.
#[derive(Debug, Clone)]
pub struct BundleDescriptor {
    /// Named entry points, in output order.
    pub inputs: Vec<(String, PathBuf)>,
    /// Package names left as runtime imports.
    pub external: Vec<String>,
    pub out_dir: PathBuf,
    /// Working directory for the engine (project root, for `node_modules`).
    pub cwd: PathBuf,
    pub sourcemap: bool,
}

impl BundleDescriptor {
    /// Descriptor for the server: `index` entry plus `manifest` module.
    pub fn server(
        entry: PathBuf,
        manifest: PathBuf,
        external: Vec<String>,
        out_dir: PathBuf,
        cwd: PathBuf,
    ) -> Self {
        Self {
            inputs: vec![("index".into(), entry), ("manifest".into(), manifest)],
            external,
            out_dir,
            cwd,
            sourcemap: true,
        }
    }

    fn check_inputs(&self) -> Result<(), BundleError> {
        match self.inputs.iter().find(|(_, path)| !path.is_file()) {
            Some((name, path)) => Err(BundleError::MissingInput {
                name: name.clone(),
                path: path.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Path each named input lands at in the output directory.
    pub fn output_for(&self, name: &str) -> PathBuf {
        self.out_dir.join(format!("{name}.js"))
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleOutput {
    pub modules: usize,
    pub sourcemaps: usize,
}

impl BundleOutput {
    /// Count emitted modules and maps under `dir`.
    pub fn scan(dir: &Path) -> Self {
        let mut output = Self::default();
        for entry in WalkDir::new(dir).into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.ends_with(".map") {
                output.sourcemaps += 1;
            } else if name.ends_with(".js") {
                output.modules += 1;
            }
        }
        output
    }
}

/// A bundling engine.
pub trait Bundler {
    fn name(&self) -> &'static str;

    /// Produce the bundle described by `descriptor`. Any failure is fatal.
    fn bundle(&self, descriptor: &BundleDescriptor) -> Result<BundleOutput, BundleError>;
}

/// Shared tail of every engine: inputs present before, entries present after.
pub(crate) fn run_checked(
    engine: &'static str,
    descriptor: &BundleDescriptor,
    run: impl FnOnce() -> Result<(), ExecError>,
) -> Result<BundleOutput, BundleError> {
    descriptor.check_inputs()?;
    run().map_err(|source| BundleError::Engine { engine, source })?;

    for (name, _) in &descriptor.inputs {
        let path = descriptor.output_for(name);
        if !path.is_file() {
            return Err(BundleError::MissingOutput { engine, path });
        }
    }
    Ok(BundleOutput::scan(&descriptor.out_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn descriptor(dir: &Path) -> BundleDescriptor {
        BundleDescriptor::server(
            dir.join("tmp/index.js"),
            dir.join("tmp/manifest.js"),
            vec![],
            dir.join("out/server"),
            dir.to_path_buf(),
        )
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let dir = TempDir::new().unwrap();
        let d = descriptor(dir.path());
        let err = run_checked("test", &d, || Ok(())).unwrap_err();
        assert!(matches!(err, BundleError::MissingInput { ref name, .. } if name == "index"));
    }

    #[test]
    fn test_missing_output_is_fatal() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("tmp")).unwrap();
        fs::write(dir.path().join("tmp/index.js"), "").unwrap();
        fs::write(dir.path().join("tmp/manifest.js"), "").unwrap();

        let d = descriptor(dir.path());
        let err = run_checked("test", &d, || Ok(())).unwrap_err();
        assert!(matches!(err, BundleError::MissingOutput { .. }));
    }

    #[test]
    fn test_engine_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("tmp")).unwrap();
        fs::write(dir.path().join("tmp/index.js"), "").unwrap();
        fs::write(dir.path().join("tmp/manifest.js"), "").unwrap();

        let d = descriptor(dir.path());
        let err = run_checked("test", &d, || {
            Err(ExecError::Failed("Could not resolve './missing'".into()))
        })
        .unwrap_err();
        assert!(matches!(err, BundleError::Engine { engine: "test", .. }));
    }

    #[test]
    fn test_scan_counts_modules_and_maps() {
        let dir = TempDir::new().unwrap();
        let out = dir.path();
        fs::create_dir_all(out.join("chunks")).unwrap();
        for name in ["index.js", "index.js.map", "manifest.js", "chunks/a-1f2e.js"] {
            fs::write(out.join(name), "").unwrap();
        }

        let output = BundleOutput::scan(out);
        assert_eq!(output.modules, 3);
        assert_eq!(output.sourcemaps, 1);
    }

    #[test]
    fn test_engine_defaults() {
        assert_eq!(Engine::default(), Engine::Rollup);
        assert_eq!(Engine::Rollup.default_command(), vec!["npx", "rollup"]);
        assert_eq!(Engine::Bun.bundler(vec!["bun".into()]).name(), "bun");
    }
}
