//! Rollup engine.
//!
//! Resolution prefers platform built-ins, CommonJS dependencies are
//! converted to ES modules, and JSON imports are parsed:
//!
//! ```text
//! npx rollup index=<tmp>/index.js manifest=<tmp>/manifest.js
//!     --format es --dir <out>/server --sourcemap
//!     --chunkFileNames chunks/[name]-[hash].js
//!     --external a,b
//!     --plugin node-resolve={preferBuiltins:true} --plugin commonjs --plugin json
//! ```

use super::{BundleDescriptor, BundleError, BundleOutput, Bundler, CHUNK_FILE_NAMES, run_checked};
use crate::utils::exec::{Cmd, FilterRule};

/// Rollup prints progress banners on stderr even on success.
static ROLLUP_FILTER: FilterRule = FilterRule::new(&["created ", "index=", "→"]);

const PLUGINS: [&str; 3] = ["node-resolve={preferBuiltins:true}", "commonjs", "json"];

pub struct RollupBundler {
    command: Vec<String>,
}

impl RollupBundler {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub(crate) fn command(&self, d: &BundleDescriptor) -> Cmd {
        let mut cmd = Cmd::from_slice(self.command.as_slice()).cwd(&d.cwd);

        for (name, path) in &d.inputs {
            cmd = cmd.arg(format!("{name}={}", path.display()));
        }

        cmd = cmd
            .args(["--format", "es", "--dir"])
            .arg(&d.out_dir)
            .args(["--chunkFileNames", CHUNK_FILE_NAMES]);

        if d.sourcemap {
            cmd = cmd.arg("--sourcemap");
        }
        if !d.external.is_empty() {
            cmd = cmd.arg("--external").arg(d.external.join(","));
        }
        for plugin in PLUGINS {
            cmd = cmd.args(["--plugin", plugin]);
        }

        cmd.filter(&ROLLUP_FILTER)
    }
}

impl Bundler for RollupBundler {
    fn name(&self) -> &'static str {
        "rollup"
    }

    fn bundle(&self, descriptor: &BundleDescriptor) -> Result<BundleOutput, BundleError> {
        run_checked(self.name(), descriptor, || {
            self.command(descriptor).run().map(|_| ())
        })
    }
}
