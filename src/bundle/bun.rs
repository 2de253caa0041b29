//! Bun engine (`bun build`).
//!
//! Bun resolves built-ins, CommonJS and JSON natively, so only the output
//! shape needs flags. Entries are named after their file stems, which is
//! why the scratch directory keeps `index.js` and `manifest.js` names.

use super::{BundleDescriptor, BundleError, BundleOutput, Bundler, run_checked};
use crate::utils::exec::{Cmd, FilterRule};

static BUN_FILTER: FilterRule = FilterRule::new(&["Bundled ", "  "]);

/// Bun spells the chunk pattern with an `[ext]` placeholder.
const CHUNK_NAMING: &str = "chunks/[name]-[hash].[ext]";

pub struct BunBundler {
    command: Vec<String>,
}

impl BunBundler {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub(crate) fn command(&self, d: &BundleDescriptor) -> Cmd {
        let mut cmd = Cmd::from_slice(self.command.as_slice()).cwd(&d.cwd).arg("build");

        for (_, path) in &d.inputs {
            cmd = cmd.arg(path);
        }

        cmd = cmd
            .arg("--outdir")
            .arg(&d.out_dir)
            .args(["--target", "bun", "--format", "esm", "--splitting"])
            .args(["--chunk-naming", CHUNK_NAMING]);

        if d.sourcemap {
            cmd = cmd.arg("--sourcemap=external");
        }
        for name in &d.external {
            cmd = cmd.args(["--external", name.as_str()]);
        }

        cmd.filter(&BUN_FILTER)
    }
}

impl Bundler for BunBundler {
    fn name(&self) -> &'static str {
        "bun"
    }

    fn bundle(&self, descriptor: &BundleDescriptor) -> Result<BundleOutput, BundleError> {
        run_checked(self.name(), descriptor, || {
            self.command(descriptor).run().map(|_| ())
        })
    }
}
