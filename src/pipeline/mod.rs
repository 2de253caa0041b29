//! Packaging pipeline.
//!
//! Phases, in order:
//! - **Clean** - remove the output and scratch directories
//! - **Copy** - client/static/prerendered into the output, server sources
//!   into the scratch directory
//! - **Patch** - splice the websocket hook into the server entry
//! - **Bundle** - bundle entry + manifest into `<out>/server`
//! - **Layout** - compose the runtime template with substituted tokens
//! - **Compress** - precompress client, static and prerendered in turn
//!
//! Everything up to layout is fatal on error. Compression failures are
//! reported per file and never abort the run.


use crate::{
    bundle::{BundleDescriptor, BundleError, BundleOutput, Bundler},
    compress::{CompressReport, JobFailure, Precompressor},
    config::AdapterConfig,
    layout::{self, ComposeSummary, LayoutError, TemplateSource, TokenSet},
    log,
    package::{DependencyManifest, PackageError},
    patch::{self, PatchOutcome, Unchanged},
    utils::{path::relative_display, plural_count},
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// A fatal pipeline failure, tagged with the stage it happened in.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to clean `{0}`")]
    Clean(PathBuf, #[source] io::Error),

    #[error("failed to copy `{0}`")]
    Copy(PathBuf, #[source] io::Error),

    #[error("failed to patch `{0}`")]
    Patch(PathBuf, #[source] io::Error),

    #[error("failed to read dependencies")]
    Package(#[from] PackageError),

    #[error("bundling failed")]
    Bundle(#[from] BundleError),

    #[error("failed to compose output layout")]
    Layout(#[from] LayoutError),

    #[error("failed to start compression workers")]
    Workers(#[from] rayon::ThreadPoolBuildError),
}

/// What a successful run did.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub copied: usize,
    pub patch: Option<PatchOutcome>,
    pub bundle: BundleOutput,
    pub layout: ComposeSummary,
    /// `None` when precompression is off.
    pub compress: Option<CompressReport>,
}

/// Output subdirectories, in compression order.
const ASSET_DIRS: [&str; 3] = ["client", "static", "prerendered"];

/// One packaging run over a finalized configuration.
pub struct Pipeline<'a> {
    config: &'a AdapterConfig,
    bundler: Box<dyn Bundler>,
}

impl<'a> Pipeline<'a> {
    /// Pipeline using the configured bundling engine.
    pub fn new(config: &'a AdapterConfig) -> Self {
        let bundler = config.bundler.engine.bundler(config.bundler.command());
        Self::with_bundler(config, bundler)
    }

    pub fn with_bundler(config: &'a AdapterConfig, bundler: Box<dyn Bundler>) -> Self {
        Self { config, bundler }
    }

    /// Run every phase. Returns on the first fatal error.
    pub fn run(&self) -> Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport::default();

        self.clean()?;
        report.copied = self.copy()?;
        report.patch = Some(self.patch()?);
        report.bundle = self.bundle()?;
        report.layout = self.compose()?;
        report.compress = self.precompress()?;

        log!(
            "done";
            "Start server with: bun ./{}/index.js",
            relative_display(&self.config.out, &self.config.root)
        );
        Ok(report)
    }

    fn clean(&self) -> Result<(), PipelineError> {
        for dir in [&self.config.out, &self.config.input.tmp] {
            remove_dir_if_exists(dir).map_err(|e| PipelineError::Clean(dir.clone(), e))?;
        }
        Ok(())
    }

    fn copy(&self) -> Result<usize, PipelineError> {
        let input = &self.config.input;
        let out = &self.config.out;

        // Client and server output are always produced by the framework;
        // static and prerendered may be absent.
        let copies = [
            (&input.client, out.join("client"), true),
            (&input.static_dir, out.join("static"), false),
            (&input.prerendered, out.join("prerendered"), false),
            (&input.server, input.tmp.clone(), true),
        ];

        let mut total = 0;
        for (src, dest, required) in copies {
            if !required && !src.exists() {
                crate::debug!("copy"; "{} not found, skipping", self.display(src));
                continue;
            }
            total += layout::copy_tree(src, &dest).map_err(|e| PipelineError::Copy(src.clone(), e))?;
        }

        log!("copy"; "{}", plural_count(total, "file"));
        Ok(total)
    }

    fn patch(&self) -> Result<PatchOutcome, PipelineError> {
        let entry = self.config.input.tmp.join("index.js");
        let outcome = patch::patch_entry(&entry, self.config.websocket_hook.as_deref())
            .map_err(|e| PipelineError::Patch(entry.clone(), e))?;

        match outcome {
            PatchOutcome::Patched(_) => log!("patch"; "websocket hook added"),
            PatchOutcome::Unchanged(Unchanged::AlreadyPatched) => {
                crate::debug!("patch"; "websocket hook already present");
            }
            PatchOutcome::Unchanged(Unchanged::MarkerMissing) => {
                log!("warning"; "server hook table not found, websocket hook not added");
            }
        }
        Ok(outcome)
    }

    fn bundle(&self) -> Result<BundleOutput, PipelineError> {
        let deps = DependencyManifest::load(&self.config.package)?;
        crate::debug!("bundle"; "{}", plural_count(deps.len(), "external package"));

        let tmp = &self.config.input.tmp;
        let descriptor = BundleDescriptor::server(
            tmp.join("index.js"),
            tmp.join("manifest.js"),
            deps.external_names(),
            self.config.out.join("server"),
            self.config.root.clone(),
        );

        let output = self.bundler.bundle(&descriptor)?;
        log!(
            "bundle";
            "{} with {} ({})",
            plural_count(output.modules, "module"),
            self.bundler.name(),
            plural_count(output.sourcemaps, "sourcemap")
        );
        Ok(output)
    }

    fn compose(&self) -> Result<ComposeSummary, PipelineError> {
        let source = TemplateSource::from_option(self.config.template.as_deref());
        let tokens = TokenSet::for_runtime(&self.config.env_prefix, &self.config.build_options());

        let summary = layout::compose(&source, &self.config.out, &tokens)?;
        log!(
            "layout";
            "{} from {} template",
            plural_count(summary.files, "file"),
            source
        );
        Ok(summary)
    }

    fn precompress(&self) -> Result<Option<CompressReport>, PipelineError> {
        let options = &self.config.compress;
        if !options.is_enabled() {
            return Ok(None);
        }

        let engine = Precompressor::new(self.config.jobs)?;
        crate::debug!("compress"; "{} workers", engine.max_jobs());

        // Directories run one after another; jobs inside each are concurrent.
        let mut report = CompressReport::default();
        for name in ASSET_DIRS {
            let dir = self.config.out.join(name);
            report.merge(engine.run(&dir, options, true));
        }

        log_compress_report(&report, &self.config.out);
        Ok(Some(report))
    }

    fn display(&self, path: &Path) -> String {
        relative_display(path, &self.config.root)
    }
}

fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Summarize a compression run, naming every failed file.
pub fn log_compress_report(report: &CompressReport, base: &Path) {
    let (input, output) = report.bytes();
    log!(
        "compress";
        "{}, {} written ({} → {} bytes)",
        plural_count(report.files, "file"),
        plural_count(report.completed.len(), "sibling"),
        input,
        output
    );

    for JobFailure {
        source,
        codec,
        stage,
        error,
    } in &report.failures
    {
        log!(
            "error";
            "{} ({codec}, {stage}): {error}",
            relative_display(source, base)
        );
    }
    if !report.is_success() {
        log!("warning"; "{} failed", plural_count(report.failures.len(), "compression job"));
    }
}
