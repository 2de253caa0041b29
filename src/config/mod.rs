//! Adapter configuration from `bunpack.toml`.
//!
//! # Sections
//!
//! | Key / Section    | Purpose                                          |
//! |------------------|--------------------------------------------------|
//! | `out`            | Output directory of the deployment               |
//! | `precompress`    | `false`, `true`, or `{ gzip, brotli, files }`    |
//! | `env_prefix` ... | Runtime options written into the server entry    |
//! | `[input]`        | Build output of the framework and scratch dir    |
//! | `[bundler]`      | Engine and command used to bundle the server     |
//!
//! Every key is optional; with no file at all the current directory is the
//! project root and all defaults apply.

mod error;
mod util;

pub use error::ConfigError;

use crate::{
    bundle::Engine,
    cli::{BuildArgs, Cli},
    compress::CompressOptions,
    layout::BuildOptions,
    log,
    utils::path::{normalize_path, resolve_under},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use util::find_config_file;

// ============================================================================
// sections
// ============================================================================

/// `precompress = true | false | { gzip, brotli, files }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Precompress {
    Enabled(bool),
    Custom(PrecompressTable),
}

impl Default for Precompress {
    fn default() -> Self {
        Self::Enabled(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecompressTable {
    #[serde(default)]
    pub gzip: bool,
    #[serde(default)]
    pub brotli: bool,
    /// Eligible extensions; the default set when absent.
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

impl Precompress {
    pub fn to_options(&self) -> CompressOptions {
        match self {
            Self::Enabled(true) => CompressOptions::both(),
            Self::Enabled(false) => CompressOptions::default(),
            Self::Custom(table) => {
                let options = CompressOptions {
                    gzip: table.gzip,
                    brotli: table.brotli,
                    ..CompressOptions::default()
                };
                match &table.files {
                    Some(files) => options.with_extensions(files),
                    None => options,
                }
            }
        }
    }
}

/// `[input]` section: where the framework left its build output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub client: PathBuf,
    pub server: PathBuf,
    #[serde(rename = "static")]
    pub static_dir: PathBuf,
    pub prerendered: PathBuf,
    /// Scratch directory holding the patched server sources.
    pub tmp: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            client: ".svelte-kit/output/client".into(),
            server: ".svelte-kit/output/server".into(),
            static_dir: ".svelte-kit/output/static".into(),
            prerendered: ".svelte-kit/output/prerendered".into(),
            tmp: ".svelte-kit/bunpack".into(),
        }
    }
}

/// `[bundler]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerConfig {
    pub engine: Engine,
    /// Argv prefix; the engine's default when absent.
    pub command: Option<Vec<String>>,
}

impl BundlerConfig {
    pub fn command(&self) -> Vec<String> {
        self.command
            .clone()
            .unwrap_or_else(|| self.engine.default_command())
    }
}

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing bunpack.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Config file that was loaded, if any (internal use only)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Project root directory (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    /// Resolved compression settings after CLI overrides (internal use only)
    #[serde(skip)]
    pub compress: CompressOptions,

    pub out: PathBuf,
    pub precompress: Precompress,
    pub env_prefix: String,
    pub development: bool,
    pub dynamic_origin: bool,
    /// Trusted proxy hops when reading `X-Forwarded-For`.
    pub xff_depth: u32,
    /// Serve client/static/prerendered files from the runtime.
    pub assets: bool,
    /// JS expression spliced into the server hook table.
    pub websocket_hook: Option<String>,
    /// Project descriptor listing the runtime dependencies.
    pub package: PathBuf,
    /// Template directory replacing the embedded runtime.
    pub template: Option<PathBuf>,
    /// Maximum compression jobs in flight (0 = one per CPU).
    pub jobs: usize,
    pub input: InputConfig,
    pub bundler: BundlerConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            root: PathBuf::new(),
            compress: CompressOptions::default(),
            out: "build".into(),
            precompress: Precompress::default(),
            env_prefix: String::new(),
            development: false,
            dynamic_origin: false,
            xff_depth: 1,
            assets: true,
            websocket_hook: None,
            package: "package.json".into(),
            template: None,
            jobs: 0,
            input: InputConfig::default(),
            bundler: BundlerConfig::default(),
        }
    }
}

impl AdapterConfig {
    /// Load configuration for a build run.
    ///
    /// Searches upward from cwd for the config file; the project root is
    /// its parent directory, or cwd when there is none.
    pub fn load(cli: &Cli, args: &BuildArgs) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let mut config = match find_config_file(&cli.config, &cwd) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.config_path = Some(normalize_path(&path));
                config
            }
            None => {
                crate::debug!("config"; "no {} found, using defaults", cli.config.display());
                Self::default()
            }
        };

        let root = config
            .config_path
            .as_deref()
            .and_then(Path::parent)
            .map_or(cwd, Path::to_path_buf);

        config.finalize(&root, args);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {} ignored: {}", display_path, fields.join(", "));
    }

    /// Set the root, apply CLI overrides and make every path absolute.
    pub fn finalize(&mut self, root: &Path, args: &BuildArgs) {
        self.root = normalize_path(root);
        self.apply_build_args(args);
        self.normalize_paths();
    }

    /// Apply build arguments from CLI.
    fn apply_build_args(&mut self, args: &BuildArgs) {
        if let Some(out) = &args.out {
            self.out = out.clone();
        }
        if let Some(enabled) = args.precompress {
            self.precompress = Precompress::Enabled(enabled);
        }
        Self::update_option(&mut self.env_prefix, args.env_prefix.as_ref());
        Self::update_option(&mut self.development, args.development.as_ref());
        Self::update_option(&mut self.jobs, args.jobs.as_ref());

        if let Some(engine) = args.bundler
            && engine != self.bundler.engine
        {
            // A configured command belongs to the configured engine.
            self.bundler.engine = engine;
            self.bundler.command = None;
        }

        self.compress = args.codecs.apply(self.precompress.to_options());
    }

    fn update_option<T: Clone>(target: &mut T, value: Option<&T>) {
        if let Some(v) = value {
            *target = v.clone();
        }
    }

    fn normalize_paths(&mut self) {
        let root = self.root.clone();
        let resolve = |path: &mut PathBuf| *path = resolve_under(path, &root);

        resolve(&mut self.out);
        resolve(&mut self.package);
        resolve(&mut self.input.client);
        resolve(&mut self.input.server);
        resolve(&mut self.input.static_dir);
        resolve(&mut self.input.prerendered);
        resolve(&mut self.input.tmp);
        if let Some(template) = self.template.as_mut() {
            resolve(template);
        }
    }

    /// Check the finalized configuration, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.xff_depth < 1 {
            problems.push("`xff_depth` must be at least 1".to_string());
        }
        if let Some(template) = &self.template
            && !template.is_dir()
        {
            problems.push(format!(
                "`template` directory `{}` does not exist",
                template.display()
            ));
        }
        if self.bundler.command.as_ref().is_some_and(|c| c.is_empty()) {
            problems.push("`bundler.command` must not be empty".to_string());
        }
        if self.out == self.root {
            problems.push("`out` must not be the project root".to_string());
        }
        if self.input.tmp == self.root || self.input.tmp == self.out {
            problems.push("`input.tmp` must be its own directory".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems))
        }
    }

    /// Runtime options serialized into the `BUILD_OPTIONS` token.
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            development: self.development,
            dynamic_origin: self.dynamic_origin,
            xff_depth: self.xff_depth,
            assets: self.assets,
        }
    }
}
