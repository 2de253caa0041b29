//! Command-line interface definitions.

use crate::{bundle::Engine, compress::CompressOptions};
use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Package a SvelteKit build for Bun and precompress its assets
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path, searched upward from the current directory
    #[arg(short = 'C', long, global = true, default_value = "bunpack.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Package the build output into a Bun deployment
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Precompress one directory in place
    #[command(visible_alias = "c")]
    Compress {
        #[command(flatten)]
        args: CompressArgs,
    },
}

/// Build command arguments. Each one overrides the config file.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Output directory (relative to project root)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub out: Option<PathBuf>,

    /// Precompress assets with both gzip and brotli
    #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub precompress: Option<bool>,

    #[command(flatten)]
    pub codecs: CodecArgs,

    /// Prefix for runtime environment variables (e.g. `MYAPP_`)
    #[arg(short, long)]
    pub env_prefix: Option<String>,

    /// Build the runtime in development mode
    #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub development: Option<bool>,

    /// Maximum compression jobs in flight (0 = one per CPU)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Bundling engine for the server
    #[arg(short, long, value_enum)]
    pub bundler: Option<Engine>,
}

/// Compress command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct CompressArgs {
    /// Directory to precompress
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub dir: PathBuf,

    #[command(flatten)]
    pub codecs: CodecArgs,

    /// Maximum compression jobs in flight (0 = one per CPU)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,
}

/// Codec and extension selection shared by `build` and `compress`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CodecArgs {
    /// Emit `.gz` siblings
    #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub gzip: Option<bool>,

    /// Emit `.br` siblings
    #[arg(short = 'r', long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub brotli: Option<bool>,

    /// Extensions eligible for compression (comma-separated)
    #[arg(short = 'x', long = "compress-ext", value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,
}

impl CodecArgs {
    /// Layer the given flags over `options`.
    pub fn apply(&self, mut options: CompressOptions) -> CompressOptions {
        if let Some(gzip) = self.gzip {
            options.gzip = gzip;
        }
        if let Some(brotli) = self.brotli {
            options.brotli = brotli;
        }
        match &self.extensions {
            Some(exts) => options.with_extensions(exts),
            None => options,
        }
    }
}

impl CompressArgs {
    /// Options for a standalone run: both codecs unless one is named.
    pub fn options(&self) -> CompressOptions {
        let base = if self.codecs.gzip.is_none() && self.codecs.brotli.is_none() {
            CompressOptions::both()
        } else {
            CompressOptions::default()
        };
        self.codecs.apply(base)
    }
}
