//! bunpack - package a SvelteKit build into a Bun deployment.

mod bundle;
mod cli;
mod compress;
mod config;
mod layout;
mod logger;
mod package;
mod patch;
mod pipeline;
mod utils;

use anyhow::{Context, Result, bail};
use clap::{ColorChoice, Parser};
use cli::{BuildArgs, Cli, Commands, CompressArgs};
use compress::Precompressor;
use config::AdapterConfig;
use pipeline::Pipeline;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    match &cli.command {
        Commands::Build { build_args } => build(&cli, build_args),
        Commands::Compress { args } => compress_dir(args),
    }
}

fn build(cli: &Cli, args: &BuildArgs) -> Result<()> {
    let config = AdapterConfig::load(cli, args)?;
    debug!("config"; "project root {}", config.root.display());

    Pipeline::new(&config)
        .run()
        .context("packaging failed")?;
    Ok(())
}

fn compress_dir(args: &CompressArgs) -> Result<()> {
    let dir = utils::path::normalize_path(&args.dir);
    if !dir.is_dir() {
        bail!("`{}` is not a directory", args.dir.display());
    }

    let engine = Precompressor::new(args.jobs).context("failed to start compression workers")?;
    let report = engine.run(&dir, &args.options(), true);
    pipeline::log_compress_report(&report, &dir);

    if !report.is_success() {
        bail!(
            "{} failed",
            utils::plural_count(report.failures.len(), "compression job")
        );
    }
    Ok(())
}
