//! Command-line interface module.

mod args;

pub use args::{BuildArgs, Cli, CodecArgs, Commands, CompressArgs};
