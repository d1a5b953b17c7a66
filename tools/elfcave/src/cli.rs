//! Command-line interface definitions for elfcave.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Policy;

/// Find code caves in ELF64 executables and inject entry-point trampolines.
#[derive(Parser)]
#[command(name = "elfcave", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (default: `elfcave.toml` if present).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Print only results and errors.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also print skipped segments, section layout and timings.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// List verified code caves.
    Caves(CavesArgs),
    /// Write a payload behind a trampoline into a cave.
    Inject(InjectArgs),
}

/// Arguments for the `caves` subcommand.
#[derive(Parser)]
pub struct CavesArgs {
    /// ELF64 file to inspect.
    pub file: PathBuf,

    /// Only list caves larger than this many bytes.
    #[arg(long, short = 'n', default_value_t = 0)]
    pub need: u64,
}

/// Arguments for the `inject` subcommand.
#[derive(Parser)]
pub struct InjectArgs {
    /// ELF64 file to patch in place.
    pub file: PathBuf,

    /// File holding the raw payload bytes.
    pub payload: PathBuf,

    /// Use the cave behind this program header index.
    #[arg(long, short = 's', conflicts_with = "policy")]
    pub segment: Option<usize>,

    /// How to choose a cave (overrides the configuration file).
    #[arg(long, short = 'p', value_enum)]
    pub policy: Option<Policy>,

    /// Show what would be written without opening the file for writing.
    #[arg(long)]
    pub dry_run: bool,

    /// Copy the file to `<FILE>.bak` before patching.
    #[arg(long, short = 'b')]
    pub backup: bool,
}
