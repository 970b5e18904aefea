//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for hostprobe.

use clap::{Args, Parser, Subcommand};

use crate::orchestrator::{
    CpuMethod, DiskMethod, Language, MemoryMethod, Nt3Location, Nt3Type, ThreadMode,
};
use crate::strategy::ExecutionMode;

/// hostprobe - host diagnostics runner
///
/// Locates the goecs helper for this platform, runs the selected probes
/// through it and prints their output as one ordered transcript.
#[derive(Parser, Debug)]
#[command(name = "hostprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a diagnostics selection
    Run(RunArgs),

    /// Show where the helper would be loaded from
    Locate {
        /// Path to configuration file
        #[arg(short, long, env = "HOSTPROBE_CONFIG")]
        config: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the numbered selection presets
    Presets,

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Options for `hostprobe run`. Unset options fall back to the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Path to configuration file
    #[arg(short, long, env = "HOSTPROBE_CONFIG")]
    pub config: Option<String>,

    /// Numbered preset (see `hostprobe presets`)
    #[arg(short, long, conflicts_with = "tests", value_parser = clap::value_parser!(u8).range(1..=10))]
    pub preset: Option<u8>,

    /// Comma-separated tests, e.g. basic,cpu,speed
    #[arg(short, long)]
    pub tests: Option<String>,

    /// Output language
    #[arg(short, long, value_enum)]
    pub language: Option<Language>,

    /// How the probes are executed
    #[arg(short, long, value_enum)]
    pub mode: Option<ExecutionMode>,

    /// CPU benchmark tool
    #[arg(long, value_enum)]
    pub cpu_method: Option<CpuMethod>,

    /// CPU thread mode
    #[arg(long, value_enum)]
    pub thread_mode: Option<ThreadMode>,

    /// Memory benchmark tool
    #[arg(long, value_enum)]
    pub memory_method: Option<MemoryMethod>,

    /// Disk benchmark tool
    #[arg(long, value_enum)]
    pub disk_method: Option<DiskMethod>,

    /// Directory to benchmark
    #[arg(long)]
    pub disk_path: Option<String>,

    /// Test every mounted disk
    #[arg(long)]
    pub disk_multi: bool,

    /// Route-trace origin
    #[arg(long, value_enum)]
    pub nt3_location: Option<Nt3Location>,

    /// Route-trace address family
    #[arg(long, value_enum)]
    pub nt3_type: Option<Nt3Type>,

    /// Speed-test nodes per carrier
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub speed_nodes: Option<u32>,

    /// Write the transcript to this file
    #[arg(short, long)]
    pub output: Option<String>,

    /// Print the helper command that would run, then exit
    #[arg(long)]
    pub dry_run: bool,
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
