// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `goalwork`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "goalwork",
    version,
    about = "Run a plan of dependent jobs and report their progress as a tree.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the plan file (TOML).
    ///
    /// Default: `Goalwork.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Goalwork.toml")]
    pub plan: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `GOALWORK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the plan, but don't run any job.
    #[arg(long)]
    pub dry_run: bool,

    /// Cancel every job still running after this many milliseconds.
    #[arg(long, value_name = "MS")]
    pub cancel_after_ms: Option<u64>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
