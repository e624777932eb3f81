// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::parse_duration;

/// Command-line arguments for `procrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procrun",
    version,
    about = "Run an external command with output pumping, timeouts and cleanup.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `procrun.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Working directory for the command.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Environment override (repeatable).
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Start from an empty environment instead of the inherited one.
    #[arg(long)]
    pub new_env: bool,

    /// Kill the command after this long (e.g. "500ms", "30s", "5m").
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Launch through the platform shell.
    #[arg(long)]
    pub shell: bool,

    /// Change directory through the helper script (needs an install root).
    #[arg(long)]
    pub helper_script: bool,

    /// Directory that contains `bin/procrun-cd`.
    #[arg(long, value_name = "DIR")]
    pub install_root: Option<PathBuf>,

    /// Write stdout (and stderr, unless --error is given) to this file.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write stderr to this file.
    #[arg(long, value_name = "FILE", requires = "output")]
    pub error: Option<PathBuf>,

    /// Append to output files instead of truncating.
    #[arg(long, requires = "output")]
    pub append: bool,

    /// Route the command's output through the log.
    #[arg(long, conflicts_with = "output")]
    pub log_output: bool,

    /// Report a failing exit code instead of treating it as an error.
    #[arg(long)]
    pub no_fail: bool,

    /// Do not look the program up on PATH.
    #[arg(long)]
    pub no_search_path: bool,

    /// Start the command detached, print its pid and return immediately.
    #[arg(long)]
    pub spawn: bool,

    /// Print the inherited environment as a child process sees it.
    #[arg(long)]
    pub probe_env: bool,

    /// Print what would be run, without running it.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// The command and its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
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
