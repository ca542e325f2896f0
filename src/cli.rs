// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `vimigrate`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "vimigrate",
    version,
    about = "Back up and migrate virtualization configuration through a scripted interpreter session.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Operation to run; repeat to select several. Runs in the given order.
    ///
    /// If omitted, every configured operation runs in file order.
    #[arg(long = "op", value_name = "NAME")]
    pub operations: Vec<String>,

    /// Override `[backup].root` from the config file.
    #[arg(long, value_name = "DIR")]
    pub backup_root: Option<String>,

    /// List configured operations and exit.
    #[arg(long)]
    pub list: bool,

    /// Parse + validate, print the run plan, but don't start the interpreter.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `VIMIGRATE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
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
