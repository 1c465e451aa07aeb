//! Command-line interface definitions.
//!
//! `runall run` is the long-lived supervisor. `status`, `stop` and
//! `broadcast` are short-lived invocations that find the supervisor
//! through its status file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::paths;
use crate::port::outbound::http::HttpMethod;

/// Launch, health-gate, supervise and tear down a set of local services
#[derive(Parser, Debug)]
#[command(name = "runall")]
#[command(version)]
pub struct Cli {
    /// Color output mode [auto, always, never]
    #[arg(
        long,
        global = true,
        default_value = "auto",
        hide_possible_values = true
    )]
    pub color: ColorChoice,

    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to the configuration file
    #[arg(short, long, global = true, default_value_os_t = paths::default_config())]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Debug, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect automatically
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start services in launch order and supervise them until interrupted
    Run(RunArgs),

    /// Show the state of a running supervisor
    Status(StatusArgs),

    /// Ask a running supervisor to shut down
    Stop(StopArgs),

    /// Send one request to every running service
    Broadcast(BroadcastArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Subcommands for `runall config`.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Generate a new configuration file from template.
    Init(ConfigInitArgs),
    /// Display the effective configuration with defaults applied.
    Show,
    /// Validate a configuration file for correctness.
    Validate,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Services to start. Defaults to all of them. A subset must not
    /// reference exports of services left out.
    pub services: Vec<String>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Use JSON log format instead of pretty-printed logs.
    #[arg(long)]
    pub json_logs: bool,

    /// Override where the status file is written.
    #[arg(long)]
    pub status_file: Option<PathBuf>,

    /// Disable steady-state health monitoring.
    #[arg(long)]
    pub no_monitor: bool,

    /// Keep running when a service exits on its own.
    #[arg(long)]
    pub keep_going: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Status file to read.
    #[arg(long)]
    pub status_file: Option<PathBuf>,
}

/// Arguments for the `stop` subcommand.
#[derive(Parser, Debug)]
pub struct StopArgs {
    /// Status file to read.
    #[arg(long)]
    pub status_file: Option<PathBuf>,

    /// Seconds to wait for the supervisor to exit (0 to return at once).
    #[arg(long, default_value = "30")]
    pub wait: u64,
}

/// Arguments for the `broadcast` subcommand.
#[derive(Parser, Debug)]
pub struct BroadcastArgs {
    /// Path joined to each service's base URL, or a template with `{base}`.
    #[arg(default_value = "/info")]
    pub path: String,

    /// HTTP method.
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: HttpMethod,

    /// JSON request body.
    #[arg(short, long)]
    pub body: Option<String>,

    /// Only target services currently healthy.
    #[arg(long)]
    pub healthy_only: bool,

    /// Overall deadline in seconds. Defaults to `[broadcast].timeout_secs`.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Status file to read targets from.
    #[arg(long)]
    pub status_file: Option<PathBuf>,
}

/// Arguments for the `config init` subcommand.
#[derive(Parser, Debug)]
pub struct ConfigInitArgs {
    /// Output path. Defaults to `--config`.
    pub path: Option<PathBuf>,
    /// Overwrite the file if it already exists.
    #[arg(long)]
    pub force: bool,
}
