use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use runall::adapter::inbound::cli::command::{Cli, ColorChoice, Commands, ConfigCommand};
use runall::adapter::inbound::cli::diagnostic::ConfigDiagnostic;
use runall::adapter::inbound::cli::output::{self, OutputConfig};
use runall::adapter::inbound::cli::{broadcast, config, paths, run, status, stop};
use runall::error::{Error, Result};
use runall::infrastructure::config::settings::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => output::auto_color(),
    };
    output::configure(OutputConfig::new(cli.json, cli.quiet, cli.verbose, color));

    match dispatch(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&cli, &e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Run(args) => run::execute(&cli.config, args).await,
        Commands::Status(args) => {
            let path = status_path(args.status_file.as_deref(), &cli.config);
            status::execute(&path)
        }
        Commands::Stop(args) => {
            let path = status_path(args.status_file.as_deref(), &cli.config);
            stop::execute(&path, Duration::from_secs(args.wait)).await
        }
        Commands::Broadcast(args) => {
            let loaded = load_optional(&cli.config);
            let path = paths::status_file(args.status_file.as_deref(), loaded.as_ref());
            let defaults = loaded.map(|c| c.broadcast).unwrap_or_default();
            broadcast::execute(&path, &defaults, args).await
        }
        Commands::Config(ConfigCommand::Init(args)) => {
            config::execute_init(args.path.as_deref().unwrap_or(&cli.config), args.force)
        }
        Commands::Config(ConfigCommand::Show) => config::execute_show(&cli.config),
        Commands::Config(ConfigCommand::Validate) => config::execute_validate(&cli.config),
    }
}

/// Commands that only observe a supervisor still honour a configured
/// status file, but do not require a valid config.
fn load_optional(config_path: &Path) -> Option<Config> {
    if config_path.exists() {
        Config::load(config_path).ok()
    } else {
        None
    }
}

fn status_path(explicit: Option<&Path>, config_path: &Path) -> std::path::PathBuf {
    paths::status_file(explicit, load_optional(config_path).as_ref())
}

/// Print `error`, as a source-annotated diagnostic when it is about the
/// config file's content.
fn report_error(cli: &Cli, error: &Error) {
    let loads_config = matches!(
        cli.command,
        Commands::Run(_) | Commands::Config(ConfigCommand::Show | ConfigCommand::Validate)
    );
    if loads_config && !output::is_json() {
        if let Ok(src) = std::fs::read_to_string(&cli.config) {
            let name = cli.config.display().to_string();
            if let Some(diagnostic) = ConfigDiagnostic::from_error(error, &name, &src) {
                eprintln!("{:?}", miette::Report::new(diagnostic));
                return;
            }
        }
    }
    output::error(&error.to_string());
}
