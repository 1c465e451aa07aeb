//! Handler for the `config` command group.

use std::fs;
use std::path::Path;

use crate::adapter::inbound::cli::output;
use crate::domain::BASE_URL_EXPORT;
use crate::error::{ConfigError, Result};
use crate::infrastructure::config::settings::Config;

/// Default config template with documentation.
const CONFIG_TEMPLATE: &str = include_str!("../../../../runall.toml.example");

/// Execute `config init`.
pub fn execute_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(ConfigError::InvalidValue {
            field: "config",
            reason: "file already exists (use --force to overwrite)".to_string(),
        }
        .into());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, CONFIG_TEMPLATE)?;
    output::section("Config Initialized");
    output::success("Created configuration file");
    output::field("Path", path.display());
    output::section("Next Steps");
    output::note(&format!("1. Edit {} to describe your services", path.display()));
    output::note(&format!("2. Run: runall config validate -c {}", path.display()));
    output::note(&format!("3. Run: runall run -c {}", path.display()));
    Ok(())
}

/// Execute `config show`.
pub fn execute_show(path: &Path) -> Result<()> {
    let config = Config::load(path)?;

    if output::is_json() {
        output::json_output(&serde_json::to_value(&config)?);
        return Ok(());
    }

    output::section("Effective Configuration");
    output::field("Path", path.display());
    output::field("Launch order", config.launch_order.join(" → "));

    let plan = config.launch_plan()?;
    for descriptor in plan.services() {
        output::section(descriptor.name().as_str());
        output::field("Command", descriptor.command_line());
        output::field("Directory", descriptor.working_directory().display());
        let health = descriptor.health_urls();
        output::field(
            "Health",
            if health.is_empty() {
                "none".to_string()
            } else {
                health.join(", ")
            },
        );
        output::field("Broadcast", descriptor.base_url().unwrap_or("not a target"));
        for (key, value) in descriptor
            .exports()
            .iter()
            .filter(|(key, _)| key.as_str() != BASE_URL_EXPORT)
        {
            output::field(key, value);
        }
        if let Some(timeout) = descriptor.launch_timeout() {
            output::field("Timeout", format!("{}s", timeout.as_secs()));
        }
    }

    if output::verbosity() > 0 {
        output::section("TOML");
        output::block(&config.to_toml()?);
    } else {
        let settings = config.supervisor_settings();
        output::section("Supervisor");
        output::field("Launch", format!("{:?}", settings.launch_timeout));
        output::field("Poll", format!("{:?}", settings.poll_interval));
        output::field("Grace", format!("{:?}", settings.grace_period));
        output::field(
            "Monitor",
            settings
                .monitor_interval
                .map_or_else(|| "disabled".to_string(), |every| format!("every {every:?}")),
        );
    }
    Ok(())
}

/// Execute `config validate`.
pub fn execute_validate(path: &Path) -> Result<()> {
    output::section("Config Validation");
    output::field("Path", path.display());
    let config = Config::load(path)?;
    output::success("Config file is valid");
    output::field("Services", config.launch_order.join(", "));
    output::field(
        "Next",
        output::highlight(format!("runall run -c {}", path.display())),
    );
    Ok(())
}
