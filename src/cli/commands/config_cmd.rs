//! Configuration commands.

use console::style;

use crate::config::{Config, Settings};

/// Print the effective settings as JSON.
pub fn cmd_config_show(settings: &Settings, config: &Config) -> anyhow::Result<()> {
    match config.source_path {
        Some(ref path) => eprintln!("{} Config file: {}", style("→").dim(), path.display()),
        None => eprintln!("{} No config file found, using defaults", style("!").yellow()),
    }
    eprintln!(
        "{} Service key: {}",
        style("→").dim(),
        if settings.service_key.is_some() {
            "set"
        } else {
            "not set"
        }
    );

    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
