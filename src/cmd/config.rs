//! Configuration view and validation commands: `taskdeck config`.

use std::path::Path;

use anyhow::{Context, Result};

use super::super::ConfigCommands;
use taskdeck::config::TaskdeckConfig;

pub fn cmd_config(
    config: &TaskdeckConfig,
    config_path: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Taskdeck Configuration");
            println!("======================");
            println!();
            match config_path {
                Some(path) if path.exists() => println!("Config file: {}", path.display()),
                Some(path) => println!("No config file at {} (using defaults)", path.display()),
                None => println!("No config directory available (using defaults)"),
            }
            println!();
            print!("{}", config.to_toml().context("Failed to render configuration")?);
            println!();
            if config.manager.github_token.is_some() {
                println!("GitHub token: set (hidden)");
            }
            println!("Data directory: {}", config.data_dir().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => cmd_config_init(config_path)?,
    }

    Ok(())
}

/// Write a default `taskdeck.toml` unless one exists.
pub fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = config_path.context("No config directory available; pass --config <path>")?;
    if path.exists() {
        println!("taskdeck.toml already exists at {}", path.display());
        println!("Delete it first if you want to recreate it.");
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = TaskdeckConfig::default()
        .to_toml()
        .context("Failed to render default configuration")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Created taskdeck.toml at {}", path.display());
    println!();
    println!("You can now customize:");
    println!("  - [runner] python_path, backend_root, model");
    println!("  - [manager] poll_interval_secs, api_base");
    println!("  - [server] port");
    println!();
    Ok(())
}
