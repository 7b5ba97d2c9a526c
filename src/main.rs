use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use taskdeck::config::TaskdeckConfig;
use taskdeck::logging::{self, LogOptions};

mod cmd;

#[derive(Parser)]
#[command(name = "taskdeck")]
#[command(
    version,
    about = "Task board backend: PR status monitoring and CLAUDE.md generation"
)]
pub struct Cli {
    /// Debug logging for taskdeck (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to taskdeck.toml. Defaults to the user config directory.
    #[arg(long, global = true, env = "TASKDECK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the relay server for the desktop UI
    Serve {
        /// Port to serve on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable dev mode (CORS permissive for a local Vite dev server)
        #[arg(long)]
        dev: bool,

        /// Start PR monitoring immediately
        #[arg(long)]
        start_manager: bool,
    },
    /// Check whether a project already has a CLAUDE.md
    Check {
        project: PathBuf,
    },
    /// Generate CLAUDE.md for a project with the Python runner
    Generate {
        project: PathBuf,

        /// Model passed to the runner (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// Python interpreter (overrides config)
        #[arg(long)]
        python: Option<String>,

        /// Backend source root containing the runner script (overrides config)
        #[arg(long)]
        backend_root: Option<PathBuf>,
    },
    /// Fetch the current status of a pull request
    PrStatus {
        url: String,

        /// Print the raw status snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default taskdeck.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is the normal case.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config_path = match cli.config.clone() {
        Some(path) => Some(path),
        None => TaskdeckConfig::default_path(),
    };

    // `config init` must work even when the existing file is broken.
    if let Commands::Config {
        command: Some(ConfigCommands::Init),
    } = &cli.command
    {
        return cmd::cmd_config_init(config_path.as_deref());
    }

    let config = TaskdeckConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = logging::init(&LogOptions::from_config(
        &config.logging,
        cli.verbose,
        cli.log_json,
    ))?;

    match &cli.command {
        Commands::Serve {
            port,
            dev,
            start_manager,
        } => cmd::cmd_serve(&config, *port, *dev, *start_manager).await?,
        Commands::Check { project } => cmd::cmd_check(project)?,
        Commands::Generate {
            project,
            model,
            python,
            backend_root,
        } => {
            let mut config = config.clone();
            if let Some(python) = python {
                config.runner.python_path = python.clone();
            }
            if let Some(root) = backend_root {
                config.runner.backend_root = root.clone();
            }
            cmd::cmd_generate(&config, project, model.as_deref()).await?
        }
        Commands::PrStatus { url, json } => cmd::cmd_pr_status(&config, url, *json).await?,
        Commands::Config { command } => {
            cmd::cmd_config(&config, config_path.as_deref(), command.clone())?
        }
    }

    Ok(())
}
