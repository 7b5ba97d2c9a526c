//! Tracing subscriber setup for the binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSection;

const LOG_FILE_PREFIX: &str = "taskdeck.log";

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Force debug output for this crate, ignoring `RUST_LOG`.
    pub verbose: bool,
    /// Emit JSON lines on stderr instead of human-readable text.
    pub json: bool,
    /// Also write a daily-rolling plain-text log here.
    pub dir: Option<PathBuf>,
}

impl LogOptions {
    pub fn from_config(section: &LoggingSection, verbose: bool, json: bool) -> Self {
        Self {
            verbose,
            json: json || section.json,
            dir: section.dir.clone(),
        }
    }
}

/// Keeps the file writer flushing. Hold it until the process exits.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "taskdeck=debug,tower_http=debug"
    } else {
        "taskdeck=info"
    }
}

fn build_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new(default_directive(true));
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(false)))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(options: &LogOptions) -> Result<LogGuard> {
    let (json_layer, text_layer) = if options.json {
        (
            Some(fmt::layer().json().with_writer(std::io::stderr)),
            None,
        )
    } else {
        (
            None,
            Some(fmt::layer().with_target(false).with_writer(std::io::stderr)),
        )
    };

    let (file_layer, guard) = match &options.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(build_filter(options.verbose))
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "taskdeck=info");
        assert!(default_directive(true).starts_with("taskdeck=debug"));
    }

    #[test]
    fn test_options_merge_config_and_flags() {
        let section = LoggingSection {
            json: true,
            dir: Some(PathBuf::from("/var/log/taskdeck")),
        };
        let options = LogOptions::from_config(&section, true, false);
        assert!(options.verbose);
        assert!(options.json);
        assert_eq!(options.dir, Some(PathBuf::from("/var/log/taskdeck")));

        let options = LogOptions::from_config(&LoggingSection::default(), false, true);
        assert!(options.json);
        assert!(options.dir.is_none());
    }
}
