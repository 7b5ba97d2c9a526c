//! Configuration for the taskdeck backend.
//!
//! Settings are layered: `taskdeck.toml` → environment → CLI flags. The file
//! lives at `<config dir>/taskdeck/taskdeck.toml` unless `--config` points
//! elsewhere; a missing file means defaults.
//!
//! # Configuration File Format
//!
//! ```toml
//! [runner]
//! python_path = "/Users/me/.taskdeck/venv/bin/python"
//! backend_root = "/Applications/Taskdeck.app/Contents/Resources/backend"
//! runner_script = "runners/claude_md_runner.py"
//! model = "sonnet"
//!
//! [manager]
//! poll_interval_secs = 60
//! api_base = "https://api.github.com"
//!
//! [server]
//! port = 3142
//!
//! [storage]
//! data_dir = "/Users/me/.local/share/taskdeck"
//!
//! [logging]
//! json = false
//! dir = "/Users/me/.local/state/taskdeck/logs"
//! ```
//!
//! Environment overrides: `TASKDECK_PYTHON`, `TASKDECK_BACKEND_ROOT`,
//! `TASKDECK_MODEL`, `TASKDECK_POLL_SECS`, `TASKDECK_PORT`, `TASKDECK_DATA_DIR`,
//! `GITHUB_TOKEN`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub const CONFIG_FILE_NAME: &str = "taskdeck.toml";
pub const DEFAULT_RUNNER_SCRIPT: &str = "runners/claude_md_runner.py";
pub const DEFAULT_PORT: u16 = 3142;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const MIN_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Runner (Python backend) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSection {
    /// Interpreter path. Empty until the Python environment has been set up.
    #[serde(default)]
    pub python_path: String,
    /// Backend source root; used as cwd and prepended to `PYTHONPATH`.
    #[serde(default)]
    pub backend_root: PathBuf,
    /// Runner script, relative to `backend_root` unless absolute.
    #[serde(default = "default_runner_script")]
    pub runner_script: PathBuf,
    /// Model passed as `--model` when set.
    #[serde(default)]
    pub model: Option<String>,
    /// Force shell execution on or off; platform default when unset.
    #[serde(default)]
    pub use_shell: Option<bool>,
}

fn default_runner_script() -> PathBuf {
    PathBuf::from(DEFAULT_RUNNER_SCRIPT)
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            python_path: String::new(),
            backend_root: PathBuf::new(),
            runner_script: default_runner_script(),
            model: None,
            use_shell: None,
        }
    }
}

impl RunnerSection {
    /// Absolute path of the runner script.
    pub fn script_path(&self) -> PathBuf {
        if self.runner_script.is_absolute() {
            self.runner_script.clone()
        } else {
            self.backend_root.join(&self.runner_script)
        }
    }

    pub fn use_shell(&self) -> bool {
        self.use_shell.unwrap_or(cfg!(windows))
    }
}

/// PR-status manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSection {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Token for the PR host API. Prefer `GITHUB_TOKEN` over writing it here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            api_base: default_api_base(),
            github_token: None,
        }
    }
}

impl ManagerSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub json: bool,
    /// Directory for a daily-rolling log file. Console only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Parsed `taskdeck.toml` with environment overrides applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskdeckConfig {
    #[serde(default)]
    pub runner: RunnerSection,
    #[serde(default)]
    pub manager: ManagerSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl TaskdeckConfig {
    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("taskdeck").join(CONFIG_FILE_NAME))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load from a TOML file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Load the file (explicit path, else the default location, else defaults)
    /// and apply process environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::load_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides from `lookup` (injected for tests).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(python) = non_empty("TASKDECK_PYTHON") {
            self.runner.python_path = python;
        }
        if let Some(root) = non_empty("TASKDECK_BACKEND_ROOT") {
            self.runner.backend_root = PathBuf::from(root);
        }
        if let Some(model) = non_empty("TASKDECK_MODEL") {
            self.runner.model = Some(model);
        }
        if let Some(secs) = non_empty("TASKDECK_POLL_SECS") {
            self.manager.poll_interval_secs = secs.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: "TASKDECK_POLL_SECS".to_string(),
                value: secs.clone(),
            })?;
        }
        if let Some(port) = non_empty("TASKDECK_PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: "TASKDECK_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(dir) = non_empty("TASKDECK_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(token) = non_empty("GITHUB_TOKEN") {
            self.manager.github_token = Some(token);
        }
        Ok(())
    }

    /// Data directory for persistent state (credential store).
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("taskdeck")))
            .unwrap_or_else(|| PathBuf::from(".taskdeck"))
    }

    /// Directory holding encrypted per-project credentials.
    pub fn secrets_dir(&self) -> PathBuf {
        self.data_dir().join("secrets")
    }

    /// Serialize for `config show` / `config init`. Tokens are never written out.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        let mut redacted = self.clone();
        redacted.manager.github_token = None;
        toml::to_string_pretty(&redacted)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.runner.python_path.trim().is_empty() {
            warnings.push(
                "runner.python_path is not set: CLAUDE.md generation will report \
                 'Python environment not ready'"
                    .to_string(),
            );
        }
        if self.runner.backend_root.as_os_str().is_empty() {
            warnings.push("runner.backend_root is not set".to_string());
        } else if !self.runner.backend_root.is_dir() {
            warnings.push(format!(
                "runner.backend_root '{}' is not a directory",
                self.runner.backend_root.display()
            ));
        } else if !self.runner.script_path().is_file() {
            warnings.push(format!(
                "runner script '{}' does not exist",
                self.runner.script_path().display()
            ));
        }
        if self.manager.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
            warnings.push(format!(
                "manager.poll_interval_secs = {} is below the minimum; {} seconds will be used",
                self.manager.poll_interval_secs, MIN_POLL_INTERVAL_SECS
            ));
        }
        if !self.manager.api_base.starts_with("http://") && !self.manager.api_base.starts_with("https://") {
            warnings.push(format!(
                "manager.api_base '{}' is not an http(s) URL",
                self.manager.api_base
            ));
        }
        if self.manager.github_token.is_none() {
            warnings.push(
                "No GitHub token configured: PR status requests are unauthenticated and rate limited"
                    .to_string(),
            );
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TaskdeckConfig::default();
        assert!(config.runner.python_path.is_empty());
        assert_eq!(config.runner.runner_script, PathBuf::from(DEFAULT_RUNNER_SCRIPT));
        assert_eq!(config.manager.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = TaskdeckConfig::parse(
            r#"
            [runner]
            python_path = "/venv/bin/python"
            backend_root = "/backend"

            [manager]
            poll_interval_secs = 30
            "#,
            Path::new("taskdeck.toml"),
        )
        .unwrap();
        assert_eq!(config.runner.python_path, "/venv/bin/python");
        assert_eq!(
            config.runner.script_path(),
            PathBuf::from("/backend").join(DEFAULT_RUNNER_SCRIPT)
        );
        assert_eq!(config.manager.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.manager.api_base, DEFAULT_API_BASE);
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn test_parse_error_carries_path() {
        let err = TaskdeckConfig::parse("[runner\n", Path::new("/etc/taskdeck.toml")).unwrap_err();
        assert!(err.to_string().contains("/etc/taskdeck.toml"));
    }

    #[test]
    fn test_absolute_runner_script_ignores_backend_root() {
        let mut config = TaskdeckConfig::default();
        config.runner.backend_root = PathBuf::from("/backend");
        config.runner.runner_script = PathBuf::from("/opt/runner.py");
        assert_eq!(config.runner.script_path(), PathBuf::from("/opt/runner.py"));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = TaskdeckConfig::default();
        config.runner.python_path = "/file/python".into();
        config
            .apply_env(env(&[
                ("TASKDECK_PYTHON", "/env/python"),
                ("TASKDECK_MODEL", "opus"),
                ("TASKDECK_POLL_SECS", "15"),
                ("TASKDECK_PORT", "4000"),
                ("GITHUB_TOKEN", "ghp_abc"),
            ]))
            .unwrap();
        assert_eq!(config.runner.python_path, "/env/python");
        assert_eq!(config.runner.model.as_deref(), Some("opus"));
        assert_eq!(config.manager.poll_interval_secs, 15);
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.manager.github_token.as_deref(), Some("ghp_abc"));
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = TaskdeckConfig::default();
        config.runner.python_path = "/file/python".into();
        config.apply_env(env(&[("TASKDECK_PYTHON", "  ")])).unwrap();
        assert_eq!(config.runner.python_path, "/file/python");
    }

    #[test]
    fn test_invalid_env_number_is_error() {
        let mut config = TaskdeckConfig::default();
        let err = config
            .apply_env(env(&[("TASKDECK_PORT", "not-a-port")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == "TASKDECK_PORT"));
    }

    #[test]
    fn test_poll_interval_has_floor() {
        let mut config = TaskdeckConfig::default();
        config.manager.poll_interval_secs = 1;
        assert_eq!(
            config.manager.poll_interval(),
            Duration::from_secs(MIN_POLL_INTERVAL_SECS)
        );
        assert!(config.validate().iter().any(|w| w.contains("poll_interval_secs")));
    }

    #[test]
    fn test_validate_flags_missing_python() {
        let warnings = TaskdeckConfig::default().validate();
        assert!(warnings.iter().any(|w| w.contains("python_path")));
        assert!(warnings.iter().any(|w| w.contains("backend_root")));
    }

    #[test]
    fn test_to_toml_redacts_token() {
        let mut config = TaskdeckConfig::default();
        config.manager.github_token = Some("ghp_secret".into());
        let toml = config.to_toml().unwrap();
        assert!(!toml.contains("ghp_secret"));
        let reparsed = TaskdeckConfig::parse(&toml, Path::new("x")).unwrap();
        assert_eq!(reparsed.server.port, DEFAULT_PORT);
    }

    #[test]
    fn test_load_explicit_missing_file_is_read_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = TaskdeckConfig::load_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
