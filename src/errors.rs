//! Typed error hierarchy for the taskdeck backend.
//!
//! One enum per subsystem:
//! - `RunnerError`: runner precondition and process failures
//! - `ManagerError`: PR-status manager operations
//! - `RelayError`: IPC relay plumbing (closed channels, bad payloads)
//! - `SecretsError`: credential store I/O and crypto failures
//! - `ConfigError`: configuration loading
//!
//! Every variant renders to a short, user-facing message; these strings are what
//! ends up in failure envelopes and `*-error` events.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised before or while running an external runner process.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Python environment not ready")]
    InterpreterNotConfigured,

    #[error("Runner script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("{name} already exists at {}", .path.display())]
    ArtifactExists { name: String, path: PathBuf },

    #[error("Invalid project path: {0}")]
    InvalidProjectPath(String),

    #[error("Failed to start runner: {0}")]
    SpawnFailed(#[source] std::io::Error),
}

/// Errors from the PR-status manager facade.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Task id must not be empty")]
    EmptyTaskId,

    #[error("Invalid pull request URL: {0}")]
    InvalidPrUrl(String),

    #[error("Task {0} is not monitored")]
    TaskNotMonitored(String),

    #[error("Failed to fetch PR status for task {task_id}: {message}")]
    Fetch { task_id: String, message: String },

    #[error("No async runtime available to run the manager")]
    NoRuntime,

    #[error("A manager is already registered")]
    AlreadyRegistered,

    #[error("No manager is registered")]
    NotRegistered,
}

/// Errors from the IPC relay itself.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Relay dispatcher is not running")]
    DispatcherClosed,

    #[error("Relay dropped the reply for {channel}")]
    ReplyDropped { channel: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Errors from the encrypted credential store.
#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("Project path must not be empty")]
    EmptyProjectPath,

    #[error("Failed to access credential store at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential store key is corrupt")]
    CorruptKey,

    #[error("Stored credential is corrupt: {0}")]
    CorruptEntry(String),

    #[error("Failed to encrypt credential")]
    Encrypt,

    #[error("Failed to decrypt credential")]
    Decrypt,
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}
