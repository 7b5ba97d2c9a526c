//! CLAUDE.md generation for a project.
//!
//! Generation is delegated to the Python backend's runner script:
//!
//! ```text
//! <python> <backend_root>/<runner_script> --project <path> --progress [--model <name>]
//! ```
//!
//! run from the backend root with the backend root prepended to `PYTHONPATH`.
//! The runner reports progress with `CLAUDE_MD_PROGRESS:` lines and must leave a
//! `CLAUDE.md` in the project directory. Generation is create-only: an existing
//! file is never overwritten.
//!
//! Results are reported as backend events keyed by the originating project
//! path: zero or more `claude-md-progress`, then exactly one of
//! `claude-md-complete` or `claude-md-error`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::RunnerSection;
use crate::errors::RunnerError;
use crate::ipc::{BackendEvent, EventSink};
use crate::runner::{GenerationResult, RunnerEvent, RunnerExecutor, RunnerInvocation};

/// Name of the generated file inside the project directory.
pub const CLAUDE_MD_FILE: &str = "CLAUDE.md";

/// Result of an existence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaudeMdStatus {
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Validate a project path coming from the UI: non-blank and an existing directory.
pub fn validate_project_path(raw: &str) -> Result<PathBuf, RunnerError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RunnerError::InvalidProjectPath(
            "project path is empty".to_string(),
        ));
    }
    let path = PathBuf::from(trimmed);
    if !path.is_dir() {
        return Err(RunnerError::InvalidProjectPath(format!(
            "{} is not a directory",
            path.display()
        )));
    }
    Ok(path)
}

/// Check whether the project already has a CLAUDE.md. Read-only.
pub fn check_exists(project_path: &str) -> Result<ClaudeMdStatus, RunnerError> {
    let project = validate_project_path(project_path)?;
    let target = project.join(CLAUDE_MD_FILE);
    if target.is_file() {
        Ok(ClaudeMdStatus {
            exists: true,
            path: Some(target),
        })
    } else {
        Ok(ClaudeMdStatus {
            exists: false,
            path: None,
        })
    }
}

/// Builds and runs CLAUDE.md generation invocations.
#[derive(Clone)]
pub struct ClaudeMdGenerator {
    settings: RunnerSection,
    executor: RunnerExecutor,
}

impl ClaudeMdGenerator {
    pub fn new(settings: RunnerSection, executor: RunnerExecutor) -> Self {
        Self { settings, executor }
    }

    pub fn settings(&self) -> &RunnerSection {
        &self.settings
    }

    /// Build the runner invocation for `project`. An explicit `model` wins over
    /// the configured default.
    pub fn invocation(&self, project: &Path, model: Option<&str>) -> RunnerInvocation {
        let backend_root = &self.settings.backend_root;
        let mut invocation = RunnerInvocation::new(
            self.settings.python_path.clone(),
            self.settings.script_path(),
            project.join(CLAUDE_MD_FILE),
        )
        .args([
            "--project".to_string(),
            project.to_string_lossy().to_string(),
            "--progress".to_string(),
        ])
        .working_dir(backend_root.clone())
        .use_shell(self.settings.use_shell())
        .create_only(true);

        if let Some(model) = model
            .map(str::to_string)
            .or_else(|| self.settings.model.clone())
            .filter(|m| !m.trim().is_empty())
        {
            invocation = invocation.args(["--model".to_string(), model]);
        }

        if let Some(python_path) = python_path_with(backend_root, std::env::var_os("PYTHONPATH")) {
            invocation = invocation.env("PYTHONPATH", python_path);
        }
        invocation
    }

    /// Run generation for `project_path`, reporting every event to `sink`.
    pub async fn generate(
        &self,
        project_path: &str,
        model: Option<&str>,
        sink: &EventSink,
    ) -> GenerationResult {
        let key = project_path.to_string();
        let project = match validate_project_path(project_path) {
            Ok(project) => project,
            Err(e) => {
                let result = GenerationResult::failure(e.to_string());
                sink.emit(BackendEvent::ClaudeMdError {
                    project_path: key,
                    error: result.error().unwrap_or_default().to_string(),
                });
                return result;
            }
        };

        tracing::info!(project = %project.display(), "Starting CLAUDE.md generation");
        let invocation = self.invocation(&project, model);
        self.executor
            .run(&invocation, |event| match event {
                RunnerEvent::Progress(progress) => sink.emit(BackendEvent::ClaudeMdProgress {
                    project_path: key.clone(),
                    progress,
                }),
                RunnerEvent::Finished(GenerationResult::Success { output_path, .. }) => {
                    sink.emit(BackendEvent::ClaudeMdComplete {
                        project_path: key.clone(),
                        output_path,
                    })
                }
                RunnerEvent::Finished(GenerationResult::Failure { error, .. }) => {
                    sink.emit(BackendEvent::ClaudeMdError {
                        project_path: key.clone(),
                        error,
                    })
                }
            })
            .await
    }
}

/// `backend_root` prepended to an existing `PYTHONPATH`, joined with the
/// platform separator.
fn python_path_with(backend_root: &Path, existing: Option<std::ffi::OsString>) -> Option<String> {
    if backend_root.as_os_str().is_empty() {
        return None;
    }
    let mut entries = vec![backend_root.to_path_buf()];
    if let Some(existing) = existing {
        entries.extend(std::env::split_paths(&existing).filter(|p| p != backend_root));
    }
    std::env::join_paths(entries)
        .ok()
        .map(|joined| joined.to_string_lossy().to_string())
}
