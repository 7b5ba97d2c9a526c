use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use uuid::Uuid;

use super::invocation::{GenerationResult, RunnerInvocation};
use super::spawner::{ProcessSpawner, TokioSpawner};
use crate::errors::RunnerError;
use crate::progress::{ParsedLine, ProgressEvent, ProgressLineParser};

/// Upper bound on the length of a failure message, in characters.
pub const MAX_ERROR_CHARS: usize = 500;

const READ_CHUNK: usize = 8 * 1024;

/// Events produced by one invocation, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    Progress(ProgressEvent),
    /// Always the last event of an invocation.
    Finished(GenerationResult),
}

/// Runs [`RunnerInvocation`]s to completion.
#[derive(Clone)]
pub struct RunnerExecutor {
    spawner: Arc<dyn ProcessSpawner>,
}

impl Default for RunnerExecutor {
    fn default() -> Self {
        Self::new(Arc::new(TokioSpawner))
    }
}

impl RunnerExecutor {
    pub fn new(spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self { spawner }
    }

    /// Run one invocation. `emit` receives every progress event as soon as it is
    /// decoded, then exactly one `Finished`. The same result is also returned.
    pub async fn run<F>(&self, invocation: &RunnerInvocation, mut emit: F) -> GenerationResult
    where
        F: FnMut(RunnerEvent) + Send,
    {
        let invocation_id = Uuid::new_v4();
        let result = self.execute(invocation_id, invocation, &mut emit).await;
        match &result {
            GenerationResult::Success { output_path, .. } => tracing::info!(
                invocation = %invocation_id,
                output = %output_path.display(),
                "Runner succeeded"
            ),
            GenerationResult::Failure { error, .. } => tracing::warn!(
                invocation = %invocation_id,
                error = %error,
                "Runner failed"
            ),
        }
        emit(RunnerEvent::Finished(result.clone()));
        result
    }

    async fn execute<F>(
        &self,
        invocation_id: Uuid,
        invocation: &RunnerInvocation,
        emit: &mut F,
    ) -> GenerationResult
    where
        F: FnMut(RunnerEvent) + Send,
    {
        if let Err(e) = check_preconditions(invocation) {
            return GenerationResult::failure(e.to_string());
        }

        let mut child = match self.spawner.spawn(invocation) {
            Ok(child) => child,
            Err(e) => return GenerationResult::failure(RunnerError::SpawnFailed(e).to_string()),
        };
        tracing::info!(
            invocation = %invocation_id,
            pid = ?child.id(),
            script = %invocation.script.display(),
            "Runner started"
        );

        // Drain stderr concurrently so a chatty runner cannot block on a full pipe.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut bytes = Vec::new();
                if let Err(e) = stderr.read_to_end(&mut bytes).await {
                    tracing::warn!(error = %e, "Failed to read runner stderr");
                }
                String::from_utf8_lossy(&bytes).to_string()
            })
        });

        let mut stdout_bytes = Vec::new();
        if let Some(mut stdout) = child.stdout.take() {
            let mut parser = ProgressLineParser::new();
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = &buf[..n];
                        stdout_bytes.extend_from_slice(chunk);
                        for line in parser.push(chunk) {
                            forward_line(invocation_id, line, emit);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(invocation = %invocation_id, error = %e, "Failed to read runner stdout");
                        break;
                    }
                }
            }
            for line in parser.finish() {
                forward_line(invocation_id, line, emit);
            }
        }

        let stderr_text = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        let stdout_text = String::from_utf8_lossy(&stdout_bytes);

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => {
                return GenerationResult::failure(truncate_message(
                    &format!("Failed to wait for runner: {}", e),
                    MAX_ERROR_CHARS,
                ));
            }
        };

        exit_result(status.code(), &stdout_text, &stderr_text, invocation)
    }
}

fn forward_line<F>(invocation_id: Uuid, line: ParsedLine, emit: &mut F)
where
    F: FnMut(RunnerEvent) + Send,
{
    match line {
        ParsedLine::Progress(event) => {
            tracing::debug!(
                invocation = %invocation_id,
                phase = %event.phase,
                percent = event.percent,
                "Runner progress"
            );
            emit(RunnerEvent::Progress(event));
        }
        ParsedLine::Diagnostic(text) => {
            if !text.trim().is_empty() {
                tracing::debug!(invocation = %invocation_id, line = %text, "Runner output");
            }
        }
    }
}

/// Validate everything that can be checked without spawning.
///
/// Order matters: interpreter, then runner script, then create-only artifact.
pub fn check_preconditions(invocation: &RunnerInvocation) -> Result<(), RunnerError> {
    if invocation.program.trim().is_empty() {
        return Err(RunnerError::InterpreterNotConfigured);
    }
    if !invocation.script.is_file() {
        return Err(RunnerError::ScriptNotFound(invocation.script.clone()));
    }
    if invocation.create_only && invocation.artifact.exists() {
        return Err(RunnerError::ArtifactExists {
            name: invocation.artifact_name(),
            path: invocation.artifact.clone(),
        });
    }
    Ok(())
}

/// Map a finished process to its terminal result.
///
/// A zero exit code is necessary but not sufficient: the artifact must exist.
pub fn exit_result(
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
    invocation: &RunnerInvocation,
) -> GenerationResult {
    if code == Some(0) {
        return if artifact_exists(&invocation.artifact) {
            GenerationResult::success(invocation.artifact.clone())
        } else {
            GenerationResult::failure(format!(
                "Runner exited successfully but {} was not created",
                invocation.artifact_name()
            ))
        };
    }

    let message = [stderr.trim(), stdout.trim()]
        .into_iter()
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| match code {
            Some(code) => format!("Runner exited with code {}", code),
            None => "Runner was terminated by a signal".to_string(),
        });
    GenerationResult::failure(truncate_message(&message, MAX_ERROR_CHARS))
}

fn artifact_exists(path: &Path) -> bool {
    path.is_file()
}

/// Truncate to at most `max_chars` characters, never splitting a character.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => message[..byte_idx].to_string(),
        None => message.to_string(),
    }
}
