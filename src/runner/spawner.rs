use std::process::Stdio;

use tokio::process::{Child, Command};

use super::invocation::RunnerInvocation;

/// Abstraction over process creation for testability.
/// Real implementation: `TokioSpawner`. Tests wrap it to count or refuse spawns.
pub trait ProcessSpawner: Send + Sync {
    /// Start the process with piped stdout/stderr.
    fn spawn(&self, invocation: &RunnerInvocation) -> std::io::Result<Child>;
}

/// Spawns runners as tokio child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawner;

impl TokioSpawner {
    /// Build the command without spawning it.
    pub fn command(invocation: &RunnerInvocation) -> Command {
        let mut cmd = if invocation.use_shell {
            let line = invocation.shell_command_line();
            if cfg!(windows) {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C").arg(line);
                cmd
            } else {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(line);
                cmd
            }
        } else {
            let mut cmd = Command::new(&invocation.program);
            cmd.args(invocation.argv());
            cmd
        };

        if !invocation.working_dir.as_os_str().is_empty() {
            cmd.current_dir(&invocation.working_dir);
        }
        cmd.envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl ProcessSpawner for TokioSpawner {
    fn spawn(&self, invocation: &RunnerInvocation) -> std::io::Result<Child> {
        tracing::debug!(
            program = %invocation.program,
            args = ?invocation.argv(),
            cwd = %invocation.working_dir.display(),
            shell = invocation.use_shell,
            "Spawning runner"
        );
        Self::command(invocation).spawn()
    }
}
