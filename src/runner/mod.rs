//! Subprocess lifecycle wrapper for external runner processes.
//!
//! A [`RunnerInvocation`] describes one attempt: interpreter, runner script,
//! arguments, working directory, environment, and the artifact the runner is
//! expected to produce. [`RunnerExecutor::run`] owns that attempt end-to-end:
//!
//! 1. Preconditions are checked synchronously; a failure short-circuits with a
//!    terminal result and nothing is spawned.
//! 2. The process is spawned through a [`ProcessSpawner`]; stdout is fed to the
//!    progress parser and progress events are forwarded as they are decoded.
//! 3. Exit status is mapped to exactly one [`GenerationResult`], which is always
//!    the last event of the invocation.
//!
//! There are no retries. Retrying is the caller's decision.

mod executor;
mod invocation;
mod spawner;

pub use executor::{
    MAX_ERROR_CHARS, RunnerEvent, RunnerExecutor, check_preconditions, exit_result,
    truncate_message,
};
pub use invocation::{GenerationResult, RunnerInvocation, cmd_quote, posix_quote, shell_quote};
pub use spawner::{ProcessSpawner, TokioSpawner};
