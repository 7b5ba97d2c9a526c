use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::manager::PrStatus;
use crate::progress::ProgressEvent;

/// Request/response calls from the UI. Every call is answered with an
/// [`Envelope`](super::Envelope).
///
/// Wire form: `{"channel": "manager:add-task", "payload": {"taskId": ..., "prUrl": ...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all_fields = "camelCase")]
pub enum IpcRequest {
    #[serde(rename = "claude-md:check")]
    ClaudeMdCheck { project_path: String },
    #[serde(rename = "manager:start")]
    ManagerStart,
    #[serde(rename = "manager:stop")]
    ManagerStop,
    #[serde(rename = "manager:add-task")]
    ManagerAddTask { task_id: String, pr_url: String },
    #[serde(rename = "manager:remove-task")]
    ManagerRemoveTask { task_id: String },
    #[serde(rename = "manager:refresh-task")]
    ManagerRefreshTask { task_id: String },
    #[serde(rename = "manager:is-running")]
    ManagerIsRunning,
    #[serde(rename = "manager:list-tasks")]
    ManagerListTasks,
    #[serde(rename = "secrets:store")]
    SecretsStore { project_path: String, secret: String },
    #[serde(rename = "secrets:retrieve")]
    SecretsRetrieve { project_path: String },
}

impl IpcRequest {
    pub fn channel(&self) -> &'static str {
        match self {
            IpcRequest::ClaudeMdCheck { .. } => "claude-md:check",
            IpcRequest::ManagerStart => "manager:start",
            IpcRequest::ManagerStop => "manager:stop",
            IpcRequest::ManagerAddTask { .. } => "manager:add-task",
            IpcRequest::ManagerRemoveTask { .. } => "manager:remove-task",
            IpcRequest::ManagerRefreshTask { .. } => "manager:refresh-task",
            IpcRequest::ManagerIsRunning => "manager:is-running",
            IpcRequest::ManagerListTasks => "manager:list-tasks",
            IpcRequest::SecretsStore { .. } => "secrets:store",
            IpcRequest::SecretsRetrieve { .. } => "secrets:retrieve",
        }
    }
}

/// Fire-and-forget messages from the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all_fields = "camelCase")]
pub enum IpcNotification {
    /// Start generation; results arrive as `claude-md-*` events.
    #[serde(rename = "claude-md:generate")]
    ClaudeMdGenerate {
        project_path: String,
        #[serde(default)]
        model: Option<String>,
    },
    /// The user looked at a task; refresh its PR status now.
    #[serde(rename = "manager:task-activity")]
    ManagerTaskActivity { task_id: String },
}

impl IpcNotification {
    pub fn channel(&self) -> &'static str {
        match self {
            IpcNotification::ClaudeMdGenerate { .. } => "claude-md:generate",
            IpcNotification::ManagerTaskActivity { .. } => "manager:task-activity",
        }
    }
}

/// Events originating in the backend, forwarded to every live UI surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all_fields = "camelCase")]
pub enum BackendEvent {
    #[serde(rename = "claude-md-progress")]
    ClaudeMdProgress {
        project_path: String,
        progress: ProgressEvent,
    },
    #[serde(rename = "claude-md-complete")]
    ClaudeMdComplete {
        project_path: String,
        output_path: PathBuf,
    },
    #[serde(rename = "claude-md-error")]
    ClaudeMdError { project_path: String, error: String },
    #[serde(rename = "manager-started")]
    ManagerStarted,
    #[serde(rename = "manager-stopped")]
    ManagerStopped,
    #[serde(rename = "manager-error")]
    ManagerError {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
    },
    #[serde(rename = "pr-status-update")]
    PrStatusUpdate { task_id: String, pr_status: PrStatus },
}

impl BackendEvent {
    pub fn channel(&self) -> &'static str {
        match self {
            BackendEvent::ClaudeMdProgress { .. } => "claude-md-progress",
            BackendEvent::ClaudeMdComplete { .. } => "claude-md-complete",
            BackendEvent::ClaudeMdError { .. } => "claude-md-error",
            BackendEvent::ManagerStarted => "manager-started",
            BackendEvent::ManagerStopped => "manager-stopped",
            BackendEvent::ManagerError { .. } => "manager-error",
            BackendEvent::PrStatusUpdate { .. } => "pr-status-update",
        }
    }
}

/// Sending half of the backend event stream. Cheap to clone; emission never
/// blocks and never fails from the emitter's point of view.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<BackendEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<BackendEvent>) -> Self {
        Self { tx }
    }

    /// A sink together with the receiver the dispatcher drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: BackendEvent) {
        let channel = event.channel();
        if self.tx.send(event).is_err() {
            tracing::debug!(channel, "Event dropped, dispatcher is gone");
        }
    }
}
