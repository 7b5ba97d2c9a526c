//! Typed, capability-scoped client API for in-process UI code.
//!
//! Calls go through the relay like any other UI traffic; events arrive through
//! a [`ChannelSurface`] registered with the dispatcher. Capabilities are grouped
//! the way the UI uses them: [`PreloadApi::claude_md`], [`PreloadApi::manager`],
//! [`PreloadApi::secrets`].

use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::errors::RelayError;
use crate::generate::ClaudeMdStatus;
use crate::ipc::{
    BackendEvent, ChannelSurface, Dispatcher, Envelope, IpcNotification, IpcRequest, RelayClient,
};
use crate::manager::{AddOutcome, MonitoredTask, PrStatus, RefreshOutcome};
use crate::progress::ProgressEvent;

const SURFACE_CAPACITY: usize = 256;

/// Handle for an event subscription. Delivery stops when it is dropped.
#[must_use = "dropping a Subscription ends it immediately"]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {}

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Clone)]
pub struct PreloadApi {
    client: RelayClient,
    surface: Arc<ChannelSurface>,
}

impl PreloadApi {
    pub fn new(client: RelayClient, surface: Arc<ChannelSurface>) -> Self {
        Self { client, surface }
    }

    /// Create a surface, register it with `dispatcher`, and wrap `client`.
    /// Must be called before the dispatcher starts running.
    pub fn attach(dispatcher: &mut Dispatcher, client: RelayClient) -> Self {
        let surface = Arc::new(ChannelSurface::new("preload", SURFACE_CAPACITY));
        dispatcher.add_surface(surface.clone());
        Self::new(client, surface)
    }

    pub fn claude_md(&self) -> ClaudeMdApi<'_> {
        ClaudeMdApi { api: self }
    }

    pub fn manager(&self) -> ManagerApi<'_> {
        ManagerApi { api: self }
    }

    pub fn secrets(&self) -> SecretsApi<'_> {
        SecretsApi { api: self }
    }

    /// Mark the surface destroyed; later events are not delivered.
    pub fn close(&self) {
        self.surface.destroy();
    }

    async fn invoke<T: DeserializeOwned>(&self, request: IpcRequest) -> Envelope<T> {
        typed(self.client.invoke(request).await)
    }

    fn subscribe<T, S, C>(&self, select: S, mut callback: C) -> Subscription
    where
        T: Send + 'static,
        S: Fn(BackendEvent) -> Option<T> + Send + 'static,
        C: FnMut(T) + Send + 'static,
    {
        let mut rx = self.surface.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(value) = select(event) {
                            callback(value);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Subscriber lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Subscription { handle }
    }
}

fn typed<T: DeserializeOwned>(result: Result<Envelope, RelayError>) -> Envelope<T> {
    match result {
        Err(e) => Envelope::err(e.to_string()),
        Ok(envelope) => match envelope.decode::<T>() {
            Ok(Some(data)) => Envelope::ok(data),
            Ok(None) => Envelope::ok_empty(),
            Err(e) => Envelope::err(e),
        },
    }
}

pub struct ClaudeMdApi<'a> {
    api: &'a PreloadApi,
}

impl ClaudeMdApi<'_> {
    pub async fn check(&self, project_path: &str) -> Envelope<ClaudeMdStatus> {
        self.api
            .invoke(IpcRequest::ClaudeMdCheck {
                project_path: project_path.to_string(),
            })
            .await
    }

    /// Start generation. Results arrive through the `on_*` subscriptions.
    pub async fn generate(&self, project_path: &str, model: Option<&str>) -> Result<(), RelayError> {
        self.api
            .client
            .notify(IpcNotification::ClaudeMdGenerate {
                project_path: project_path.to_string(),
                model: model.map(str::to_string),
            })
            .await
    }

    pub fn on_progress<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(String, ProgressEvent) + Send + 'static,
    {
        self.api.subscribe(
            |event| match event {
                BackendEvent::ClaudeMdProgress {
                    project_path,
                    progress,
                } => Some((project_path, progress)),
                _ => None,
            },
            move |(path, progress)| callback(path, progress),
        )
    }

    pub fn on_complete<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(String, PathBuf) + Send + 'static,
    {
        self.api.subscribe(
            |event| match event {
                BackendEvent::ClaudeMdComplete {
                    project_path,
                    output_path,
                } => Some((project_path, output_path)),
                _ => None,
            },
            move |(path, output)| callback(path, output),
        )
    }

    pub fn on_error<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(String, String) + Send + 'static,
    {
        self.api.subscribe(
            |event| match event {
                BackendEvent::ClaudeMdError {
                    project_path,
                    error,
                } => Some((project_path, error)),
                _ => None,
            },
            move |(path, error)| callback(path, error),
        )
    }
}

pub struct ManagerApi<'a> {
    api: &'a PreloadApi,
}

impl ManagerApi<'_> {
    pub async fn start(&self) -> Envelope<()> {
        self.api.invoke(IpcRequest::ManagerStart).await
    }

    pub async fn stop(&self) -> Envelope<()> {
        self.api.invoke(IpcRequest::ManagerStop).await
    }

    pub async fn is_running(&self) -> Envelope<bool> {
        self.api.invoke(IpcRequest::ManagerIsRunning).await
    }

    pub async fn add_task(&self, task_id: &str, pr_url: &str) -> Envelope<AddOutcome> {
        self.api
            .invoke(IpcRequest::ManagerAddTask {
                task_id: task_id.to_string(),
                pr_url: pr_url.to_string(),
            })
            .await
    }

    pub async fn remove_task(&self, task_id: &str) -> Envelope<bool> {
        self.api
            .invoke(IpcRequest::ManagerRemoveTask {
                task_id: task_id.to_string(),
            })
            .await
    }

    pub async fn refresh_task(&self, task_id: &str) -> Envelope<RefreshOutcome> {
        self.api
            .invoke(IpcRequest::ManagerRefreshTask {
                task_id: task_id.to_string(),
            })
            .await
    }

    pub async fn list_tasks(&self) -> Envelope<Vec<MonitoredTask>> {
        self.api.invoke(IpcRequest::ManagerListTasks).await
    }

    /// Report that the user is looking at `task_id`.
    pub async fn task_activity(&self, task_id: &str) -> Result<(), RelayError> {
        self.api
            .client
            .notify(IpcNotification::ManagerTaskActivity {
                task_id: task_id.to_string(),
            })
            .await
    }

    pub fn on_pr_status_update<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(String, PrStatus) + Send + 'static,
    {
        self.api.subscribe(
            |event| match event {
                BackendEvent::PrStatusUpdate { task_id, pr_status } => Some((task_id, pr_status)),
                _ => None,
            },
            move |(task_id, status)| callback(task_id, status),
        )
    }

    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(String) + Send + 'static,
    {
        self.api.subscribe(
            |event| match event {
                BackendEvent::ManagerError { error, .. } => Some(error),
                _ => None,
            },
            callback,
        )
    }

    pub fn on_started<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut() + Send + 'static,
    {
        self.api.subscribe(
            |event| matches!(event, BackendEvent::ManagerStarted).then_some(()),
            move |()| callback(),
        )
    }

    pub fn on_stopped<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut() + Send + 'static,
    {
        self.api.subscribe(
            |event| matches!(event, BackendEvent::ManagerStopped).then_some(()),
            move |()| callback(),
        )
    }
}

pub struct SecretsApi<'a> {
    api: &'a PreloadApi,
}

impl SecretsApi<'_> {
    pub async fn store(&self, project_path: &str, secret: &str) -> Envelope<bool> {
        self.api
            .invoke(IpcRequest::SecretsStore {
                project_path: project_path.to_string(),
                secret: secret.to_string(),
            })
            .await
    }

    pub async fn retrieve(&self, project_path: &str) -> Envelope<Option<String>> {
        self.api
            .invoke(IpcRequest::SecretsRetrieve {
                project_path: project_path.to_string(),
            })
            .await
    }
}
