use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::channels::{BackendEvent, EventSink, IpcNotification, IpcRequest};
use super::envelope::Envelope;
use super::surface::{UiSurface, forward_event};
use crate::errors::RelayError;
use crate::generate::{self, ClaudeMdGenerator};
use crate::manager::PrManager;
use crate::secrets::SecretStore;

const INBOUND_CAPACITY: usize = 64;

/// Backend services reachable through the relay.
#[derive(Clone)]
pub struct Services {
    pub generator: ClaudeMdGenerator,
    pub manager: PrManager,
    pub secrets: SecretStore,
}

impl Services {
    /// Answer one request. Every outcome, including failures, becomes an envelope.
    pub async fn handle(&self, request: IpcRequest) -> Envelope {
        match request {
            IpcRequest::ClaudeMdCheck { project_path } => {
                Envelope::from_serialize(generate::check_exists(&project_path))
            }
            IpcRequest::ManagerStart => {
                if self.manager.start() {
                    Envelope::ok_empty()
                } else {
                    Envelope::err("Failed to start PR manager")
                }
            }
            IpcRequest::ManagerStop => {
                self.manager.stop();
                Envelope::ok_empty()
            }
            IpcRequest::ManagerAddTask { task_id, pr_url } => {
                Envelope::from_serialize(self.manager.add_task(&task_id, &pr_url))
            }
            IpcRequest::ManagerRemoveTask { task_id } => {
                Envelope::ok(Value::Bool(self.manager.remove_task(&task_id)))
            }
            IpcRequest::ManagerRefreshTask { task_id } => {
                Envelope::from_serialize(self.manager.refresh_task(&task_id).await)
            }
            IpcRequest::ManagerIsRunning => Envelope::ok(Value::Bool(self.manager.is_running())),
            IpcRequest::ManagerListTasks => {
                Envelope::from_serialize(Ok::<_, String>(self.manager.list_tasks()))
            }
            IpcRequest::SecretsStore {
                project_path,
                secret,
            } => {
                let store = self.secrets.clone();
                let result =
                    tokio::task::spawn_blocking(move || store.store(&project_path, &secret)).await;
                match result {
                    Ok(stored) => Envelope::from_serialize(stored),
                    Err(e) => Envelope::err(format!("Credential store task failed: {}", e)),
                }
            }
            IpcRequest::SecretsRetrieve { project_path } => {
                let store = self.secrets.clone();
                let result =
                    tokio::task::spawn_blocking(move || store.retrieve(&project_path)).await;
                match result {
                    Ok(secret) => Envelope::from_serialize(secret),
                    Err(e) => Envelope::err(format!("Credential store task failed: {}", e)),
                }
            }
        }
    }

    /// Act on one notification. Long-running work continues in the background.
    pub fn notify(&self, notification: IpcNotification, sink: &EventSink) {
        match notification {
            IpcNotification::ClaudeMdGenerate {
                project_path,
                model,
            } => {
                let generator = self.generator.clone();
                let sink = sink.clone();
                tokio::spawn(async move {
                    generator
                        .generate(&project_path, model.as_deref(), &sink)
                        .await;
                });
            }
            IpcNotification::ManagerTaskActivity { task_id } => {
                self.manager.notify_activity(&task_id);
            }
        }
    }
}

/// Messages accepted by the dispatcher loop.
#[derive(Debug)]
pub enum Inbound {
    Invoke {
        request: IpcRequest,
        reply: oneshot::Sender<Envelope>,
    },
    Notify(IpcNotification),
}

/// Cloneable sending half of the relay.
#[derive(Clone)]
pub struct RelayClient {
    tx: mpsc::Sender<Inbound>,
}

impl RelayClient {
    pub async fn invoke(&self, request: IpcRequest) -> Result<Envelope, RelayError> {
        let channel = request.channel();
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Inbound::Invoke { request, reply })
            .await
            .map_err(|_| RelayError::DispatcherClosed)?;
        rx.await.map_err(|_| RelayError::ReplyDropped {
            channel: channel.to_string(),
        })
    }

    /// Decode an untyped request and invoke it. Never fails: malformed input
    /// and relay failures both come back as failure envelopes.
    pub async fn invoke_json(&self, raw: Value) -> Envelope {
        let request = match serde_json::from_value::<IpcRequest>(raw) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected malformed request");
                return Envelope::err(RelayError::InvalidPayload(e.to_string()).to_string());
            }
        };
        self.invoke(request).await.unwrap_or_else(|e| Envelope::err(e.to_string()))
    }

    pub async fn notify(&self, notification: IpcNotification) -> Result<(), RelayError> {
        self.tx
            .send(Inbound::Notify(notification))
            .await
            .map_err(|_| RelayError::DispatcherClosed)
    }

    pub async fn notify_json(&self, raw: Value) -> Result<(), RelayError> {
        let notification = serde_json::from_value::<IpcNotification>(raw)
            .map_err(|e| RelayError::InvalidPayload(e.to_string()))?;
        self.notify(notification).await
    }
}

/// The single loop that owns inbound UI traffic and outbound backend events.
///
/// Events are forwarded to every live surface in emission order. Handlers run
/// in spawned tasks so a slow request never stalls event delivery.
pub struct Dispatcher {
    services: Arc<Services>,
    sink: EventSink,
    inbound_rx: mpsc::Receiver<Inbound>,
    events_rx: mpsc::UnboundedReceiver<BackendEvent>,
    surfaces: Vec<Arc<dyn UiSurface>>,
}

impl Dispatcher {
    /// `sink` and `events_rx` must be the two halves of one event channel,
    /// the same one the services emit into.
    pub fn new(
        services: Services,
        sink: EventSink,
        events_rx: mpsc::UnboundedReceiver<BackendEvent>,
    ) -> (Self, RelayClient) {
        let (tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let dispatcher = Self {
            services: Arc::new(services),
            sink,
            inbound_rx,
            events_rx,
            surfaces: Vec::new(),
        };
        (dispatcher, RelayClient { tx })
    }

    pub fn add_surface(&mut self, surface: Arc<dyn UiSurface>) {
        self.surfaces.push(surface);
    }

    /// Run until `shutdown` fires or every [`RelayClient`] is dropped.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::debug!(surfaces = self.surfaces.len(), "Relay dispatcher started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(event) = self.events_rx.recv() => self.forward(&event),
                inbound = self.inbound_rx.recv() => match inbound {
                    Some(message) => self.dispatch(message),
                    None => break,
                },
            }
        }
        // Deliver what was already emitted before going away.
        while let Ok(event) = self.events_rx.try_recv() {
            self.forward(&event);
        }
        tracing::debug!("Relay dispatcher stopped");
    }

    fn forward(&mut self, event: &BackendEvent) {
        tracing::trace!(channel = event.channel(), "Forwarding event");
        self.surfaces.retain(|surface| forward_event(surface.as_ref(), event));
    }

    fn dispatch(&self, message: Inbound) {
        match message {
            Inbound::Invoke { request, reply } => {
                let services = self.services.clone();
                tokio::spawn(async move {
                    let channel = request.channel();
                    let envelope = services.handle(request).await;
                    if !envelope.success {
                        tracing::debug!(channel, error = ?envelope.error, "Request failed");
                    }
                    if reply.send(envelope).is_err() {
                        tracing::debug!(channel, "Caller went away before the reply");
                    }
                });
            }
            Inbound::Notify(notification) => {
                tracing::debug!(channel = notification.channel(), "Notification");
                self.services.notify(notification, &self.sink);
            }
        }
    }
}
