//! HTTP/WebSocket transport for the relay.
//!
//! - `POST /api/invoke`: request/response channels, answered with an envelope
//! - `POST /api/notify`: fire-and-forget channels
//! - `GET /ws`: backend event stream
//! - `GET /health`

pub mod api;
pub mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::config::{DEFAULT_PORT, TaskdeckConfig};
use crate::generate::ClaudeMdGenerator;
use crate::ipc::{BroadcastSurface, Dispatcher, EventSink, Services};
use crate::manager::{GitHubPrFetcher, PrManager, registry};
use crate::runner::RunnerExecutor;
use crate::secrets::SecretStore;
use api::AppState;

const EVENT_BUFFER: usize = 256;

/// Configuration for the relay server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub dev_mode: bool,
    /// Start PR monitoring immediately instead of waiting for `manager:start`.
    pub start_manager: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            dev_mode: false,
            start_manager: false,
        }
    }
}

impl ServerConfig {
    pub fn from_config(config: &TaskdeckConfig) -> Self {
        Self {
            port: config.server.port,
            dev_mode: config.server.dev_mode,
            start_manager: false,
        }
    }
}

/// Construct the backend services from configuration. Events go to `sink`.
pub fn build_services(config: &TaskdeckConfig, sink: EventSink) -> Services {
    let fetcher = GitHubPrFetcher::new(
        config.manager.api_base.clone(),
        config.manager.github_token.clone(),
    );
    Services {
        generator: ClaudeMdGenerator::new(config.runner.clone(), RunnerExecutor::default()),
        manager: PrManager::new(Arc::new(fetcher), config.manager.poll_interval(), sink),
        secrets: SecretStore::new(config.secrets_dir()),
    }
}

/// Build the router with API and WebSocket routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let events = state.events.clone();

    api::api_router()
        .route(
            "/ws",
            get(move |ws_upgrade| ws::ws_handler_with_sender(ws_upgrade, events)),
        )
        .with_state(state)
}

/// Run the relay server until Ctrl-C.
pub async fn start_server(server: ServerConfig, config: &TaskdeckConfig) -> Result<()> {
    let (sink, events_rx) = EventSink::channel();
    let services = build_services(config, sink.clone());
    registry::init(services.manager.clone()).context("Failed to register PR manager")?;

    let (mut dispatcher, relay) = Dispatcher::new(services, sink, events_rx);
    let surface = Arc::new(BroadcastSurface::new("websocket", EVENT_BUFFER));
    dispatcher.add_surface(surface.clone());

    let shutdown = CancellationToken::new();
    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown.clone()));

    if server.start_manager {
        match registry::start() {
            Ok(true) => {}
            Ok(false) => tracing::warn!("PR manager did not start"),
            Err(e) => tracing::warn!(error = %e, "PR manager did not start"),
        }
    }

    let state = Arc::new(AppState {
        relay,
        events: surface.sender(),
    });
    let mut app = build_router(state);
    if server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if server.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            registry::teardown();
            shutdown.cancel();
            return Err(e).with_context(|| format!("Failed to bind to {}", addr));
        }
    };

    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, dev_mode = server.dev_mode, "Taskdeck relay listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    registry::teardown();
    surface.destroy();
    shutdown.cancel();
    if let Err(e) = dispatcher_task.await {
        tracing::warn!(error = %e, "Dispatcher task ended abnormally");
    }
    tracing::info!("Server shut down gracefully");
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerSection;
    use crate::manager::{PrRef, PrStatus, PrStatusFetcher};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct StubFetcher;

    #[async_trait::async_trait]
    impl PrStatusFetcher for StubFetcher {
        async fn fetch(&self, pr: &PrRef) -> anyhow::Result<PrStatus> {
            Ok(json!({"number": pr.number}))
        }
    }

    fn test_router(data: &TempDir) -> Router {
        let (sink, events_rx) = EventSink::channel();
        let services = Services {
            generator: ClaudeMdGenerator::new(RunnerSection::default(), RunnerExecutor::default()),
            manager: PrManager::new(Arc::new(StubFetcher), Duration::from_secs(3600), sink.clone()),
            secrets: SecretStore::new(data.path()),
        };
        let (mut dispatcher, relay) = Dispatcher::new(services, sink, events_rx);
        let surface = Arc::new(BroadcastSurface::new("test", 16));
        dispatcher.add_surface(surface.clone());
        tokio::spawn(dispatcher.run(CancellationToken::new()));
        build_router(Arc::new(AppState {
            relay,
            events: surface.sender(),
        }))
    }

    fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let data = TempDir::new().unwrap();
        let resp = test_router(&data)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_invoke_check() {
        let data = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let body = json!({
            "channel": "claude-md:check",
            "payload": {"projectPath": project.path()}
        });
        let resp = test_router(&data)
            .oneshot(post_json("/api/invoke", body.to_string()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!({"success": true, "data": {"exists": false}})
        );
    }

    #[tokio::test]
    async fn test_invoke_malformed_json_is_failure_envelope() {
        let data = TempDir::new().unwrap();
        let resp = test_router(&data)
            .oneshot(post_json("/api/invoke", "{not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid payload"));
    }

    #[tokio::test]
    async fn test_invoke_wrong_payload_type_is_failure_envelope() {
        let data = TempDir::new().unwrap();
        let body = json!({"channel": "manager:add-task", "payload": {"taskId": 1, "prUrl": true}});
        let resp = test_router(&data)
            .oneshot(post_json("/api/invoke", body.to_string()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["success"], false);
    }

    #[tokio::test]
    async fn test_notify_accepted() {
        let data = TempDir::new().unwrap();
        let body = json!({"channel": "manager:task-activity", "payload": {"taskId": "t1"}});
        let resp = test_router(&data)
            .oneshot(post_json("/api/notify", body.to_string()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_notify_invalid_is_bad_request() {
        let data = TempDir::new().unwrap();
        let resp = test_router(&data)
            .oneshot(post_json("/api/notify", r#"{"channel": "claude-md:generate"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["success"], false);
    }

    #[tokio::test]
    async fn test_ws_route_requires_upgrade() {
        let data = TempDir::new().unwrap();
        let resp = test_router(&data)
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(!config.dev_mode);
        assert!(!config.start_manager);
    }

    #[test]
    fn test_build_services_uses_config() {
        let data = TempDir::new().unwrap();
        let mut config = TaskdeckConfig::default();
        config.storage.data_dir = Some(data.path().to_path_buf());
        config.runner.python_path = "/venv/bin/python".into();
        let (sink, _rx) = EventSink::channel();
        let services = build_services(&config, sink);
        assert_eq!(services.generator.settings().python_path, "/venv/bin/python");
        assert!(services.secrets.root().starts_with(data.path()));
        assert!(!services.manager.is_running());
    }
}
