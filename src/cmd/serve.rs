//! Relay server command: `taskdeck serve`.

use anyhow::Result;

use taskdeck::config::TaskdeckConfig;
use taskdeck::server::{self, ServerConfig};

pub async fn cmd_serve(
    config: &TaskdeckConfig,
    port: Option<u16>,
    dev: bool,
    start_manager: bool,
) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    let mut server_config = ServerConfig::from_config(config);
    if let Some(port) = port {
        server_config.port = port;
    }
    server_config.dev_mode |= dev;
    server_config.start_manager = start_manager;

    server::start_server(server_config, config).await
}
