//! HTTP server startup command

use std::sync::Arc;

use classpulse_core::{
    api::{ApiServer, ApiServerConfig},
    config::PulseConfig,
    error::Result,
};
use tracing::{info, warn};

/// Open the store and serve the API until interrupted
pub async fn handle(config: PulseConfig, db_path: String, addr: Option<String>) -> Result<()> {
    let mut config = config;
    if let Some(addr) = addr {
        config.server.addr = addr;
    }
    let socket_addr = config.socket_addr()?;

    let store = super::open_store(&db_path, config.storage.live_capacity).await?;
    let directory = config.directory();
    if directory.is_empty() {
        warn!("No classes configured; every class request will return 404");
    } else {
        info!("Serving {} classes", directory.len());
    }

    let server = ApiServer::new(
        ApiServerConfig {
            addr: socket_addr,
            event_capacity: config.server.event_capacity,
            heartbeat_secs: config.server.heartbeat_secs,
        },
        Arc::new(store),
        directory,
    );

    server.serve().await?;
    Ok(())
}
