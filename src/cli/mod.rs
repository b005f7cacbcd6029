//! CLI command handlers
//!
//! Each subcommand lives in its own module. `serve` and `init` work on the
//! database directly; the rest talk to a running server over HTTP.

pub mod client;
pub mod init;
pub mod serve;
pub mod watch;

use classpulse_core::{
    config::PulseConfig,
    error::Result,
    storage::libsql::{ConnectionMode, LibsqlStore},
};
use tracing::debug;

/// Resolve the database location: CLI flag, then configuration
pub fn resolve_db_path(cli_path: Option<String>, config: &PulseConfig) -> String {
    cli_path.unwrap_or_else(|| config.storage.database.clone())
}

/// Open the configured store, creating a local database if needed
pub async fn open_store(db_path: &str, live_capacity: usize) -> Result<LibsqlStore> {
    debug!("Opening store at {}", db_path);
    let mode = ConnectionMode::from_path(db_path)?;
    LibsqlStore::new_with_validation(mode, true, live_capacity).await
}
