//! Configuration for classpulse
//!
//! Layered: built-in defaults, then an optional TOML file, then environment
//! variables. The `__` separator also follows the `CLASSPULSE` prefix, so
//! `server.addr` is set by `CLASSPULSE__SERVER__ADDR`.

use std::net::SocketAddr;
use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::debug;

use crate::class::{ClassDirectory, ClassInfo};
use crate::error::{PulseError, Result};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "classpulse.toml";

/// Get the default database path under the platform data directory
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("classpulse")
        .join("classpulse.db")
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub addr: String,
    /// Activity event channel capacity
    pub event_capacity: usize,
    pub heartbeat_secs: u64,
}

/// Storage settings
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// File path, `:memory:` or `libsql://` URL
    pub database: String,
    /// Per-class live snapshot channel capacity
    pub live_capacity: usize,
}

/// Full application settings
#[derive(Debug, Clone, Deserialize)]
pub struct PulseConfig {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    #[serde(default)]
    pub classes: Vec<ClassInfo>,
}

impl PulseConfig {
    /// Load settings from defaults, `path` (if present) and the environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = path.unwrap_or(DEFAULT_CONFIG_FILE);
        debug!("Loading configuration from {} (optional)", file);

        let settings = Config::builder()
            .set_default("server.addr", "127.0.0.1:3000")?
            .set_default("server.event_capacity", 1000_i64)?
            .set_default("server.heartbeat_secs", 10_i64)?
            .set_default(
                "storage.database",
                default_db_path().to_string_lossy().to_string(),
            )?
            .set_default("storage.live_capacity", 64_i64)?
            .add_source(File::with_name(file).required(path.is_some()))
            .add_source(Environment::with_prefix("CLASSPULSE").separator("__"))
            .build()?;

        let config: PulseConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if self.server.event_capacity == 0 || self.storage.live_capacity == 0 {
            return Err(PulseError::Config(config::ConfigError::Message(
                "channel capacities must be greater than zero".to_string(),
            )));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.server.addr.parse().map_err(|e| {
            PulseError::Config(config::ConfigError::Message(format!(
                "Invalid server address '{}': {}",
                self.server.addr, e
            )))
        })
    }

    pub fn directory(&self) -> ClassDirectory {
        ClassDirectory::new(self.classes.clone())
    }
}
