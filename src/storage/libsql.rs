//! LibSQL document store
//!
//! Persists feedback entries in a libSQL/SQLite database. Live queries are
//! served from the in-process [`LiveQueryHub`]: every write or delete made
//! through this store publishes the new entry set of the affected class.
//! Writes made by other processes against the same file are not observed live.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Builder, Connection, Database};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{PulseError, Result};
use crate::storage::{DocumentStore, LiveQueryHub, Subscription};
use crate::types::{ClassId, EntryId, FeedbackEntry};

/// Schema migrations, applied in order
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial_schema.sql",
    include_str!("../../migrations/libsql/001_initial_schema.sql"),
)];

/// Database connection mode
#[derive(Debug, Clone)]
pub enum ConnectionMode {
    /// Local file-based database
    Local(String),
    /// In-memory database (for testing)
    InMemory,
    /// Remote database (Turso Cloud)
    Remote { url: String, token: String },
}

impl ConnectionMode {
    /// Parse a database location
    ///
    /// - ":memory:" → InMemory
    /// - "libsql://..." → Remote (token from TURSO_AUTH_TOKEN)
    /// - Other → Local file path
    pub fn from_path(database_url: &str) -> Result<Self> {
        if database_url == ":memory:" {
            Ok(ConnectionMode::InMemory)
        } else if database_url.starts_with("libsql://") {
            let token = std::env::var("TURSO_AUTH_TOKEN")
                .map_err(|_| PulseError::Other("TURSO_AUTH_TOKEN not found".into()))?;
            Ok(ConnectionMode::Remote {
                url: database_url.to_string(),
                token,
            })
        } else {
            Ok(ConnectionMode::Local(database_url.to_string()))
        }
    }
}

/// LibSQL storage backend
pub struct LibsqlStore {
    // Held so the database outlives its connection
    _db: Database,
    // One shared connection: libSQL :memory: databases are per connection
    conn: Connection,
    // Serialises mutation + snapshot so pushes arrive in commit order
    write_lock: Mutex<()>,
    hub: Arc<LiveQueryHub>,
}

impl LibsqlStore {
    /// Validate database file before opening
    ///
    /// Returns `Ok(false)` when the file is missing and `must_exist` is false.
    fn validate_database_file(db_path: &str, must_exist: bool) -> Result<bool> {
        use std::fs;
        use std::path::Path;

        let path = Path::new(db_path);

        if !path.exists() {
            if must_exist {
                return Err(PulseError::Database(format!(
                    "Database file not found at '{}'. Run 'classpulse init' first or check storage.database.",
                    db_path
                )));
            }
            return Ok(false);
        }

        // SQLite files start with "SQLite format 3\0"; an empty file is a fresh database
        let bytes = fs::read(path).map_err(|e| {
            PulseError::Database(format!("Cannot read database file at '{}': {}", db_path, e))
        })?;

        if !bytes.is_empty() && (bytes.len() < 16 || &bytes[0..16] != b"SQLite format 3\0") {
            return Err(PulseError::Database(format!(
                "Database file at '{}' is corrupted or not a valid SQLite database.",
                db_path
            )));
        }

        debug!("Database file validation passed: {}", db_path);
        Ok(true)
    }

    /// Open a store, optionally creating the database
    ///
    /// Migrations run on every open; already applied ones are skipped.
    pub async fn new_with_validation(
        mode: ConnectionMode,
        create_if_missing: bool,
        live_capacity: usize,
    ) -> Result<Self> {
        info!(
            "Connecting to LibSQL database: {:?} (create_if_missing: {})",
            redact(&mode),
            create_if_missing
        );

        let db = match mode {
            ConnectionMode::Local(ref path) => {
                let exists = Self::validate_database_file(path, !create_if_missing)?;

                if create_if_missing && !exists {
                    if let Some(parent) = std::path::Path::new(path).parent() {
                        if !parent.as_os_str().is_empty() {
                            std::fs::create_dir_all(parent).map_err(|e| {
                                PulseError::Database(format!(
                                    "Failed to create database directory {}: {}",
                                    parent.display(),
                                    e
                                ))
                            })?;
                        }
                    }
                }

                Builder::new_local(path).build().await.map_err(|e| {
                    PulseError::Database(format!("Failed to create local database: {}", e))
                })?
            }
            ConnectionMode::InMemory => Builder::new_local(":memory:").build().await.map_err(|e| {
                PulseError::Database(format!("Failed to create in-memory database: {}", e))
            })?,
            ConnectionMode::Remote { ref url, ref token } => {
                Builder::new_remote(url.clone(), token.clone())
                    .build()
                    .await
                    .map_err(|e| {
                        PulseError::Database(format!("Failed to create remote database: {}", e))
                    })?
            }
        };

        let conn = db
            .connect()
            .map_err(|e| PulseError::Database(format!("Failed to get connection: {}", e)))?;

        let store = Self {
            _db: db,
            conn,
            write_lock: Mutex::new(()),
            hub: Arc::new(LiveQueryHub::new(live_capacity)),
        };

        store.run_migrations().await?;
        Ok(store)
    }

    /// Open an existing database (errors if it is missing)
    pub async fn new(mode: ConnectionMode) -> Result<Self> {
        Self::new_with_validation(mode, false, 64).await
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");

        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS _migrations_applied (
                    migration_name TEXT PRIMARY KEY,
                    applied_at INTEGER NOT NULL
                )",
                params![],
            )
            .await
            .map_err(|e| {
                PulseError::Migration(format!("Failed to create migrations table: {}", e))
            })?;

        for (name, sql) in MIGRATIONS {
            let mut rows = self
                .conn
                .query(
                    "SELECT COUNT(*) FROM _migrations_applied WHERE migration_name = ?",
                    params![*name],
                )
                .await?;

            let already_applied = match rows.next().await? {
                Some(row) => row.get::<i64>(0).unwrap_or(0),
                None => 0,
            };

            if already_applied > 0 {
                debug!("Skipping already applied migration: {}", name);
                continue;
            }

            self.conn.execute_batch(sql).await.map_err(|e| {
                PulseError::Migration(format!("Failed to execute {}: {}", name, e))
            })?;

            self.conn
                .execute(
                    "INSERT INTO _migrations_applied (migration_name, applied_at) VALUES (?, ?)",
                    params![*name, Utc::now().timestamp()],
                )
                .await
                .map_err(|e| PulseError::Migration(format!("Failed to record migration: {}", e)))?;

            info!("Executed migration: {}", name);
        }

        info!("Database migrations completed");
        Ok(())
    }

    /// Check if database is healthy and operational
    pub async fn check_database_health(&self) -> Result<()> {
        match self.conn.query("SELECT 1", ()).await {
            Ok(_) => {
                debug!("Database health check passed");
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains("readonly") || error_msg.contains("permission") {
                    Err(PulseError::Database(
                        "Database is read-only or permission denied. Check file permissions."
                            .to_string(),
                    ))
                } else if error_msg.contains("corrupt") || error_msg.contains("malformed") {
                    Err(PulseError::Database(
                        "Database appears to be corrupted. Consider restoring from backup."
                            .to_string(),
                    ))
                } else {
                    Err(PulseError::Database(format!("Health check failed: {}", error_msg)))
                }
            }
        }
    }

    fn row_to_entry(row: &libsql::Row) -> Result<FeedbackEntry> {
        let id = EntryId::from_string(row.get::<String>(0)?);

        let class_id: String = row.get(1)?;
        let reaction: String = row.get(2)?;
        let submitter: String = row.get(3)?;

        let created_at_str: String = row.get(4)?;
        // Rows from other writers may not use RFC 3339; the time is informational
        let created_at = match chrono::DateTime::parse_from_rfc3339(&created_at_str) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                warn!("Entry {} has unreadable timestamp '{}': {}", id, created_at_str, e);
                DateTime::<Utc>::default()
            }
        };

        Ok(FeedbackEntry {
            id,
            class_id: ClassId::new(class_id),
            reaction,
            submitter,
            created_at,
        })
    }

    async fn query_class(&self, class_id: &ClassId) -> Result<Vec<FeedbackEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, class_id, reaction, submitter, created_at
                 FROM feedback_entries WHERE class_id = ?",
                params![class_id.as_str()],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::row_to_entry(&row)?);
        }
        Ok(entries)
    }

    /// Publish the class's new entry set, or mark its live queries failed
    async fn publish_class(&self, class_id: &ClassId) {
        if self.hub.subscriber_count(class_id) == 0 {
            return;
        }

        match self.query_class(class_id).await {
            Ok(entries) => self.hub.publish(class_id, entries),
            Err(e) => {
                warn!("Failed to refresh live query for {}: {}", class_id, e);
                self.hub.fail(class_id, e.to_string());
            }
        }
    }
}

#[async_trait]
impl DocumentStore for LibsqlStore {
    async fn write_entry(&self, entry: &FeedbackEntry) -> Result<()> {
        debug!("Storing feedback entry {} in {}", entry.id, entry.class_id);

        let _guard = self.write_lock.lock().await;
        self.conn
            .execute(
                "INSERT INTO feedback_entries (id, class_id, reaction, submitter, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    entry.id.to_string(),
                    entry.class_id.as_str(),
                    entry.reaction.clone(),
                    entry.submitter.clone(),
                    entry.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| {
                let error_msg = e.to_string();
                if error_msg.contains("locked") || error_msg.contains("busy") {
                    PulseError::Database(
                        "Write failed: database is locked. Another process may be writing."
                            .to_string(),
                    )
                } else {
                    PulseError::Database(format!("Write failed: {}", error_msg))
                }
            })?;

        self.publish_class(&entry.class_id).await;
        Ok(())
    }

    async fn list_entries(&self, class_id: &ClassId) -> Result<Vec<FeedbackEntry>> {
        self.query_class(class_id).await
    }

    async fn delete_entry(&self, class_id: &ClassId, id: &EntryId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let affected = self
            .conn
            .execute(
                "DELETE FROM feedback_entries WHERE class_id = ? AND id = ?",
                params![class_id.as_str(), id.to_string()],
            )
            .await?;

        if affected == 0 {
            return Err(PulseError::EntryNotFound(id.to_string()));
        }

        debug!("Deleted feedback entry {} from {}", id, class_id);
        self.publish_class(class_id).await;
        Ok(())
    }

    async fn subscribe(&self, class_id: &ClassId) -> Result<Subscription> {
        let _guard = self.write_lock.lock().await;
        let rx = self.hub.receiver(class_id);
        let entries = self.query_class(class_id).await?;
        let initial = self.hub.snapshot(class_id, entries);
        Ok(Subscription::new(class_id.clone(), initial, rx))
    }

    fn subscriber_count(&self, class_id: &ClassId) -> usize {
        self.hub.subscriber_count(class_id)
    }
}

/// Hide remote tokens from logs
fn redact(mode: &ConnectionMode) -> ConnectionMode {
    match mode {
        ConnectionMode::Remote { url, .. } => ConnectionMode::Remote {
            url: url.clone(),
            token: "***".to_string(),
        },
        other => other.clone(),
    }
}
