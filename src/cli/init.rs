//! Database initialization command

use classpulse_core::error::Result;
use tracing::debug;

/// Create the database (if missing) and apply migrations
pub async fn handle(db_path: String, live_capacity: usize) -> Result<()> {
    debug!("Initializing database at {}", db_path);
    let store = super::open_store(&db_path, live_capacity).await?;
    store.check_database_health().await?;

    println!("Database initialized: {}", db_path);
    Ok(())
}
