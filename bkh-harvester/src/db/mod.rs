//! Reference workflow store on SQLite
//!
//! Lets the harvester run standalone (and be tested end to end) without the
//! production workflow system behind it.

pub mod schema;
pub mod workflow_store;

pub use workflow_store::SqliteWorkflowStore;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::workflow::StoreError;

/// Open (creating if needed) the database and ensure its tables exist
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, StoreError> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    schema::create_tables(&pool).await?;

    Ok(pool)
}
