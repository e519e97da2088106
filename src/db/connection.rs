use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::db::migrations::MigrationManager;

/// How long a writer waits on a lock held by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Database connection manager
pub struct DbConnection;

impl DbConnection {
    /// Connect to the configured database, creating it and parent directories if needed
    pub fn connect(config: &Config) -> Result<Connection> {
        Self::connect_at(&config.db_path)
    }

    /// Connect to a database file at an explicit path
    pub fn connect_at(db_path: &Path) -> Result<Connection> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        Self::configure(&conn)?;

        MigrationManager::initialize(&conn)
            .context("Failed to initialize database schema")?;

        Ok(conn)
    }

    /// Connect to an in-memory database (for testing)
    pub fn connect_in_memory() -> Result<Connection> {
        let conn = Connection::open_in_memory()
            .context("Failed to open in-memory database")?;
        Self::configure(&conn)?;

        MigrationManager::initialize(&conn)
            .context("Failed to initialize database schema")?;

        Ok(conn)
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .context("Failed to enable foreign keys")?;
        Ok(())
    }
}
