use rusqlite::{Connection, Result};
use std::collections::HashMap;

/// Current database schema version
const CURRENT_VERSION: u32 = 2;

/// Migration system for managing database schema versions
pub struct MigrationManager;

impl MigrationManager {
    /// Initialize the database with the current schema
    /// This creates the schema_version table and applies all migrations
    pub fn initialize(conn: &Connection) -> Result<()> {
        // Create schema_version table to track migrations
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            [],
        )?;

        let current_version = Self::get_version(conn)?;

        // Apply migrations up to current version
        for version in (current_version + 1)..=CURRENT_VERSION {
            Self::apply_migration(conn, version)?;
        }

        Ok(())
    }

    /// Apply a specific migration by version number
    fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
        let migrations = get_migrations();
        if let Some(migration) = migrations.get(&version) {
            // Execute migration in a transaction
            let tx = conn.unchecked_transaction()?;
            migration(&tx)?;
            tx.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [version],
            )?;
            tx.commit()?;
            log::debug!("Applied schema migration v{}", version);
            Ok(())
        } else {
            Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_MISUSE),
                Some(format!("No migration found for version {}", version)),
            ))
        }
    }

    /// Get the current schema version
    pub fn get_version(conn: &Connection) -> Result<u32> {
        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
    }
}

/// Get all migrations indexed by version
fn get_migrations() -> HashMap<u32, fn(&rusqlite::Transaction) -> Result<(), rusqlite::Error>> {
    let mut migrations: HashMap<u32, fn(&rusqlite::Transaction) -> Result<(), rusqlite::Error>> = HashMap::new();
    migrations.insert(1, migration_v1);
    migrations.insert(2, migration_v2);
    migrations
}

/// Migration v1: catalog references, jobs, pairs, stages, inputs, attributes
fn migration_v1(tx: &rusqlite::Transaction) -> Result<(), rusqlite::Error> {
    // Catalog tables. These are owned by other subsystems; only the columns
    // needed to hydrate pairs are kept here.
    tx.execute(
        "CREATE TABLE benchmarks (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            path TEXT NULL
        )",
        [],
    )?;
    tx.execute(
        "CREATE TABLE solvers (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            path TEXT NOT NULL
        )",
        [],
    )?;
    tx.execute(
        "CREATE TABLE configurations (
            id INTEGER PRIMARY KEY,
            solver_id INTEGER NOT NULL REFERENCES solvers(id) ON DELETE CASCADE,
            name TEXT NOT NULL
        )",
        [],
    )?;
    tx.execute(
        "CREATE TABLE processors (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NULL,
            path TEXT NOT NULL
        )",
        [],
    )?;

    tx.execute(
        "CREATE TABLE jobs (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            post_processor_id INTEGER NULL REFERENCES processors(id),
            created_ts INTEGER NOT NULL
        )",
        [],
    )?;

    // bench_name and the stage solver/config names are denormalized so that
    // pairs stay readable after the catalog entries are deleted.
    tx.execute(
        "CREATE TABLE job_pairs (
            id INTEGER PRIMARY KEY,
            job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            bench_id INTEGER NOT NULL,
            bench_name TEXT NOT NULL,
            status_code INTEGER NOT NULL,
            path TEXT NOT NULL,
            job_space_id INTEGER NOT NULL,
            job_space_name TEXT NULL,
            primary_stage INTEGER NOT NULL,
            backend_id INTEGER NULL,
            queuesub_ts INTEGER NULL,
            start_ts INTEGER NULL,
            end_ts INTEGER NULL,
            exit_status INTEGER NULL,
            sandbox_num INTEGER NULL,
            created_ts INTEGER NOT NULL
        )",
        [],
    )?;
    tx.execute("CREATE INDEX idx_job_pairs_job_id ON job_pairs(job_id)", [])?;
    tx.execute("CREATE INDEX idx_job_pairs_status ON job_pairs(status_code)", [])?;

    tx.execute(
        "CREATE TABLE jobpair_stage_data (
            id INTEGER PRIMARY KEY,
            pair_id INTEGER NOT NULL REFERENCES job_pairs(id) ON DELETE CASCADE,
            stage_id INTEGER NULL,
            stage_number INTEGER NOT NULL,
            is_primary INTEGER NOT NULL DEFAULT 0,
            solver_id INTEGER NOT NULL,
            solver_name TEXT NOT NULL,
            config_id INTEGER NOT NULL,
            config_name TEXT NOT NULL,
            job_space_id INTEGER NOT NULL,
            status_code INTEGER NOT NULL,
            wallclock REAL NOT NULL DEFAULT 0,
            cpu REAL NOT NULL DEFAULT 0,
            user_time REAL NOT NULL DEFAULT 0,
            system_time REAL NOT NULL DEFAULT 0,
            max_vmem REAL NOT NULL DEFAULT 0,
            max_res_set REAL NOT NULL DEFAULT 0,
            UNIQUE(pair_id, stage_number)
        )",
        [],
    )?;
    tx.execute(
        "CREATE INDEX idx_stage_data_status ON jobpair_stage_data(status_code)",
        [],
    )?;
    // Note: config_id = -1 marks a no-op stage in rows written by older versions

    tx.execute(
        "CREATE TABLE jobpair_inputs (
            pair_id INTEGER NOT NULL REFERENCES job_pairs(id) ON DELETE CASCADE,
            input_number INTEGER NOT NULL,
            bench_id INTEGER NOT NULL,
            PRIMARY KEY(pair_id, input_number)
        )",
        [],
    )?;

    tx.execute(
        "CREATE TABLE job_attributes (
            pair_id INTEGER NOT NULL,
            stage_number INTEGER NOT NULL,
            attr_key TEXT NOT NULL,
            attr_value TEXT NOT NULL,
            PRIMARY KEY(pair_id, stage_number, attr_key),
            FOREIGN KEY(pair_id, stage_number)
                REFERENCES jobpair_stage_data(pair_id, stage_number) ON DELETE CASCADE
        )",
        [],
    )?;

    Ok(())
}

/// Migration v2: completed-pair tracking
fn migration_v2(tx: &rusqlite::Transaction) -> Result<(), rusqlite::Error> {
    tx.execute(
        "CREATE TABLE job_pair_completion (
            pair_id INTEGER PRIMARY KEY REFERENCES job_pairs(id) ON DELETE CASCADE,
            completed_ts INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}
