use rusqlite::{Connection, OptionalExtension};
use crate::models::{Benchmark, Configuration, Job, Processor, Solver};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Catalog rows the pair subsystem reads: benchmarks, solvers,
/// configurations, processors and job headers
pub struct CatalogRepo;

impl CatalogRepo {
    pub fn add_benchmark(conn: &Connection, name: &str, path: Option<&str>) -> Result<Benchmark> {
        conn.execute(
            "INSERT INTO benchmarks (name, path) VALUES (?1, ?2)",
            rusqlite::params![name, path],
        )
        .with_context(|| format!("Failed to add benchmark: {}", name))?;
        Ok(Benchmark {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            path: path.map(str::to_string),
        })
    }

    pub fn add_solver(conn: &Connection, name: &str, path: &str) -> Result<Solver> {
        conn.execute(
            "INSERT INTO solvers (name, path) VALUES (?1, ?2)",
            rusqlite::params![name, path],
        )
        .with_context(|| format!("Failed to add solver: {}", name))?;
        Ok(Solver {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            path: Some(path.to_string()),
        })
    }

    pub fn add_configuration(conn: &Connection, solver_id: i64, name: &str) -> Result<Configuration> {
        conn.execute(
            "INSERT INTO configurations (solver_id, name) VALUES (?1, ?2)",
            rusqlite::params![solver_id, name],
        )
        .with_context(|| format!("Failed to add configuration '{}' to solver {}", name, solver_id))?;
        Ok(Configuration {
            id: conn.last_insert_rowid(),
            solver_id: Some(solver_id),
            name: name.to_string(),
        })
    }

    /// Delete a solver and its configurations. Pairs that reference it keep
    /// their denormalized names and read back with stand-ins.
    pub fn delete_solver(conn: &Connection, solver_id: i64) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM solvers WHERE id = ?1", [solver_id])
            .with_context(|| format!("Failed to delete solver {}", solver_id))?;
        Ok(deleted > 0)
    }

    pub fn add_processor(
        conn: &Connection,
        name: &str,
        description: Option<&str>,
        path: &Path,
    ) -> Result<Processor> {
        conn.execute(
            "INSERT INTO processors (name, description, path) VALUES (?1, ?2, ?3)",
            rusqlite::params![name, description, path.to_string_lossy()],
        )
        .with_context(|| format!("Failed to add processor: {}", name))?;
        Ok(Processor {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            description: description.map(str::to_string),
            path: path.to_path_buf(),
        })
    }

    pub fn get_processor(conn: &Connection, processor_id: i64) -> Result<Option<Processor>> {
        conn.query_row(
            "SELECT id, name, description, path FROM processors WHERE id = ?1",
            [processor_id],
            |row| {
                Ok(Processor {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    path: PathBuf::from(row.get::<_, String>(3)?),
                })
            },
        )
        .optional()
        .with_context(|| format!("Failed to read processor {}", processor_id))
    }

    pub fn add_job(conn: &Connection, name: &str, post_processor_id: Option<i64>) -> Result<Job> {
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO jobs (name, post_processor_id, created_ts) VALUES (?1, ?2, ?3)",
            rusqlite::params![name, post_processor_id, now],
        )
        .with_context(|| format!("Failed to add job: {}", name))?;
        Ok(Job {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            post_processor_id,
            created_ts: now,
        })
    }

    pub fn get_job(conn: &Connection, job_id: i64) -> Result<Option<Job>> {
        conn.query_row(
            "SELECT id, name, post_processor_id, created_ts FROM jobs WHERE id = ?1",
            [job_id],
            |row| {
                Ok(Job {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    post_processor_id: row.get(2)?,
                    created_ts: row.get(3)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("Failed to read job {}", job_id))
    }
}
