use rusqlite::{Connection, OptionalExtension, Row};
use crate::db::UnitOfWork;
use crate::models::{Benchmark, JobPair, Status, StatusCode};
use crate::repo::{AttributeRepo, InputRepo, StageRepo};
use anyhow::{Context, Result};

const PAIR_SELECT: &str =
    "SELECT p.id, p.job_id, p.bench_id, p.bench_name, b.path, p.status_code, p.path,
            p.job_space_id, p.job_space_name, p.primary_stage, p.backend_id, p.queuesub_ts,
            p.start_ts, p.end_ts, p.exit_status, p.sandbox_num
     FROM job_pairs p
     LEFT JOIN benchmarks b ON b.id = p.bench_id";

/// Job pair repository
pub struct PairRepo;

impl PairRepo {
    /// Insert one pair with its stages and inputs. Returns the new pair id.
    pub fn insert(conn: &Connection, pair: &JobPair, now: i64) -> Result<i64> {
        pair.validate()
            .with_context(|| format!("Invalid pair for benchmark '{}'", pair.bench.name))?;

        conn.execute(
            "INSERT INTO job_pairs (job_id, bench_id, bench_name, status_code, path, job_space_id,
                    job_space_name, primary_stage, sandbox_num, created_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                pair.job_id,
                pair.bench.id,
                pair.bench.name,
                pair.status.code.code(),
                pair.path,
                pair.job_space_id,
                pair.job_space_name,
                pair.primary_stage_number,
                pair.sandbox_num,
                now,
            ],
        )
        .with_context(|| format!("Failed to add pair for benchmark: {}", pair.bench.name))?;
        let id = conn.last_insert_rowid();

        for stage in pair.runnable_stages() {
            StageRepo::insert(conn, id, stage, pair.is_primary(stage.stage_number), pair.job_space_id)?;
        }
        InputRepo::insert_all(conn, id, &pair.bench_inputs)?;

        Ok(id)
    }

    /// Insert pairs in transactions of `batch_size` pairs, assigning ids in input order.
    ///
    /// Every pair is validated before anything is written. If a later batch
    /// fails, earlier batches stay committed.
    pub fn add_batch(conn: &Connection, pairs: &mut [JobPair], batch_size: usize) -> Result<usize> {
        for pair in pairs.iter() {
            pair.validate()
                .with_context(|| format!("Invalid pair for benchmark '{}'", pair.bench.name))?;
        }

        let now = chrono::Utc::now().timestamp();
        let mut added = 0;
        for chunk in pairs.chunks_mut(batch_size.max(1)) {
            let ids = UnitOfWork::run(conn, |tx| {
                chunk.iter().map(|pair| Self::insert(tx, pair, now)).collect::<Result<Vec<_>>>()
            })?;
            for (pair, id) in chunk.iter_mut().zip(ids) {
                pair.id = Some(id);
            }
            added += chunk.len();
            log::debug!("Committed batch of {} pairs ({} total)", chunk.len(), added);
        }
        Ok(added)
    }

    /// Pair with all of its stages, without attributes
    pub fn get_by_id(conn: &Connection, pair_id: i64) -> Result<Option<JobPair>> {
        let sql = format!("{} WHERE p.id = ?1", PAIR_SELECT);
        let pair = conn
            .query_row(&sql, [pair_id], row_to_pair)
            .optional()
            .with_context(|| format!("Failed to read pair {}", pair_id))?;

        match pair {
            Some(mut pair) => {
                pair.stages = StageRepo::list_for_pair(conn, pair_id)?;
                Ok(Some(pair))
            }
            None => Ok(None),
        }
    }

    /// Pair with stages, stage attributes and benchmark inputs
    pub fn get_detailed(conn: &Connection, pair_id: i64) -> Result<Option<JobPair>> {
        let mut pair = match Self::get_by_id(conn, pair_id)? {
            Some(pair) => pair,
            None => return Ok(None),
        };
        let mut attributes = AttributeRepo::get_for_pair(conn, pair_id)?;
        for stage in &mut pair.stages {
            if let Some(attrs) = attributes.remove(&stage.stage_number) {
                stage.attributes = attrs;
            }
        }
        pair.bench_inputs = InputRepo::list_bench_ids(conn, pair_id)?;
        Ok(Some(pair))
    }

    pub fn list_ids_for_job(conn: &Connection, job_id: i64) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare("SELECT id FROM job_pairs WHERE job_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map([job_id], |row| row.get(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Every pair of a job, fully hydrated, in id order
    pub fn list_for_job(conn: &Connection, job_id: i64) -> Result<Vec<JobPair>> {
        let mut pairs = Vec::new();
        for id in Self::list_ids_for_job(conn, job_id)? {
            if let Some(pair) = Self::get_detailed(conn, id)? {
                pairs.push(pair);
            }
        }
        Ok(pairs)
    }

    /// Copy the primary stage's status onto the pair and keep the completion
    /// table in step with it
    pub fn sync_status_from_primary(conn: &Connection, pair_id: i64) -> Result<()> {
        conn.execute(
            "UPDATE job_pairs SET status_code = COALESCE(
                (SELECT st.status_code FROM jobpair_stage_data st
                 WHERE st.pair_id = job_pairs.id AND st.stage_number = job_pairs.primary_stage),
                status_code)
             WHERE id = ?1",
            [pair_id],
        )
        .with_context(|| format!("Failed to update status of pair {}", pair_id))?;

        let code: Option<i64> = conn
            .query_row("SELECT status_code FROM job_pairs WHERE id = ?1", [pair_id], |row| row.get(0))
            .optional()?;
        match code.map(StatusCode::from_code_lossy) {
            Some(code) if code.is_terminal() => Self::mark_completed(conn, pair_id),
            Some(_) => Self::remove_from_completed(conn, pair_id).map(|_| ()),
            None => anyhow::bail!("Pair {} not found", pair_id),
        }
    }

    pub fn mark_completed(conn: &Connection, pair_id: i64) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO job_pair_completion (pair_id, completed_ts) VALUES (?1, ?2)",
            rusqlite::params![pair_id, chrono::Utc::now().timestamp()],
        )
        .with_context(|| format!("Failed to mark pair {} completed", pair_id))?;
        Ok(())
    }

    /// Returns true if the pair was in the completed set
    pub fn remove_from_completed(conn: &Connection, pair_id: i64) -> Result<bool> {
        let removed = conn
            .execute("DELETE FROM job_pair_completion WHERE pair_id = ?1", [pair_id])
            .with_context(|| format!("Failed to remove pair {} from completed set", pair_id))?;
        Ok(removed > 0)
    }

    pub fn is_completed(conn: &Connection, pair_id: i64) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM job_pair_completion WHERE pair_id = ?1",
            [pair_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn set_backend_handle(conn: &Connection, pair_id: i64, handle: i64) -> Result<()> {
        let updated = conn
            .execute(
                "UPDATE job_pairs SET backend_id = ?1 WHERE id = ?2",
                rusqlite::params![handle, pair_id],
            )
            .with_context(|| format!("Failed to set backend handle of pair {}", pair_id))?;
        if updated == 0 {
            anyhow::bail!("Pair {} not found", pair_id);
        }
        Ok(())
    }

    pub fn set_queue_submit_time(conn: &Connection, pair_id: i64, ts: i64) -> Result<()> {
        let updated = conn
            .execute(
                "UPDATE job_pairs SET queuesub_ts = ?1 WHERE id = ?2",
                rusqlite::params![ts, pair_id],
            )
            .with_context(|| format!("Failed to set queue submit time of pair {}", pair_id))?;
        if updated == 0 {
            anyhow::bail!("Pair {} not found", pair_id);
        }
        Ok(())
    }

    /// Store the backend handle and queue-submit time of a pair that has
    /// no handle yet
    pub fn record_handle(conn: &Connection, pair_id: i64, handle: i64, ts: i64) -> Result<()> {
        let updated = conn
            .execute(
                "UPDATE job_pairs SET backend_id = ?1, queuesub_ts = ?2
                 WHERE id = ?3 AND backend_id IS NULL",
                rusqlite::params![handle, ts, pair_id],
            )
            .with_context(|| format!("Failed to set backend handle of pair {}", pair_id))?;
        if updated == 0 {
            anyhow::bail!("Pair {} not found or already has a backend handle", pair_id);
        }
        Ok(())
    }

    /// Move a pair (and its stages) to another job space
    pub fn set_job_space(conn: &Connection, pair_id: i64, job_space_id: i64) -> Result<()> {
        let updated = conn
            .execute(
                "UPDATE job_pairs SET job_space_id = ?1 WHERE id = ?2",
                rusqlite::params![job_space_id, pair_id],
            )
            .with_context(|| format!("Failed to set job space of pair {}", pair_id))?;
        if updated == 0 {
            anyhow::bail!("Pair {} not found", pair_id);
        }
        StageRepo::set_job_space(conn, pair_id, job_space_id)?;
        Ok(())
    }
}

fn row_to_pair(row: &Row) -> rusqlite::Result<JobPair> {
    Ok(JobPair {
        id: Some(row.get(0)?),
        job_id: row.get(1)?,
        bench: Benchmark {
            id: row.get(2)?,
            name: row.get(3)?,
            path: row.get(4)?,
        },
        stages: Vec::new(),
        primary_stage_number: row.get(9)?,
        path: row.get(6)?,
        job_space_id: row.get(7)?,
        job_space_name: row.get(8)?,
        backend_handle: row.get(10)?,
        queue_submit_ts: row.get(11)?,
        start_ts: row.get(12)?,
        end_ts: row.get(13)?,
        exit_status: row.get(14)?,
        sandbox_num: row.get(15)?,
        status: Status::new(StatusCode::from_code_lossy(row.get(5)?)),
        bench_inputs: Vec::new(),
    })
}
