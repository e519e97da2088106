//! Persistence gateway for job pairs
//!
//! Everything above this layer talks to a [`PairStore`]; the SQLite
//! implementation groups multi-row writes into a single [`UnitOfWork`].

use crate::config::Config;
use crate::db::{DbConnection, UnitOfWork};
use crate::models::{
    Job, JobPair, JoblineStage, ProcessingTask, Processor, StageMetrics, StatusCode,
};
use crate::repo::{AttributeRepo, CatalogRepo, InputRepo, PairRepo, StageAttributes, StageRepo};
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub trait PairStore: Send + Sync {
    /// Persist new pairs in batches, setting each pair's id
    fn add_pairs(&self, pairs: &mut [JobPair]) -> Result<usize>;

    /// Pair with its stages (no attributes)
    fn get_pair(&self, pair_id: i64) -> Result<Option<JobPair>>;

    /// Pair with stages, attributes and inputs
    fn get_pair_detailed(&self, pair_id: i64) -> Result<Option<JobPair>>;

    fn get_pair_stages(&self, pair_id: i64) -> Result<Vec<JoblineStage>>;

    fn get_pair_attributes(&self, pair_id: i64) -> Result<StageAttributes>;

    fn get_pair_input_paths(&self, pair_id: i64) -> Result<Vec<String>>;

    fn list_pairs_for_job(&self, job_id: i64) -> Result<Vec<JobPair>>;

    fn get_stage_status(&self, pair_id: i64, stage_number: i64) -> Result<Option<StatusCode>>;

    /// Set one stage's status if its current status is in `allowed_from`.
    /// The pair-level status follows the primary stage.
    fn update_stage_status(
        &self,
        pair_id: i64,
        stage_number: i64,
        code: StatusCode,
        allowed_from: &[StatusCode],
    ) -> Result<bool>;

    /// Set every stage numbered `from_stage` or higher (`-1` = all) whose
    /// current status is in `allowed_from`
    fn update_later_statuses(
        &self,
        pair_id: i64,
        from_stage: i64,
        code: StatusCode,
        allowed_from: &[StatusCode],
    ) -> Result<usize>;

    fn record_stage_metrics(&self, pair_id: i64, stage_number: i64, metrics: &StageMetrics) -> Result<()>;

    fn set_backend_handle(&self, pair_id: i64, handle: i64) -> Result<()>;

    fn set_queue_submit_time(&self, pair_id: i64, ts: i64) -> Result<()>;

    /// Move every stage still pending submission to enqueued. Returns how
    /// many moved; 0 means the pair was not (or is no longer) pending.
    fn claim_for_submission(&self, pair_id: i64) -> Result<usize>;

    /// Store the backend handle and queue-submit time of a claimed pair.
    /// Fails if the pair already has a handle.
    fn record_submission(&self, pair_id: i64, handle: i64, ts: i64) -> Result<()>;

    /// Store a stage's attributes and mark it complete, atomically
    fn commit_post_processing(
        &self,
        pair_id: i64,
        stage_number: i64,
        attributes: &HashMap<String, String>,
    ) -> Result<()>;

    fn pairs_awaiting_processing(&self) -> Result<Vec<ProcessingTask>>;

    /// Move a stage from awaiting-post-processing to processing-results.
    /// Only one caller can win for a given stage.
    fn claim_for_processing(&self, pair_id: i64, stage_number: i64) -> Result<bool> {
        self.update_stage_status(
            pair_id,
            stage_number,
            StatusCode::ProcessingResults,
            &[StatusCode::Processing],
        )
    }

    fn get_processor(&self, processor_id: i64) -> Result<Option<Processor>>;

    fn get_job(&self, job_id: i64) -> Result<Option<Job>>;

    fn remove_pair_from_completed(&self, pair_id: i64) -> Result<bool>;

    /// Write each pair's job space id. One pair's failure does not stop the
    /// rest; returns how many pairs were updated.
    fn update_job_spaces(&self, pairs: &[JobPair]) -> Result<usize>;
}

/// SQLite-backed store; a single connection serialized behind a mutex
pub struct SqliteStore {
    conn: Mutex<Connection>,
    batch_size: usize,
}

impl SqliteStore {
    pub fn new(conn: Connection, batch_size: usize) -> Self {
        Self {
            conn: Mutex::new(conn),
            batch_size: batch_size.max(1),
        }
    }

    pub fn open(config: &Config) -> Result<Self> {
        Ok(Self::new(DbConnection::connect(config)?, config.batch_size))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(DbConnection::connect_in_memory()?, 1000))
    }

    /// Direct access to the underlying connection
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PairStore for SqliteStore {
    fn add_pairs(&self, pairs: &mut [JobPair]) -> Result<usize> {
        let conn = self.connection();
        PairRepo::add_batch(&conn, pairs, self.batch_size)
    }

    fn get_pair(&self, pair_id: i64) -> Result<Option<JobPair>> {
        PairRepo::get_by_id(&self.connection(), pair_id)
    }

    fn get_pair_detailed(&self, pair_id: i64) -> Result<Option<JobPair>> {
        PairRepo::get_detailed(&self.connection(), pair_id)
    }

    fn get_pair_stages(&self, pair_id: i64) -> Result<Vec<JoblineStage>> {
        StageRepo::list_for_pair(&self.connection(), pair_id)
    }

    fn get_pair_attributes(&self, pair_id: i64) -> Result<StageAttributes> {
        AttributeRepo::get_for_pair(&self.connection(), pair_id)
    }

    fn get_pair_input_paths(&self, pair_id: i64) -> Result<Vec<String>> {
        InputRepo::list_paths(&self.connection(), pair_id)
    }

    fn list_pairs_for_job(&self, job_id: i64) -> Result<Vec<JobPair>> {
        PairRepo::list_for_job(&self.connection(), job_id)
    }

    fn get_stage_status(&self, pair_id: i64, stage_number: i64) -> Result<Option<StatusCode>> {
        StageRepo::status_of(&self.connection(), pair_id, stage_number)
    }

    fn update_stage_status(
        &self,
        pair_id: i64,
        stage_number: i64,
        code: StatusCode,
        allowed_from: &[StatusCode],
    ) -> Result<bool> {
        let conn = self.connection();
        UnitOfWork::run(&conn, |tx| {
            let updated = StageRepo::update_status(tx, pair_id, stage_number, code, allowed_from)?;
            if updated > 0 {
                PairRepo::sync_status_from_primary(tx, pair_id)?;
            }
            Ok(updated > 0)
        })
    }

    fn update_later_statuses(
        &self,
        pair_id: i64,
        from_stage: i64,
        code: StatusCode,
        allowed_from: &[StatusCode],
    ) -> Result<usize> {
        let conn = self.connection();
        UnitOfWork::run(&conn, |tx| {
            let updated = StageRepo::update_later_statuses(tx, pair_id, from_stage, code, allowed_from)?;
            if updated > 0 {
                PairRepo::sync_status_from_primary(tx, pair_id)?;
            }
            Ok(updated)
        })
    }

    fn record_stage_metrics(&self, pair_id: i64, stage_number: i64, metrics: &StageMetrics) -> Result<()> {
        StageRepo::update_metrics(&self.connection(), pair_id, stage_number, metrics)
    }

    fn set_backend_handle(&self, pair_id: i64, handle: i64) -> Result<()> {
        PairRepo::set_backend_handle(&self.connection(), pair_id, handle)
    }

    fn set_queue_submit_time(&self, pair_id: i64, ts: i64) -> Result<()> {
        PairRepo::set_queue_submit_time(&self.connection(), pair_id, ts)
    }

    fn claim_for_submission(&self, pair_id: i64) -> Result<usize> {
        let conn = self.connection();
        UnitOfWork::run(&conn, |tx| {
            let claimed = StageRepo::update_later_statuses(
                tx,
                pair_id,
                -1,
                StatusCode::Enqueued,
                &[StatusCode::PendingSubmit],
            )?;
            if claimed > 0 {
                PairRepo::sync_status_from_primary(tx, pair_id)?;
            }
            Ok(claimed)
        })
        .with_context(|| format!("Failed to claim pair {} for submission", pair_id))
    }

    fn record_submission(&self, pair_id: i64, handle: i64, ts: i64) -> Result<()> {
        PairRepo::record_handle(&self.connection(), pair_id, handle, ts)
            .with_context(|| format!("Failed to record submission of pair {}", pair_id))
    }

    fn commit_post_processing(
        &self,
        pair_id: i64,
        stage_number: i64,
        attributes: &HashMap<String, String>,
    ) -> Result<()> {
        let conn = self.connection();
        UnitOfWork::run(&conn, |tx| {
            AttributeRepo::put_all(tx, pair_id, stage_number, attributes)?;
            let updated = StageRepo::update_status(
                tx,
                pair_id,
                stage_number,
                StatusCode::Complete,
                &[StatusCode::ProcessingResults, StatusCode::Processing],
            )?;
            if updated == 0 {
                anyhow::bail!(
                    "Stage {} of pair {} is not awaiting post-processing",
                    stage_number,
                    pair_id
                );
            }
            PairRepo::sync_status_from_primary(tx, pair_id)
        })
        .with_context(|| {
            format!("Failed to commit post-processing of stage {} of pair {}", stage_number, pair_id)
        })
    }

    fn pairs_awaiting_processing(&self) -> Result<Vec<ProcessingTask>> {
        StageRepo::awaiting_processing(&self.connection())
    }

    fn get_processor(&self, processor_id: i64) -> Result<Option<Processor>> {
        CatalogRepo::get_processor(&self.connection(), processor_id)
    }

    fn get_job(&self, job_id: i64) -> Result<Option<Job>> {
        CatalogRepo::get_job(&self.connection(), job_id)
    }

    fn remove_pair_from_completed(&self, pair_id: i64) -> Result<bool> {
        PairRepo::remove_from_completed(&self.connection(), pair_id)
    }

    fn update_job_spaces(&self, pairs: &[JobPair]) -> Result<usize> {
        let conn = self.connection();
        let mut updated = 0;
        for pair in pairs {
            let Some(pair_id) = pair.id else {
                log::warn!("Skipping job space update for unsaved pair ({})", pair.bench.name);
                continue;
            };
            match UnitOfWork::run(&conn, |tx| PairRepo::set_job_space(tx, pair_id, pair.job_space_id)) {
                Ok(()) => updated += 1,
                Err(e) => log::error!("Failed to update job space of pair {}: {:#}", pair_id, e),
            }
        }
        Ok(updated)
    }
}
