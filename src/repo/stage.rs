use rusqlite::{Connection, OptionalExtension, Row};
use crate::models::{
    Configuration, JoblineStage, ProcessingTask, Solver, StageMetrics, Status, StatusCode,
};
use anyhow::{Context, Result};

/// config_id stored for no-op stages by older writers
const NO_OP_CONFIG_ID: i64 = -1;

const STAGE_SELECT: &str =
    "SELECT st.stage_number, st.stage_id, st.solver_id, st.solver_name, st.config_id,
            st.config_name, st.status_code, st.wallclock, st.cpu, st.user_time,
            st.system_time, st.max_vmem, st.max_res_set, s.path, c.id, c.solver_id
     FROM jobpair_stage_data st
     LEFT JOIN solvers s ON s.id = st.solver_id
     LEFT JOIN configurations c ON c.id = st.config_id";

/// Stage repository: one row per (pair, stage number)
pub struct StageRepo;

impl StageRepo {
    /// Insert a stage row for a pair. No-op stages are never stored.
    pub fn insert(
        conn: &Connection,
        pair_id: i64,
        stage: &JoblineStage,
        is_primary: bool,
        job_space_id: i64,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO jobpair_stage_data (pair_id, stage_id, stage_number, is_primary,
                    solver_id, solver_name, config_id, config_name, job_space_id, status_code,
                    wallclock, cpu, user_time, system_time, max_vmem, max_res_set)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            rusqlite::params![
                pair_id,
                stage.stage_id,
                stage.stage_number,
                is_primary,
                stage.solver.id,
                stage.solver.name,
                stage.configuration.id,
                stage.configuration.name,
                job_space_id,
                stage.status.code.code(),
                stage.metrics.wallclock,
                stage.metrics.cpu,
                stage.metrics.user_time,
                stage.metrics.system_time,
                stage.metrics.max_vmem,
                stage.metrics.max_res_set,
            ],
        )
        .with_context(|| {
            format!("Failed to add stage {} for pair {}", stage.stage_number, pair_id)
        })?;
        Ok(())
    }

    /// All stored stages of a pair ordered by stage number
    pub fn list_for_pair(conn: &Connection, pair_id: i64) -> Result<Vec<JoblineStage>> {
        let sql = format!("{} WHERE st.pair_id = ?1 ORDER BY st.stage_number", STAGE_SELECT);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([pair_id], row_to_stage)?;

        let mut stages = Vec::new();
        for row in rows {
            stages.push(row.with_context(|| format!("Failed to read stages of pair {}", pair_id))?);
        }
        Ok(stages)
    }

    pub fn status_of(conn: &Connection, pair_id: i64, stage_number: i64) -> Result<Option<StatusCode>> {
        let code: Option<i64> = conn
            .query_row(
                "SELECT status_code FROM jobpair_stage_data WHERE pair_id = ?1 AND stage_number = ?2",
                rusqlite::params![pair_id, stage_number],
                |row| row.get(0),
            )
            .optional()?;
        Ok(code.map(StatusCode::from_code_lossy))
    }

    /// Set one stage's status if its current status is in `allowed_from`.
    /// Returns the number of rows changed (0 or 1).
    pub fn update_status(
        conn: &Connection,
        pair_id: i64,
        stage_number: i64,
        code: StatusCode,
        allowed_from: &[StatusCode],
    ) -> Result<usize> {
        let sql = format!(
            "UPDATE jobpair_stage_data SET status_code = ?1
             WHERE pair_id = ?2 AND stage_number = ?3 AND {}",
            status_guard(allowed_from)
        );
        conn.execute(&sql, rusqlite::params![code.code(), pair_id, stage_number])
            .with_context(|| {
                format!("Failed to set stage {} of pair {} to {}", stage_number, pair_id, code)
            })
    }

    /// Set the status of every stage numbered `from_stage` or higher
    /// (`-1` means every stage) whose current status is in `allowed_from`.
    pub fn update_later_statuses(
        conn: &Connection,
        pair_id: i64,
        from_stage: i64,
        code: StatusCode,
        allowed_from: &[StatusCode],
    ) -> Result<usize> {
        let sql = format!(
            "UPDATE jobpair_stage_data SET status_code = ?1
             WHERE pair_id = ?2 AND (?3 = -1 OR stage_number >= ?3) AND {}",
            status_guard(allowed_from)
        );
        conn.execute(&sql, rusqlite::params![code.code(), pair_id, from_stage])
            .with_context(|| {
                format!("Failed to set stages >= {} of pair {} to {}", from_stage, pair_id, code)
            })
    }

    pub fn update_metrics(
        conn: &Connection,
        pair_id: i64,
        stage_number: i64,
        metrics: &StageMetrics,
    ) -> Result<()> {
        let updated = conn.execute(
            "UPDATE jobpair_stage_data
             SET wallclock = ?1, cpu = ?2, user_time = ?3, system_time = ?4,
                 max_vmem = ?5, max_res_set = ?6
             WHERE pair_id = ?7 AND stage_number = ?8",
            rusqlite::params![
                metrics.wallclock,
                metrics.cpu,
                metrics.user_time,
                metrics.system_time,
                metrics.max_vmem,
                metrics.max_res_set,
                pair_id,
                stage_number,
            ],
        )?;
        if updated == 0 {
            anyhow::bail!("Stage {} of pair {} not found", stage_number, pair_id);
        }
        Ok(())
    }

    pub fn set_job_space(conn: &Connection, pair_id: i64, job_space_id: i64) -> Result<usize> {
        conn.execute(
            "UPDATE jobpair_stage_data SET job_space_id = ?1 WHERE pair_id = ?2",
            rusqlite::params![job_space_id, pair_id],
        )
        .with_context(|| format!("Failed to move stages of pair {}", pair_id))
    }

    /// Stages waiting for post-processing whose job has a processor attached
    pub fn awaiting_processing(conn: &Connection) -> Result<Vec<ProcessingTask>> {
        let mut stmt = conn.prepare(
            "SELECT st.pair_id, st.stage_number, j.post_processor_id
             FROM jobpair_stage_data st
             JOIN job_pairs p ON p.id = st.pair_id
             JOIN jobs j ON j.id = p.job_id
             WHERE st.status_code = ?1 AND j.post_processor_id IS NOT NULL
             ORDER BY st.pair_id, st.stage_number",
        )?;
        let rows = stmt.query_map([StatusCode::Processing.code()], |row| {
            Ok(ProcessingTask {
                pair_id: row.get(0)?,
                stage_number: row.get(1)?,
                processor_id: row.get(2)?,
            })
        })?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }
}

/// SQL predicate matching rows whose status is one of `allowed`
fn status_guard(allowed: &[StatusCode]) -> String {
    if allowed.is_empty() {
        return "0".to_string();
    }
    let codes: Vec<String> = allowed.iter().map(|c| c.code().to_string()).collect();
    format!("status_code IN ({})", codes.join(", "))
}

fn row_to_stage(row: &Row) -> rusqlite::Result<JoblineStage> {
    let stage_number: i64 = row.get(0)?;
    let stage_id: Option<i64> = row.get(1)?;
    let solver_id: i64 = row.get(2)?;
    let solver_name: String = row.get(3)?;
    let config_id: i64 = row.get(4)?;
    let config_name: String = row.get(5)?;
    let status = Status::new(StatusCode::from_code_lossy(row.get(6)?));

    if config_id == NO_OP_CONFIG_ID {
        let mut stage = JoblineStage::no_op(stage_number);
        stage.stage_id = stage_id;
        stage.status = status;
        return Ok(stage);
    }

    let solver_path: Option<String> = row.get(13)?;
    let solver = match solver_path {
        Some(path) => Solver { id: solver_id, name: solver_name, path: Some(path) },
        None => {
            log::warn!("Solver {} ({}) no longer exists; using stand-in", solver_id, solver_name);
            Solver::stand_in(solver_id, solver_name)
        }
    };

    let catalog_config: Option<i64> = row.get(14)?;
    let configuration = match catalog_config {
        Some(id) => Configuration { id, solver_id: row.get(15)?, name: config_name },
        None => {
            log::warn!("Configuration {} ({}) no longer exists; using stand-in", config_id, config_name);
            Configuration::stand_in(config_id, config_name)
        }
    };

    Ok(JoblineStage {
        stage_number,
        stage_id,
        no_op: false,
        solver,
        configuration,
        metrics: StageMetrics {
            wallclock: row.get(7)?,
            cpu: row.get(8)?,
            user_time: row.get(9)?,
            system_time: row.get(10)?,
            max_vmem: row.get(11)?,
            max_res_set: row.get(12)?,
        },
        status,
        attributes: Default::default(),
    })
}
