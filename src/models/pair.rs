use crate::models::{Benchmark, JoblineStage, Status, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural problems that make a pair unfit for persistence
#[derive(Debug, Error, PartialEq)]
pub enum PairShapeError {
    #[error("pair has no stages")]
    NoStages,
    #[error("stage numbers must be 1-based and strictly increasing (found {found} after {previous})")]
    StageOrder { previous: i64, found: i64 },
    #[error("primary stage {0} does not reference an existing stage")]
    MissingPrimary(i64),
    #[error("primary stage {0} is a no-op stage")]
    NoOpPrimary(i64),
}

/// Job pair: one benchmark run through one (possibly multi-stage) solver pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPair {
    pub id: Option<i64>,
    pub job_id: i64,
    pub bench: Benchmark,
    pub stages: Vec<JoblineStage>,
    pub primary_stage_number: i64,
    /// Slash-delimited logical space path
    pub path: String,
    pub job_space_id: i64,
    pub job_space_name: Option<String>,
    pub backend_handle: Option<i64>,
    pub queue_submit_ts: Option<i64>,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    pub exit_status: Option<i64>,
    pub sandbox_num: Option<i64>,
    pub status: Status,
    /// Additional benchmark inputs, in input-number order (first = input 1)
    pub bench_inputs: Vec<i64>,
}

impl JobPair {
    /// Create a new single-space pair in the pending-submit state
    pub fn new(job_id: i64, bench: Benchmark, path: &str, job_space_id: i64) -> Self {
        Self {
            id: None,
            job_id,
            bench,
            stages: Vec::new(),
            primary_stage_number: 1,
            path: path.to_string(),
            job_space_id,
            job_space_name: None,
            backend_handle: None,
            queue_submit_ts: None,
            start_ts: None,
            end_ts: None,
            exit_status: None,
            sandbox_num: None,
            status: Status::new(StatusCode::PendingSubmit),
            bench_inputs: Vec::new(),
        }
    }

    pub fn stage(&self, stage_number: i64) -> Option<&JoblineStage> {
        self.stages.iter().find(|s| s.stage_number == stage_number)
    }

    pub fn primary_stage(&self) -> Option<&JoblineStage> {
        self.stage(self.primary_stage_number)
    }

    pub fn is_primary(&self, stage_number: i64) -> bool {
        self.primary_stage_number == stage_number
    }

    /// Stages that actually run (no-op stages are skipped by persistence and dispatch)
    pub fn runnable_stages(&self) -> impl Iterator<Item = &JoblineStage> {
        self.stages.iter().filter(|s| !s.no_op)
    }

    /// Check the stage list before the pair is persisted
    pub fn validate(&self) -> Result<(), PairShapeError> {
        if self.stages.is_empty() {
            return Err(PairShapeError::NoStages);
        }
        let mut previous = 0;
        for stage in &self.stages {
            if stage.stage_number <= previous {
                return Err(PairShapeError::StageOrder {
                    previous,
                    found: stage.stage_number,
                });
            }
            previous = stage.stage_number;
        }
        match self.primary_stage() {
            None => Err(PairShapeError::MissingPrimary(self.primary_stage_number)),
            Some(stage) if stage.no_op => Err(PairShapeError::NoOpPrimary(self.primary_stage_number)),
            Some(_) => Ok(()),
        }
    }
}
