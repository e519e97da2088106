use crate::models::{Configuration, Solver, Status, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resource usage reported for one stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMetrics {
    pub wallclock: f64,
    pub cpu: f64,
    pub user_time: f64,
    pub system_time: f64,
    pub max_vmem: f64,
    pub max_res_set: f64,
}

/// One step of a job pair's solver pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoblineStage {
    /// 1-based, fixed at creation
    pub stage_number: i64,
    /// `None` for legacy single-stage pairs
    pub stage_id: Option<i64>,
    pub no_op: bool,
    pub solver: Solver,
    pub configuration: Configuration,
    pub metrics: StageMetrics,
    pub status: Status,
    /// Only populated after post-processing
    pub attributes: HashMap<String, String>,
}

impl JoblineStage {
    pub fn new(stage_number: i64, solver: Solver, configuration: Configuration) -> Self {
        Self {
            stage_number,
            stage_id: None,
            no_op: false,
            solver,
            configuration,
            metrics: StageMetrics::default(),
            status: Status::new(StatusCode::PendingSubmit),
            attributes: HashMap::new(),
        }
    }

    /// Placeholder stage that contributes nothing to the pipeline
    pub fn no_op(stage_number: i64) -> Self {
        Self {
            no_op: true,
            ..Self::new(stage_number, Solver::default(), Configuration::default())
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}
