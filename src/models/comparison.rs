use crate::models::{Benchmark, JobPair};
use serde::{Deserialize, Serialize};

/// Two pairs of the same job run on the same benchmark, compared side by side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverComparison {
    pub first: JobPair,
    pub second: JobPair,
    pub stage_number: i64,
}

impl SolverComparison {
    pub fn new(first: JobPair, second: JobPair, stage_number: i64) -> Self {
        Self { first, second, stage_number }
    }

    pub fn benchmark(&self) -> &Benchmark {
        &self.first.bench
    }
}
