use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Benchmark reference. Owned by the benchmark catalog; a pair only points at it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub id: i64,
    pub name: String,
    pub path: Option<String>,
}

/// Solver reference
///
/// `path` is `None` for stand-ins synthesized when the solver has been
/// deleted from the catalog but pairs still point at it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Solver {
    pub id: i64,
    pub name: String,
    pub path: Option<String>,
}

impl Solver {
    /// Stand-in for a solver that no longer exists, carrying only id and name
    pub fn stand_in(id: i64, name: String) -> Self {
        Self { id, name, path: None }
    }

    pub fn is_stand_in(&self) -> bool {
        self.path.is_none()
    }
}

/// Solver configuration reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub id: i64,
    pub solver_id: Option<i64>,
    pub name: String,
}

impl Configuration {
    /// Stand-in for a deleted configuration
    pub fn stand_in(id: i64, name: String) -> Self {
        Self { id, solver_id: None, name }
    }

    pub fn is_stand_in(&self) -> bool {
        self.solver_id.is_none()
    }
}

/// Result extraction program
///
/// `path` is the directory holding the executable and its run script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Processor {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub path: PathBuf,
}

impl Processor {
    pub fn run_script(&self, script_name: &str) -> PathBuf {
        self.path.join(script_name)
    }

    pub fn dir_name(&self) -> &Path {
        self.path
            .file_name()
            .map(Path::new)
            .unwrap_or_else(|| Path::new("processor"))
    }
}

/// Job header: only what the pair subsystem needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub post_processor_id: Option<i64>,
    pub created_ts: i64,
}

/// One unit of post-processing work: a stage of a pair plus the processor to run on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessingTask {
    pub pair_id: i64,
    pub stage_number: i64,
    pub processor_id: i64,
}
