// Shared setup for integration tests: a scratch directory with an rc file,
// a database seeded through the library and a processor that can be run.

#![allow(dead_code)]

use assert_cmd::Command;
use jobline::config::Config;
use jobline::models::{Benchmark, Configuration, JobPair, JoblineStage, Solver, StatusCode};
use jobline::paths::PathResolver;
use jobline::repo::CatalogRepo;
use jobline::store::{PairStore, SqliteStore};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct Workspace {
    pub temp: TempDir,
    pub rc: PathBuf,
    pub config: Config,
    pub store: SqliteStore,
    pub job_id: i64,
    pub solver: Solver,
    pub solver_config: Configuration,
    pub bench: Benchmark,
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_rc("")
    }

    /// `extra_rc` lines are appended to the generated rc file
    pub fn with_rc(extra_rc: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let rc = temp.path().join("rc");
        fs::write(
            &rc,
            format!(
                "backend.submit_command=echo Your job 4242 has been submitted\n\
                 backend.kill_command=true\n\
                 {}",
                extra_rc
            ),
        )
        .unwrap();
        let config = Config::from_file(&rc).unwrap();

        let bench_path = temp.path().join("benchmarks").join("php-5-4.cnf");
        fs::create_dir_all(bench_path.parent().unwrap()).unwrap();
        fs::write(&bench_path, "p cnf 20 45\n").unwrap();

        let store = SqliteStore::open(&config).unwrap();
        let (job_id, solver, solver_config, bench) = {
            let conn = store.connection();
            let job = CatalogRepo::add_job(&conn, "sat-comp", None).unwrap();
            let solver = CatalogRepo::add_solver(&conn, "minisat", "/solvers/minisat").unwrap();
            let solver_config = CatalogRepo::add_configuration(&conn, solver.id, "default").unwrap();
            let bench = CatalogRepo::add_benchmark(
                &conn,
                "php-5-4.cnf",
                Some(bench_path.to_str().unwrap()),
            )
            .unwrap();
            (job.id, solver, solver_config, bench)
        };

        Self { temp, rc, config, store, job_id, solver, solver_config, bench }
    }

    /// Unsaved pair of the workspace job with `stages` stages
    pub fn new_pair(&self, stages: i64) -> JobPair {
        let mut pair = JobPair::new(self.job_id, self.bench.clone(), "sat-comp/main", 1);
        for n in 1..=stages {
            pair.stages.push(JoblineStage::new(n, self.solver.clone(), self.solver_config.clone()));
        }
        pair
    }

    pub fn add_pair(&self, stages: i64) -> i64 {
        let mut pairs = vec![self.new_pair(stages)];
        self.store.add_pairs(&mut pairs).unwrap();
        pairs[0].id.unwrap()
    }

    pub fn force_status(&self, pair_id: i64, stage: i64, code: StatusCode) {
        assert!(self
            .store
            .update_stage_status(pair_id, stage, code, &StatusCode::ALL)
            .unwrap());
    }

    /// Write a stage's output where the resolver expects it
    pub fn write_output(&self, pair_id: i64, stage: i64, text: &str) -> PathBuf {
        let pair = self.store.get_pair(pair_id).unwrap().unwrap();
        let path = PathResolver::from_config(&self.config)
            .stage_output_path(&pair, stage)
            .unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, text).unwrap();
        path
    }

    pub fn set_attributes(&self, pair_id: i64, stage: i64, attrs: &[(&str, &str)]) {
        self.force_status(pair_id, stage, StatusCode::Processing);
        let attrs = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.store.commit_post_processing(pair_id, stage, &attrs).unwrap();
    }

    /// Processor whose run script is `script`; returns its id
    #[cfg(unix)]
    pub fn add_processor(&self, name: &str, script: &str) -> i64 {
        use std::os::unix::fs::PermissionsExt;

        let dir = self.temp.path().join("processors").join(name);
        fs::create_dir_all(&dir).unwrap();
        let run_script = dir.join(&self.config.processor_run_script);
        fs::write(&run_script, script).unwrap();
        fs::set_permissions(&run_script, fs::Permissions::from_mode(0o755)).unwrap();

        let conn = self.store.connection();
        CatalogRepo::add_processor(&conn, name, None, &dir).unwrap().id
    }

    /// A second job that runs `processor_id` over its output
    pub fn add_job_with_processor(&self, processor_id: i64) -> i64 {
        let conn = self.store.connection();
        CatalogRepo::add_job(&conn, "with-processor", Some(processor_id))
            .unwrap()
            .id
    }

    /// The jobline binary pointed at this workspace
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("jobline").unwrap();
        cmd.env("JOBLINE_RC", &self.rc).env_remove("RUST_LOG");
        cmd
    }
}
