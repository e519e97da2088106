use crate::config::Config;
use crate::models::{Benchmark, Configuration, JobPair, JoblineStage, Solver, StatusCode};
use crate::paths::PathResolver;
use crate::processing::PostProcessor;
use crate::repo::CatalogRepo;
use crate::store::{PairStore, SqliteStore};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;

/// A job with a post-processor, backed by an in-memory store and a scratch directory
pub(crate) struct Fixture {
    pub store: SqliteStore,
    pub config: Config,
    pub processor_id: i64,
    pub processor_dir: PathBuf,
    job_id: i64,
    solver: Solver,
    solver_config: Configuration,
    bench: Benchmark,
    _temp: TempDir,
}

impl Fixture {
    /// `script` becomes the processor's run script
    pub fn new(script: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let config = Config::with_base_dir(temp.path());

        let processor_dir = temp.path().join("processors").join("checker");
        fs::create_dir_all(&processor_dir).unwrap();
        let run_script = processor_dir.join(&config.processor_run_script);
        fs::write(&run_script, script).unwrap();
        fs::set_permissions(&run_script, fs::Permissions::from_mode(0o755)).unwrap();

        let bench_path = temp.path().join("benchmarks").join("b.cnf");
        fs::create_dir_all(bench_path.parent().unwrap()).unwrap();
        fs::write(&bench_path, "p cnf 1 1").unwrap();

        let store = SqliteStore::in_memory().unwrap();
        let (processor_id, job_id, solver, solver_config, bench) = {
            let conn = store.connection();
            let processor =
                CatalogRepo::add_processor(&conn, "checker", None, &processor_dir).unwrap();
            let job = CatalogRepo::add_job(&conn, "job", Some(processor.id)).unwrap();
            let solver = CatalogRepo::add_solver(&conn, "minisat", "/solvers/minisat").unwrap();
            let solver_config = CatalogRepo::add_configuration(&conn, solver.id, "default").unwrap();
            let bench = CatalogRepo::add_benchmark(
                &conn,
                "b.cnf",
                Some(bench_path.to_str().unwrap()),
            )
            .unwrap();
            (processor.id, job.id, solver, solver_config, bench)
        };

        Self {
            store,
            config,
            processor_id,
            processor_dir,
            job_id,
            solver,
            solver_config,
            bench,
            _temp: temp,
        }
    }

    pub fn executor(&self) -> PostProcessor<'_, SqliteStore> {
        PostProcessor::new(&self.store, &self.config)
    }

    pub fn add_pair(&self) -> i64 {
        let mut pair = JobPair::new(self.job_id, self.bench.clone(), "root", 1);
        pair.stages.push(JoblineStage::new(1, self.solver.clone(), self.solver_config.clone()));
        let mut pairs = vec![pair];
        self.store.add_pairs(&mut pairs).unwrap();
        pairs[0].id.unwrap()
    }

    pub fn add_processing_pair_without_output(&self) -> i64 {
        let pair_id = self.add_pair();
        assert!(self
            .store
            .update_stage_status(pair_id, 1, StatusCode::Processing, &StatusCode::ALL)
            .unwrap());
        pair_id
    }

    /// A pair whose single stage finished running and produced `output`
    pub fn add_processing_pair(&self, output: &str) -> i64 {
        let pair_id = self.add_processing_pair_without_output();
        let pair = self.store.get_pair(pair_id).unwrap().unwrap();
        let path = PathResolver::from_config(&self.config)
            .stage_output_path(&pair, 1)
            .unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, output).unwrap();
        pair_id
    }
}
