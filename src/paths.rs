//! On-disk locations of pair output and logs
//!
//! Output written by older versions used different directory layouts. The
//! resolver checks them in a fixed order and copies the older nested layout
//! forward the first time it is found.

use crate::config::Config;
use crate::models::JobPair;
use crate::utils::fs::{copy_path_atomic, read_lines_limited};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Separator between solver and configuration names in the current layout
const SOLVER_CONFIG_SEPARATOR: &str = "___";

#[derive(Debug, Clone)]
pub struct PathResolver {
    output_root: PathBuf,
    log_root: PathBuf,
}

impl PathResolver {
    pub fn new(output_root: impl Into<PathBuf>, log_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            log_root: log_root.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.job_output_dir, &config.job_log_dir)
    }

    pub fn job_dir(&self, job_id: i64) -> PathBuf {
        self.output_root.join(job_id.to_string())
    }

    /// `<job dir>/<space segments>/<solver>___<config>/<benchmark>`
    pub fn current_bench_dir(&self, pair: &JobPair) -> Result<PathBuf> {
        let (solver, config) = primary_names(pair)?;
        Ok(self
            .space_dir(pair)
            .join(format!("{}{}{}", solver, SOLVER_CONFIG_SEPARATOR, config))
            .join(&pair.bench.name))
    }

    /// `<job dir>/<space segments>/<solver>/<config>/<benchmark>`
    fn nested_bench_dir(&self, pair: &JobPair) -> Result<PathBuf> {
        let (solver, config) = primary_names(pair)?;
        Ok(self.space_dir(pair).join(solver).join(config).join(&pair.bench.name))
    }

    fn space_dir(&self, pair: &JobPair) -> PathBuf {
        pair.path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.job_dir(pair.job_id), |dir, segment| dir.join(segment))
    }

    /// Top-level output location of a pair: a directory for pipeline pairs,
    /// a single file for pairs written before stages existed
    pub fn pair_path(&self, pair: &JobPair) -> Result<PathBuf> {
        let pair_id = pair.id.context("Pair has not been saved")?;
        let current = self.current_bench_dir(pair)?;
        let nested = self.nested_bench_dir(pair)?;

        let bench_location = if current.exists() {
            current
        } else if nested.exists() {
            log::warn!(
                "Pair {} output found in legacy layout at {}; copying to {}",
                pair_id,
                nested.display(),
                current.display()
            );
            // A failed copy leaves no current-layout directory behind, so the
            // next lookup still finds the legacy output
            if let Err(e) = copy_path_atomic(&nested, &current) {
                log::warn!("Failed to migrate legacy output for pair {}: {:#}", pair_id, e);
            }
            nested
        } else {
            current
        };

        if bench_location.is_file() {
            return Ok(bench_location);
        }
        let flat = bench_location.join(format!("{}.txt", pair_id));
        if flat.is_file() {
            return Ok(flat);
        }
        Ok(bench_location.join(pair_id.to_string()))
    }

    /// Output file of one stage. A legacy single-file pair uses the same file
    /// for every stage.
    pub fn stage_output_path(&self, pair: &JobPair, stage_number: i64) -> Result<PathBuf> {
        let pair_path = self.pair_path(pair)?;
        if pair_path.is_file() {
            return Ok(pair_path);
        }
        Ok(pair_path.join(format!("{}.txt", stage_number)))
    }

    /// `<log root>/<job id>/<job space id>/<pair id>.txt`
    pub fn log_path(&self, pair: &JobPair) -> Result<PathBuf> {
        let pair_id = pair.id.context("Pair has not been saved")?;
        Ok(self
            .log_root
            .join(pair.job_id.to_string())
            .join(pair.job_space_id.to_string())
            .join(format!("{}.txt", pair_id)))
    }

    /// Contents of a stage's output, or None if it was never written
    pub fn read_stdout(
        &self,
        pair: &JobPair,
        stage_number: i64,
        line_limit: Option<usize>,
    ) -> Result<Option<String>> {
        let path = self.stage_output_path(pair, stage_number)?;
        read_if_present(&path, line_limit)
    }

    /// Contents of a pair's execution log, or None if there is none
    pub fn read_job_log(&self, pair: &JobPair) -> Result<Option<String>> {
        let path = self.log_path(pair)?;
        read_if_present(&path, None)
    }
}

fn primary_names(pair: &JobPair) -> Result<(&str, &str)> {
    let stage = pair
        .primary_stage()
        .with_context(|| format!("Pair has no primary stage {}", pair.primary_stage_number))?;
    Ok((&stage.solver.name, &stage.configuration.name))
}

fn read_if_present(path: &Path, line_limit: Option<usize>) -> Result<Option<String>> {
    if !path.is_file() {
        log::debug!("No file at {}", path.display());
        return Ok(None);
    }
    read_lines_limited(path, line_limit).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Benchmark, Configuration, JoblineStage, Solver};
    use std::fs;
    use tempfile::TempDir;

    fn pair() -> JobPair {
        let mut pair = JobPair::new(
            3,
            Benchmark { id: 1, name: "b1.cnf".to_string(), path: None },
            "root/sub",
            11,
        );
        pair.id = Some(42);
        pair.stages.push(JoblineStage::new(
            1,
            Solver::stand_in(1, "minisat".to_string()),
            Configuration::stand_in(1, "default".to_string()),
        ));
        pair
    }

    fn resolver(temp: &TempDir) -> PathResolver {
        PathResolver::new(temp.path().join("out"), temp.path().join("logs"))
    }

    #[test]
    fn test_new_pair_gets_modern_directory() {
        let temp = TempDir::new().unwrap();
        let r = resolver(&temp);
        let expected = temp.path().join("out/3/root/sub/minisat___default/b1.cnf/42");
        assert_eq!(r.pair_path(&pair()).unwrap(), expected);
        assert_eq!(r.stage_output_path(&pair(), 2).unwrap(), expected.join("2.txt"));
    }

    #[test]
    fn test_flat_pair_file_serves_every_stage() {
        let temp = TempDir::new().unwrap();
        let r = resolver(&temp);
        let dir = temp.path().join("out/3/root/sub/minisat___default/b1.cnf");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("42.txt"), "s SATISFIABLE\n").unwrap();

        assert_eq!(r.stage_output_path(&pair(), 1).unwrap(), dir.join("42.txt"));
        assert_eq!(r.stage_output_path(&pair(), 3).unwrap(), dir.join("42.txt"));
    }

    #[test]
    fn test_bench_location_file_is_the_output() {
        let temp = TempDir::new().unwrap();
        let r = resolver(&temp);
        let file = temp.path().join("out/3/root/sub/minisat___default/b1.cnf");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "old").unwrap();
        assert_eq!(r.pair_path(&pair()).unwrap(), file);
    }

    #[test]
    fn test_nested_layout_is_copied_forward() {
        let temp = TempDir::new().unwrap();
        let r = resolver(&temp);
        let legacy = temp.path().join("out/3/root/sub/minisat/default/b1.cnf");
        fs::create_dir_all(&legacy).unwrap();
        fs::write(legacy.join("42.txt"), "legacy output").unwrap();

        let first = r.pair_path(&pair()).unwrap();
        assert_eq!(first, legacy.join("42.txt"));
        assert!(legacy.join("42.txt").exists());

        let current = temp.path().join("out/3/root/sub/minisat___default/b1.cnf/42.txt");
        assert_eq!(fs::read_to_string(&current).unwrap(), "legacy output");

        let second = r.pair_path(&pair()).unwrap();
        assert_eq!(second, current);
        assert_eq!(r.pair_path(&pair()).unwrap(), current);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_migration_keeps_legacy_output_reachable() {
        let temp = TempDir::new().unwrap();
        let r = resolver(&temp);
        let legacy = temp.path().join("out/3/root/sub/minisat/default/b1.cnf");
        fs::create_dir_all(&legacy).unwrap();
        fs::write(legacy.join("42.txt"), "legacy output").unwrap();
        std::os::unix::fs::symlink(temp.path().join("gone"), legacy.join("dangling")).unwrap();

        let current = temp.path().join("out/3/root/sub/minisat___default/b1.cnf");
        for _ in 0..2 {
            assert_eq!(r.pair_path(&pair()).unwrap(), legacy.join("42.txt"));
            assert!(!current.exists());
        }
        assert_eq!(
            r.read_stdout(&pair(), 1, None).unwrap().as_deref(),
            Some("legacy output")
        );
        assert_eq!(fs::read_dir(current.parent().unwrap()).unwrap().count(), 0);
    }

    #[test]
    fn test_log_path_and_reads() {
        let temp = TempDir::new().unwrap();
        let r = resolver(&temp);
        let log = r.log_path(&pair()).unwrap();
        assert_eq!(log, temp.path().join("logs/3/11/42.txt"));
        assert_eq!(r.read_job_log(&pair()).unwrap(), None);

        fs::create_dir_all(log.parent().unwrap()).unwrap();
        fs::write(&log, "started\nfinished\n").unwrap();
        assert_eq!(r.read_job_log(&pair()).unwrap().as_deref(), Some("started\nfinished\n"));

        let out = r.stage_output_path(&pair(), 1).unwrap();
        fs::create_dir_all(out.parent().unwrap()).unwrap();
        fs::write(&out, "a\nb\nc\n").unwrap();
        assert_eq!(r.read_stdout(&pair(), 1, Some(1)).unwrap().as_deref(), Some("a\n"));
    }

    #[test]
    fn test_unsaved_pair_is_an_error() {
        let temp = TempDir::new().unwrap();
        let mut unsaved = pair();
        unsaved.id = None;
        assert!(resolver(&temp).pair_path(&unsaved).is_err());
    }
}
