use crate::config::Config;
use crate::models::{ProcessingTask, Processor, StatusCode};
use crate::paths::PathResolver;
use crate::properties;
use crate::store::PairStore;
use crate::utils::fs::copy_dir_all;
use anyhow::Context;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("pair {0} not found")]
    PairNotFound(i64),
    #[error("stage {stage_number} of pair {pair_id} not found")]
    StageNotFound { pair_id: i64, stage_number: i64 },
    #[error("stage {stage_number} of pair {pair_id} is {status}, not awaiting post-processing")]
    NotProcessing {
        pair_id: i64,
        stage_number: i64,
        status: StatusCode,
    },
    #[error("processor {0} not found")]
    ProcessorNotFound(i64),
    #[error("processor run script missing: {0}")]
    MissingRunScript(PathBuf),
    #[error("stage output missing: {0}")]
    MissingOutput(PathBuf),
    #[error("benchmark file for pair {0} is not available")]
    MissingBenchmark(i64),
    #[error("failed to create sandbox: {0}")]
    Sandbox(#[source] std::io::Error),
    #[error("failed to start {script}: {source}")]
    Spawn {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for processor: {0}")]
    Wait(#[source] std::io::Error),
    #[error("processor timed out after {0:?}")]
    Timeout(Duration),
    #[error("processor exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("processor output had no parseable lines ({dropped} dropped)")]
    Malformed { dropped: usize },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Runs a processor over one stage's output and commits what it reports
pub struct PostProcessor<'a, S: PairStore> {
    store: &'a S,
    config: &'a Config,
    paths: PathResolver,
}

impl<'a, S: PairStore> PostProcessor<'a, S> {
    pub fn new(store: &'a S, config: &'a Config) -> Self {
        Self {
            store,
            config,
            paths: PathResolver::from_config(config),
        }
    }

    pub fn process_task(&self, task: &ProcessingTask) -> Result<HashMap<String, String>, ProcessingError> {
        self.process(task.pair_id, task.stage_number, task.processor_id)
    }

    /// Extract attributes for one stage and commit them together with the
    /// complete status. Nothing is written unless the processor succeeds.
    pub fn process(
        &self,
        pair_id: i64,
        stage_number: i64,
        processor_id: i64,
    ) -> Result<HashMap<String, String>, ProcessingError> {
        let pair = self
            .store
            .get_pair(pair_id)?
            .ok_or(ProcessingError::PairNotFound(pair_id))?;
        let stage = pair
            .stage(stage_number)
            .ok_or(ProcessingError::StageNotFound { pair_id, stage_number })?;
        if !stage.status.code.is_processing() {
            return Err(ProcessingError::NotProcessing {
                pair_id,
                stage_number,
                status: stage.status.code,
            });
        }

        let processor = self
            .store
            .get_processor(processor_id)?
            .ok_or(ProcessingError::ProcessorNotFound(processor_id))?;
        let script = processor.run_script(&self.config.processor_run_script);
        if !script.is_file() {
            return Err(ProcessingError::MissingRunScript(script));
        }

        let output = self.paths.stage_output_path(&pair, stage_number)?;
        if !output.is_file() {
            return Err(ProcessingError::MissingOutput(output));
        }
        let bench = pair
            .bench
            .path
            .as_deref()
            .map(PathBuf::from)
            .filter(|p| p.is_file())
            .ok_or(ProcessingError::MissingBenchmark(pair_id))?;

        let attributes = self.run_in_sandbox(&processor, &output, &bench)?;
        self.store
            .commit_post_processing(pair_id, stage_number, &attributes)?;
        log::info!(
            "Post-processed pair {} stage {} with {} ({} attributes)",
            pair_id,
            stage_number,
            processor.name,
            attributes.len()
        );
        Ok(attributes)
    }

    /// Copy everything into a private directory, run the processor there and
    /// parse what it prints. The sandbox is removed when this returns.
    fn run_in_sandbox(
        &self,
        processor: &Processor,
        output: &Path,
        bench: &Path,
    ) -> Result<HashMap<String, String>, ProcessingError> {
        std::fs::create_dir_all(&self.config.sandbox_dir).map_err(ProcessingError::Sandbox)?;
        let sandbox_root =
            std::fs::canonicalize(&self.config.sandbox_dir).map_err(ProcessingError::Sandbox)?;
        let sandbox = tempfile::Builder::new()
            .prefix("sandbox-")
            .tempdir_in(&sandbox_root)
            .map_err(ProcessingError::Sandbox)?;

        let work_dir = sandbox.path().join(processor.dir_name());
        copy_dir_all(&processor.path, &work_dir).context("Failed to copy processor into sandbox")?;
        let output_copy = copy_into(output, &sandbox.path().join("output"))?;
        let bench_copy = copy_into(bench, &sandbox.path().join("benchmark"))?;

        let script = work_dir.join(&self.config.processor_run_script);
        let mut cmd = Command::new(&script);
        cmd.arg(&output_copy)
            .arg(&bench_copy)
            .current_dir(&work_dir)
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        log::debug!("Running {} in {}", script.display(), work_dir.display());
        let child = cmd
            .spawn()
            .map_err(|source| ProcessingError::Spawn { script: script.clone(), source })?;
        let (status, stdout, stderr) = wait_with_timeout(child, self.config.processor_timeout)?;

        if !status.success() {
            return Err(ProcessingError::Failed {
                status,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        let parsed = properties::parse_bytes(&stdout);
        if parsed.is_malformed() {
            return Err(ProcessingError::Malformed { dropped: parsed.dropped_lines });
        }
        if parsed.dropped_lines > 0 {
            log::warn!("Dropped {} unparseable processor output line(s)", parsed.dropped_lines);
        }
        Ok(parsed.values)
    }
}

/// Copy `file` into `dir`, keeping its name. Returns the absolute copy path.
fn copy_into(file: &Path, dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    let name = file
        .file_name()
        .with_context(|| format!("Not a file path: {}", file.display()))?;
    let target = dir.join(name);
    std::fs::copy(file, &target)
        .with_context(|| format!("Failed to copy {} into sandbox", file.display()))?;
    Ok(target)
}

fn read_pipe<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf) {
            log::warn!("Failed to read processor output: {}", e);
        }
    }
    buf
}

/// Kill whatever is still running in the processor's process group. Once
/// the group is gone the output pipes close and the reader threads finish.
fn kill_process_group(pid: u32) {
    #[cfg(unix)]
    {
        // Safety: kill(2) takes no pointers; a negative pid addresses the
        // process group the processor was started as leader of.
        let ret = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                log::warn!("Failed to kill process group {}: {}", pid, err);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Wait for the child, killing its process group once `timeout` elapses.
/// Both pipes are drained on their own threads so a chatty processor cannot
/// block.
fn wait_with_timeout(
    mut child: Child,
    timeout: Option<Duration>,
) -> Result<(ExitStatus, Vec<u8>, Vec<u8>), ProcessingError> {
    let pid = child.id();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_reader = thread::spawn(move || read_pipe(stdout));
    let stderr_reader = thread::spawn(move || read_pipe(stderr));

    let waited = match timeout {
        None => child.wait().map_err(ProcessingError::Wait),
        Some(limit) => {
            let started = Instant::now();
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => break Ok(status),
                    Ok(None) if started.elapsed() >= limit => {
                        kill_process_group(pid);
                        if let Err(e) = child.kill() {
                            log::debug!("Timed out processor already gone: {}", e);
                        }
                        let _ = child.wait();
                        break Err(ProcessingError::Timeout(limit));
                    }
                    Ok(None) => thread::sleep(POLL_INTERVAL),
                    Err(e) => break Err(ProcessingError::Wait(e)),
                }
            }
        }
    };

    // Background children of the run script die with the sandbox
    kill_process_group(pid);
    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    Ok((waited?, stdout, stderr))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::processing::test_support::Fixture;
    use std::time::Duration;

    #[test]
    fn test_result_is_committed_with_complete_status() {
        let f = Fixture::new("#!/bin/sh\necho result=sat\n");
        let pair_id = f.add_processing_pair("s SATISFIABLE\n");

        let attrs = f.executor().process(pair_id, 1, f.processor_id).unwrap();
        assert_eq!(attrs.get("result").map(String::as_str), Some("sat"));

        let stored = f.store.get_pair_attributes(pair_id).unwrap();
        assert_eq!(stored[&1]["result"], "sat");
        assert_eq!(f.store.get_stage_status(pair_id, 1).unwrap(), Some(StatusCode::Complete));
        assert_eq!(
            f.store.get_pair(pair_id).unwrap().unwrap().status.code,
            StatusCode::Complete
        );
    }

    #[test]
    fn test_processor_sees_copies_and_clean_environment() {
        let f = Fixture::new(
            "#!/bin/sh\n\
             echo \"out=$(cat \"$1\")\"\n\
             echo \"bench=$(cat \"$2\")\"\n\
             echo \"home=${HOME:-unset}\"\n\
             echo \"cwd=$(basename \"$(pwd)\")\"\n",
        );
        let pair_id = f.add_processing_pair("solver output");

        let attrs = f.executor().process(pair_id, 1, f.processor_id).unwrap();
        assert_eq!(attrs["out"], "solver output");
        assert_eq!(attrs["bench"], "p cnf 1 1");
        assert_eq!(attrs["home"], "unset");
        assert_eq!(attrs["cwd"], "checker");
        // sandbox is gone once processing finishes
        assert_eq!(std::fs::read_dir(&f.config.sandbox_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_non_zero_exit_leaves_stage_unchanged() {
        let f = Fixture::new("#!/bin/sh\necho result=sat\necho broken >&2\nexit 1\n");
        let pair_id = f.add_processing_pair("output");

        let err = f.executor().process(pair_id, 1, f.processor_id).unwrap_err();
        match err {
            ProcessingError::Failed { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected error: {}", other),
        }
        assert!(f.store.get_pair_attributes(pair_id).unwrap().is_empty());
        assert!(f
            .store
            .get_stage_status(pair_id, 1)
            .unwrap()
            .unwrap()
            .is_processing());
    }

    #[test]
    fn test_empty_output_completes_with_no_attributes() {
        let f = Fixture::new("#!/bin/sh\nexit 0\n");
        let pair_id = f.add_processing_pair("output");

        let attrs = f.executor().process(pair_id, 1, f.processor_id).unwrap();
        assert!(attrs.is_empty());
        assert_eq!(f.store.get_stage_status(pair_id, 1).unwrap(), Some(StatusCode::Complete));
    }

    #[test]
    fn test_malformed_output_is_rejected() {
        let f = Fixture::new("#!/bin/sh\necho '=nokey'\n");
        let pair_id = f.add_processing_pair("output");

        let err = f.executor().process(pair_id, 1, f.processor_id).unwrap_err();
        assert!(matches!(err, ProcessingError::Malformed { dropped: 1 }));
        assert_eq!(f.store.get_stage_status(pair_id, 1).unwrap(), Some(StatusCode::Processing));
    }

    #[test]
    fn test_missing_output_aborts_before_running() {
        let f = Fixture::new("#!/bin/sh\necho result=sat\n");
        let pair_id = f.add_processing_pair_without_output();

        let err = f.executor().process(pair_id, 1, f.processor_id).unwrap_err();
        assert!(matches!(err, ProcessingError::MissingOutput(_)));
        assert!(!f.config.sandbox_dir.exists() || std::fs::read_dir(&f.config.sandbox_dir).unwrap().count() == 0);
    }

    #[test]
    fn test_stage_must_be_processing() {
        let f = Fixture::new("#!/bin/sh\necho result=sat\n");
        let pair_id = f.add_processing_pair("output");
        f.store
            .update_stage_status(pair_id, 1, StatusCode::Complete, &StatusCode::ALL)
            .unwrap();

        let err = f.executor().process(pair_id, 1, f.processor_id).unwrap_err();
        assert!(matches!(err, ProcessingError::NotProcessing { .. }));
    }

    #[test]
    fn test_missing_processor_and_run_script() {
        let f = Fixture::new("#!/bin/sh\necho result=sat\n");
        let pair_id = f.add_processing_pair("output");

        let err = f.executor().process(pair_id, 1, 9999).unwrap_err();
        assert!(matches!(err, ProcessingError::ProcessorNotFound(9999)));

        std::fs::remove_file(f.processor_dir.join("process")).unwrap();
        let err = f.executor().process(pair_id, 1, f.processor_id).unwrap_err();
        assert!(matches!(err, ProcessingError::MissingRunScript(_)));
    }

    #[test]
    fn test_timeout_kills_background_children() {
        let marker_dir = tempfile::TempDir::new().unwrap();
        let marker = marker_dir.path().join("late");
        let mut f = Fixture::new(&format!(
            "#!/bin/sh
(sleep 1; echo late > '{}') &
sleep 10
",
            marker.display()
        ));
        f.config.processor_timeout = Some(Duration::from_millis(200));
        let pair_id = f.add_processing_pair("output");

        let started = Instant::now();
        let err = f.executor().process(pair_id, 1, f.processor_id).unwrap_err();
        assert!(matches!(err, ProcessingError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));

        std::thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists(), "background child outlived the timeout");
    }

    #[test]
    fn test_lingering_background_child_does_not_block() {
        let f = Fixture::new("#!/bin/sh
sleep 30 &
echo result=sat
");
        let pair_id = f.add_processing_pair("output");

        let started = Instant::now();
        let attrs = f.executor().process(pair_id, 1, f.processor_id).unwrap();
        assert_eq!(attrs.get("result").map(String::as_str), Some("sat"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_hung_processor_times_out() {
        let mut f = Fixture::new("#!/bin/sh\nexec sleep 10\n");
        f.config.processor_timeout = Some(Duration::from_millis(200));
        let pair_id = f.add_processing_pair("output");

        let started = Instant::now();
        let err = f.executor().process(pair_id, 1, f.processor_id).unwrap_err();
        assert!(matches!(err, ProcessingError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(f.store.get_stage_status(pair_id, 1).unwrap(), Some(StatusCode::Processing));
    }
}
