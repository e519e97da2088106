//! Handing pairs to the compute backend and taking them back

use crate::config::Config;
use crate::lifecycle::StatusMachine;
use crate::models::{JobPair, StatusCode};
use crate::paths::PathResolver;
use crate::store::PairStore;
use anyhow::Context;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend command is empty")]
    EmptyCommand,
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} exited with {status}: {stderr}")]
    Rejected {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("no execution handle in backend output: {0:?}")]
    NoHandle(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("pair has not been saved")]
    Unsaved,
    #[error("pair {pair_id} is {status}, not pending submission")]
    NotPending { pair_id: i64, status: StatusCode },
    #[error("backend refused pair {pair_id}: {source}")]
    Backend {
        pair_id: i64,
        #[source]
        source: BackendError,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// The compute backend. Handles are opaque integers.
pub trait Backend: Send + Sync {
    fn submit_script(&self, script: &Path) -> Result<i64, BackendError>;

    /// Request termination. Returns once the request is sent.
    fn kill(&self, root: &str, handle: i64) -> Result<(), BackendError>;
}

/// Backend driven by external submit and kill commands (qsub/qdel style)
#[derive(Debug, Clone)]
pub struct CommandBackend {
    submit_command: String,
    kill_command: String,
}

impl CommandBackend {
    pub fn new(submit_command: impl Into<String>, kill_command: impl Into<String>) -> Self {
        Self {
            submit_command: submit_command.into(),
            kill_command: kill_command.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.backend_submit_command, &config.backend_kill_command)
    }
}

fn split_command(command: &str) -> Result<(&str, Vec<&str>), BackendError> {
    let mut parts = command.split_whitespace();
    let program = parts.next().ok_or(BackendError::EmptyCommand)?;
    Ok((program, parts.collect()))
}

/// First run of ASCII digits in the text
fn first_integer(text: &str) -> Option<i64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

impl Backend for CommandBackend {
    fn submit_script(&self, script: &Path) -> Result<i64, BackendError> {
        let (program, args) = split_command(&self.submit_command)?;
        let output = Command::new(program)
            .args(&args)
            .arg(script)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| BackendError::Spawn {
                command: self.submit_command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BackendError::Rejected {
                command: self.submit_command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        first_integer(&stdout).ok_or_else(|| BackendError::NoHandle(stdout.trim().to_string()))
    }

    fn kill(&self, root: &str, handle: i64) -> Result<(), BackendError> {
        let (program, args) = split_command(&self.kill_command)?;
        let mut child = Command::new(program)
            .args(&args)
            .arg(handle.to_string())
            .env("BACKEND_ROOT", root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| BackendError::Spawn {
                command: self.kill_command.clone(),
                source,
            })?;

        // Reap in the background; the caller does not wait for the backend
        std::thread::spawn(move || match child.wait() {
            Ok(status) if !status.success() => {
                log::warn!("Kill request for handle {} exited with {}", handle, status)
            }
            Ok(_) => log::debug!("Kill request for handle {} accepted", handle),
            Err(e) => log::warn!("Kill request for handle {} failed: {}", handle, e),
        });
        Ok(())
    }
}

pub struct Dispatcher<'a, S: PairStore, B: Backend> {
    store: &'a S,
    backend: &'a B,
    config: &'a Config,
    paths: PathResolver,
}

impl<'a, S: PairStore, B: Backend> Dispatcher<'a, S, B> {
    pub fn new(store: &'a S, backend: &'a B, config: &'a Config) -> Self {
        Self {
            store,
            backend,
            config,
            paths: PathResolver::from_config(config),
        }
    }

    /// Claim the pair, write its job script, hand it to the backend and
    /// record the handle. Any failure after the claim marks every stage
    /// submit-failed; a handle that could not be recorded is killed.
    pub fn submit(&self, pair: &JobPair) -> Result<i64, DispatchError> {
        let pair_id = pair.id.ok_or(DispatchError::Unsaved)?;
        let contents = self.render_job_script(pair)?;

        // The stored status decides, not the caller's copy of the pair
        if self.store.claim_for_submission(pair_id)? == 0 {
            let status = self
                .store
                .get_pair(pair_id)?
                .map(|p| p.status.code)
                .unwrap_or(StatusCode::Unknown);
            return Err(DispatchError::NotPending { pair_id, status });
        }

        let script = match self.write_job_script(pair_id, &contents) {
            Ok(script) => script,
            Err(e) => {
                self.mark_submit_failed(pair_id);
                return Err(e.into());
            }
        };

        let handle = match self.backend.submit_script(&script) {
            Ok(handle) => handle,
            Err(source) => {
                log::error!("Backend refused pair {}: {}", pair_id, source);
                self.mark_submit_failed(pair_id);
                return Err(DispatchError::Backend { pair_id, source });
            }
        };

        let now = chrono::Utc::now().timestamp();
        if let Err(e) = self.store.record_submission(pair_id, handle, now) {
            log::error!(
                "Pair {} was accepted as backend handle {} but the handle was not stored: {:#}",
                pair_id,
                handle,
                e
            );
            self.kill(handle);
            self.mark_submit_failed(pair_id);
            return Err(DispatchError::Internal(e.context(format!(
                "Backend handle {} of pair {} was not recorded",
                handle, pair_id
            ))));
        }
        log::info!("Submitted pair {} as backend handle {}", pair_id, handle);
        Ok(handle)
    }

    fn mark_submit_failed(&self, pair_id: i64) {
        StatusMachine::new(self.store).set_all_later_statuses(pair_id, -1, StatusCode::SubmitFailed);
    }

    /// Best-effort termination of a backend execution
    pub fn kill(&self, handle: i64) -> bool {
        match self.backend.kill(&self.config.backend_root, handle) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Could not ask backend to kill handle {}: {}", handle, e);
                false
            }
        }
    }

    pub fn script_path(&self, pair_id: i64) -> PathBuf {
        self.config
            .backend_inbox_dir
            .join(format!("jobline-pair-{}.bash", pair_id))
    }

    fn write_job_script(&self, pair_id: i64, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.script_path(pair_id);
        std::fs::create_dir_all(&self.config.backend_inbox_dir).with_context(|| {
            format!("Failed to create directory: {}", self.config.backend_inbox_dir.display())
        })?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write job script: {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .with_context(|| format!("Failed to make {} executable", path.display()))?;
        }
        Ok(path)
    }

    /// Shell script exporting everything the node-side runner needs
    pub fn render_job_script(&self, pair: &JobPair) -> anyhow::Result<String> {
        let pair_id = pair.id.context("Pair has not been saved")?;
        let output_dir = self.paths.pair_path(pair)?;
        let log_path = self.paths.log_path(pair)?;
        let inputs = self.store.get_pair_input_paths(pair_id)?;

        let mut script = String::from("#!/bin/bash\n");
        let _ = writeln!(script, "# job script for pair {}", pair_id);
        let mut export = |name: &str, value: &str| {
            let _ = writeln!(script, "export {}={}", name, shell_quote(value));
        };
        export("JOBLINE_PAIR_ID", &pair_id.to_string());
        export("JOBLINE_JOB_ID", &pair.job_id.to_string());
        export("JOBLINE_SPACE_PATH", &pair.path);
        export("JOBLINE_BENCH_NAME", &pair.bench.name);
        export("JOBLINE_BENCH_PATH", pair.bench.path.as_deref().unwrap_or(""));
        export("JOBLINE_OUTPUT_DIR", &output_dir.to_string_lossy());
        export("JOBLINE_LOG_PATH", &log_path.to_string_lossy());
        export("JOBLINE_PRIMARY_STAGE", &pair.primary_stage_number.to_string());

        let stages: Vec<_> = pair.runnable_stages().collect();
        let array = |values: Vec<String>| {
            values.iter().map(|v| shell_quote(v)).collect::<Vec<_>>().join(" ")
        };
        let _ = writeln!(
            script,
            "STAGE_NUMBERS=({})",
            array(stages.iter().map(|s| s.stage_number.to_string()).collect())
        );
        let _ = writeln!(
            script,
            "SOLVER_NAMES=({})",
            array(stages.iter().map(|s| s.solver.name.clone()).collect())
        );
        let _ = writeln!(
            script,
            "SOLVER_PATHS=({})",
            array(stages.iter().map(|s| s.solver.path.clone().unwrap_or_default()).collect())
        );
        let _ = writeln!(
            script,
            "CONFIG_NAMES=({})",
            array(stages.iter().map(|s| s.configuration.name.clone()).collect())
        );
        let _ = writeln!(script, "BENCH_INPUTS=({})", array(inputs));
        script.push_str("exec \"${JOBLINE_RUNNER:-jobline-runner}\"\n");
        Ok(script)
    }
}

/// Single-quote a value for bash
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
