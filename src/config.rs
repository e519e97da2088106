use crate::properties;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid value for '{key}': '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("Cannot determine home directory; set JOBLINE_RC")]
    NoHome,
}

/// Reserved attribute names used by result classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultKeys {
    /// Attribute holding the solver's reported result
    pub result: String,
    /// Attribute holding the benchmark's expected result
    pub expected: String,
    /// Value meaning "unknown / not applicable"
    pub unknown: String,
}

impl Default for ResultKeys {
    fn default() -> Self {
        Self {
            result: "starexec-result".to_string(),
            expected: "starexec-expected-result".to_string(),
            unknown: "starexec-unknown".to_string(),
        }
    }
}

/// Immutable configuration handed to each component at construction
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    /// Root of per-job output directories (`<root>/<job id>`)
    pub job_output_dir: PathBuf,
    /// Root of per-job log directories (`<root>/<job id>`)
    pub job_log_dir: PathBuf,
    /// Parent directory for post-processing sandboxes
    pub sandbox_dir: PathBuf,
    /// Fixed name of the script every processor must provide
    pub processor_run_script: String,
    pub processor_timeout: Option<Duration>,
    /// Opaque backend root value passed along with kill requests
    pub backend_root: String,
    /// Where job scripts are written before submission
    pub backend_inbox_dir: PathBuf,
    pub backend_submit_command: String,
    pub backend_kill_command: String,
    /// Rows per transaction for batched inserts
    pub batch_size: usize,
    pub result_keys: ResultKeys,
}

impl Config {
    /// Defaults rooted at the given base directory
    pub fn with_base_dir(base: &Path) -> Self {
        Self {
            db_path: base.join("jobline.db"),
            job_output_dir: base.join("joboutput"),
            job_log_dir: base.join("joblogs"),
            sandbox_dir: base.join("sandbox"),
            processor_run_script: "process".to_string(),
            processor_timeout: None,
            backend_root: String::new(),
            backend_inbox_dir: base.join("jobin"),
            backend_submit_command: "qsub".to_string(),
            backend_kill_command: "qdel".to_string(),
            batch_size: 1000,
            result_keys: ResultKeys::default(),
        }
    }

    /// Base directory used when no rc file overrides paths
    pub fn default_base_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".jobline"))
            .ok_or(ConfigError::NoHome)
    }

    /// Get the configuration file path (`$JOBLINE_RC` or `~/.jobline/rc`)
    pub fn rc_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var("JOBLINE_RC") {
            return Ok(PathBuf::from(path));
        }
        Ok(Self::default_base_dir()?.join("rc"))
    }

    /// Load configuration from the rc file, or defaults if it does not exist
    pub fn load() -> Result<Self, ConfigError> {
        let rc = Self::rc_path()?;
        if rc.exists() {
            Self::from_file(&rc)
        } else {
            log::debug!("No configuration file at {}, using defaults", rc.display());
            Ok(Self::with_base_dir(&Self::default_base_dir()?))
        }
    }

    /// Load configuration from a specific rc file.
    /// Relative paths resolve against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_rc_str(&text, &base)
    }

    pub fn from_rc_str(text: &str, base: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::with_base_dir(base);
        let parsed = properties::parse_str(text);

        let resolve = |value: &str| {
            let p = PathBuf::from(value);
            if p.is_relative() {
                base.join(p)
            } else {
                p
            }
        };

        for (key, value) in &parsed.values {
            let value = value.trim();
            match key.as_str() {
                "data.location" => config.db_path = resolve(value),
                "jobs.output_dir" => config.job_output_dir = resolve(value),
                "jobs.log_dir" => config.job_log_dir = resolve(value),
                "sandbox.dir" => config.sandbox_dir = resolve(value),
                "processor.run_script" => {
                    if value.is_empty() || value.contains('/') {
                        return Err(invalid(key, value, "must be a bare file name"));
                    }
                    config.processor_run_script = value.to_string();
                }
                "processor.timeout_secs" => {
                    let secs: u64 = value
                        .parse()
                        .map_err(|_| invalid(key, value, "expected whole seconds"))?;
                    config.processor_timeout = if secs == 0 {
                        None
                    } else {
                        Some(Duration::from_secs(secs))
                    };
                }
                "backend.root" => config.backend_root = value.to_string(),
                "backend.inbox_dir" => config.backend_inbox_dir = resolve(value),
                "backend.submit_command" => config.backend_submit_command = value.to_string(),
                "backend.kill_command" => config.backend_kill_command = value.to_string(),
                "batch.size" => {
                    let size: usize = value
                        .parse()
                        .map_err(|_| invalid(key, value, "expected a positive integer"))?;
                    if size == 0 {
                        return Err(invalid(key, value, "expected a positive integer"));
                    }
                    config.batch_size = size;
                }
                "result.key" => config.result_keys.result = value.to_string(),
                "result.expected_key" => config.result_keys.expected = value.to_string(),
                "result.unknown" => config.result_keys.unknown = value.to_string(),
                other => log::debug!("Ignoring unknown configuration key '{}'", other),
            }
        }

        Ok(config)
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
