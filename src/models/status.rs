use serde::{Deserialize, Serialize};
use std::fmt;

/// Status class a code belongs to. Membership is fixed per code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusClass {
    Pending,
    Active,
    Resource,
    Failed,
    Processing,
    Complete,
}

impl StatusClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusClass::Pending => "pending",
            StatusClass::Active => "active",
            StatusClass::Resource => "resource",
            StatusClass::Failed => "failed",
            StatusClass::Processing => "processing",
            StatusClass::Complete => "complete",
        }
    }
}

/// Job pair / stage status codes
///
/// The numeric values are what gets stored and what the backend reports,
/// so they must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Unknown,
    PendingSubmit,
    Enqueued,
    Preparing,
    Running,
    Finishing,
    AwaitingResults,
    Complete,
    BackendRejected,
    SubmitFailed,
    ResultsError,
    RunScriptError,
    BenchmarkError,
    DiskQuotaExceeded,
    ExceedRuntime,
    ExceedCpu,
    ExceedFileWrite,
    ExceedMemory,
    GeneralError,
    ProcessingResults,
    Paused,
    Killed,
    Processing,
}

impl StatusCode {
    pub const ALL: [StatusCode; 23] = [
        StatusCode::Unknown,
        StatusCode::PendingSubmit,
        StatusCode::Enqueued,
        StatusCode::Preparing,
        StatusCode::Running,
        StatusCode::Finishing,
        StatusCode::AwaitingResults,
        StatusCode::Complete,
        StatusCode::BackendRejected,
        StatusCode::SubmitFailed,
        StatusCode::ResultsError,
        StatusCode::RunScriptError,
        StatusCode::BenchmarkError,
        StatusCode::DiskQuotaExceeded,
        StatusCode::ExceedRuntime,
        StatusCode::ExceedCpu,
        StatusCode::ExceedFileWrite,
        StatusCode::ExceedMemory,
        StatusCode::GeneralError,
        StatusCode::ProcessingResults,
        StatusCode::Paused,
        StatusCode::Killed,
        StatusCode::Processing,
    ];

    pub fn code(&self) -> i64 {
        match self {
            StatusCode::Unknown => 0,
            StatusCode::PendingSubmit => 1,
            StatusCode::Enqueued => 2,
            StatusCode::Preparing => 3,
            StatusCode::Running => 4,
            StatusCode::Finishing => 5,
            StatusCode::AwaitingResults => 6,
            StatusCode::Complete => 7,
            StatusCode::BackendRejected => 8,
            StatusCode::SubmitFailed => 9,
            StatusCode::ResultsError => 10,
            StatusCode::RunScriptError => 11,
            StatusCode::BenchmarkError => 12,
            StatusCode::DiskQuotaExceeded => 13,
            StatusCode::ExceedRuntime => 14,
            StatusCode::ExceedCpu => 15,
            StatusCode::ExceedFileWrite => 16,
            StatusCode::ExceedMemory => 17,
            StatusCode::GeneralError => 18,
            StatusCode::ProcessingResults => 19,
            StatusCode::Paused => 20,
            StatusCode::Killed => 21,
            StatusCode::Processing => 22,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }

    /// Decode a stored code, falling back to `Unknown` for values outside the taxonomy
    pub fn from_code_lossy(code: i64) -> Self {
        Self::from_code(code).unwrap_or_else(|| {
            log::warn!("Unrecognized status code {} treated as unknown", code);
            StatusCode::Unknown
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Unknown => "unknown",
            StatusCode::PendingSubmit => "pending submission",
            StatusCode::Enqueued => "enqueued",
            StatusCode::Preparing => "preparing",
            StatusCode::Running => "running",
            StatusCode::Finishing => "finishing",
            StatusCode::AwaitingResults => "awaiting results",
            StatusCode::Complete => "complete",
            StatusCode::BackendRejected => "rejected by backend",
            StatusCode::SubmitFailed => "submit failed",
            StatusCode::ResultsError => "results error",
            StatusCode::RunScriptError => "run script error",
            StatusCode::BenchmarkError => "benchmark error",
            StatusCode::DiskQuotaExceeded => "disk quota exceeded",
            StatusCode::ExceedRuntime => "timeout (wallclock)",
            StatusCode::ExceedCpu => "timeout (cpu)",
            StatusCode::ExceedFileWrite => "file write limit exceeded",
            StatusCode::ExceedMemory => "memory limit exceeded",
            StatusCode::GeneralError => "error",
            StatusCode::ProcessingResults => "processing results",
            StatusCode::Paused => "paused",
            StatusCode::Killed => "killed",
            StatusCode::Processing => "awaiting post-processing",
        }
    }

    /// Short kebab-case name, as accepted on the command line
    pub fn name(&self) -> &'static str {
        match self {
            StatusCode::Unknown => "unknown",
            StatusCode::PendingSubmit => "pending-submit",
            StatusCode::Enqueued => "enqueued",
            StatusCode::Preparing => "preparing",
            StatusCode::Running => "running",
            StatusCode::Finishing => "finishing",
            StatusCode::AwaitingResults => "awaiting-results",
            StatusCode::Complete => "complete",
            StatusCode::BackendRejected => "backend-rejected",
            StatusCode::SubmitFailed => "submit-failed",
            StatusCode::ResultsError => "results-error",
            StatusCode::RunScriptError => "run-script-error",
            StatusCode::BenchmarkError => "benchmark-error",
            StatusCode::DiskQuotaExceeded => "disk-quota-exceeded",
            StatusCode::ExceedRuntime => "wallclock-timeout",
            StatusCode::ExceedCpu => "cpu-timeout",
            StatusCode::ExceedFileWrite => "file-write-exceeded",
            StatusCode::ExceedMemory => "memory-exceeded",
            StatusCode::GeneralError => "general-error",
            StatusCode::ProcessingResults => "processing-results",
            StatusCode::Paused => "paused",
            StatusCode::Killed => "killed",
            StatusCode::Processing => "awaiting-post-processing",
        }
    }

    pub fn class(&self) -> StatusClass {
        match self {
            StatusCode::PendingSubmit | StatusCode::Paused => StatusClass::Pending,
            StatusCode::Enqueued
            | StatusCode::Preparing
            | StatusCode::Running
            | StatusCode::Finishing
            | StatusCode::AwaitingResults => StatusClass::Active,
            StatusCode::ExceedRuntime
            | StatusCode::ExceedCpu
            | StatusCode::ExceedFileWrite
            | StatusCode::ExceedMemory => StatusClass::Resource,
            StatusCode::Unknown
            | StatusCode::BackendRejected
            | StatusCode::SubmitFailed
            | StatusCode::ResultsError
            | StatusCode::RunScriptError
            | StatusCode::BenchmarkError
            | StatusCode::DiskQuotaExceeded
            | StatusCode::GeneralError
            | StatusCode::Killed => StatusClass::Failed,
            StatusCode::ProcessingResults | StatusCode::Processing => StatusClass::Processing,
            StatusCode::Complete => StatusClass::Complete,
        }
    }

    /// Not finished yet: pending, active or waiting on post-processing
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self.class(),
            StatusClass::Pending | StatusClass::Active | StatusClass::Processing
        )
    }

    pub fn is_resource(&self) -> bool {
        self.class() == StatusClass::Resource
    }

    pub fn is_failed(&self) -> bool {
        self.class() == StatusClass::Failed
    }

    pub fn is_processing(&self) -> bool {
        self.class() == StatusClass::Processing
    }

    pub fn is_complete(&self) -> bool {
        self.class() == StatusClass::Complete
    }

    /// Failure or resource-exhaustion codes; these may override any other state.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self.class(), StatusClass::Failed | StatusClass::Resource)
    }

    pub fn is_terminal(&self) -> bool {
        self.is_complete() || self.is_terminal_failure()
    }

    /// Position in the forward lifecycle. Failure codes have no position.
    pub(crate) fn lifecycle_rank(&self) -> Option<u8> {
        match self {
            StatusCode::PendingSubmit | StatusCode::Paused => Some(0),
            StatusCode::Enqueued => Some(1),
            StatusCode::Preparing => Some(2),
            StatusCode::Running => Some(3),
            StatusCode::Finishing => Some(4),
            StatusCode::AwaitingResults => Some(5),
            StatusCode::Processing => Some(6),
            StatusCode::ProcessingResults => Some(7),
            StatusCode::Complete => Some(8),
            _ => None,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// A status code plus its human readable description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    pub description: String,
}

impl Status {
    pub fn new(code: StatusCode) -> Self {
        Self {
            code,
            description: code.as_str().to_string(),
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new(StatusCode::Unknown)
    }
}

impl From<StatusCode> for Status {
    fn from(code: StatusCode) -> Self {
        Status::new(code)
    }
}
