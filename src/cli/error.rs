// Error handling utilities for consistent error messages and exit codes

use crate::config::ConfigError;
use crate::models::StatusCode;
use thiserror::Error;

/// Invalid input or a missing resource; the binary exits with code 1.
/// Anything else reaching `main` is treated as an internal failure (exit 2).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UserError(pub String);

pub fn user_error(message: impl Into<String>) -> anyhow::Error {
    UserError(message.into()).into()
}

/// True if the failure was caused by the user rather than the system
pub fn is_user_error(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.is::<UserError>() || cause.is::<ConfigError>())
}

/// Validate that a pair ID is valid (positive integer)
pub fn validate_pair_id(id_str: &str) -> Result<i64, String> {
    id_str
        .parse::<i64>()
        .map_err(|_| format!("Invalid pair ID: '{}'. Pair ID must be a number.", id_str))
        .and_then(|id| {
            if id > 0 {
                Ok(id)
            } else {
                Err(format!("Invalid pair ID: {}. Pair ID must be positive.", id))
            }
        })
}

/// Validate a stage number (1-based)
pub fn validate_stage_number(stage_str: &str) -> Result<i64, String> {
    stage_str
        .parse::<i64>()
        .map_err(|_| format!("Invalid stage number: '{}'. Stage must be a number.", stage_str))
        .and_then(|n| {
            if n > 0 {
                Ok(n)
            } else {
                Err(format!("Invalid stage number: {}. Stages are numbered from 1.", n))
            }
        })
}

/// A stage number, or -1 meaning every stage
pub fn validate_from_stage(stage_str: &str) -> Result<i64, String> {
    if stage_str.trim() == "-1" {
        return Ok(-1);
    }
    validate_stage_number(stage_str)
}

/// Parse a status given by numeric code, name or description (case-insensitive)
pub fn parse_status_code(value: &str) -> Result<StatusCode, String> {
    let value = value.trim();
    if let Ok(code) = value.parse::<i64>() {
        return StatusCode::from_code(code)
            .ok_or_else(|| format!("Unknown status code: {}. Valid codes are 0-22.", code));
    }
    let normalize = |s: &str| s.to_lowercase().replace(['-', '_'], " ");
    let wanted = normalize(value);
    StatusCode::ALL
        .iter()
        .copied()
        .find(|status| normalize(status.name()) == wanted || status.as_str() == wanted)
        .ok_or_else(|| format!("Unknown status: '{}'", value))
}

/// Validate the number of post-processing workers
pub fn validate_workers(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("Invalid worker count: '{}'. Must be a positive number.", value)),
    }
}
