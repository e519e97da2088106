use crate::config::ResultKeys;
use crate::models::JoblineStage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Correctness of a stage's reported result against the expected one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Correctness {
    NotComplete,
    Correct,
    Incorrect,
    Unknown,
}

impl Correctness {
    /// Stable numeric code: -1, 0, 1, 2
    pub fn code(&self) -> i64 {
        match self {
            Correctness::NotComplete => -1,
            Correctness::Correct => 0,
            Correctness::Incorrect => 1,
            Correctness::Unknown => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Correctness::NotComplete => "not complete",
            Correctness::Correct => "correct",
            Correctness::Incorrect => "incorrect",
            Correctness::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Correctness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    keys: ResultKeys,
}

impl Classifier {
    pub fn new(keys: ResultKeys) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &ResultKeys {
        &self.keys
    }

    /// Classify one stage. The checks run in a fixed order; a stage with no
    /// attributes at all counts as correct.
    pub fn classify(&self, stage: &JoblineStage) -> Correctness {
        if !stage.status.code.is_complete() {
            return Correctness::NotComplete;
        }
        if stage.attributes.is_empty() {
            return Correctness::Correct;
        }

        let reported = stage.attribute(&self.keys.result);
        if reported == Some(self.keys.unknown.as_str()) {
            return Correctness::Unknown;
        }

        match stage.attribute(&self.keys.expected) {
            Some(expected) if expected != self.keys.unknown => {
                if reported == Some(expected) {
                    Correctness::Correct
                } else {
                    Correctness::Incorrect
                }
            }
            _ => Correctness::Unknown,
        }
    }
}
