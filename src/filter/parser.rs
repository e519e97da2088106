use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Result-review filters over the pairs of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairFilter {
    All,
    /// Pending, active or waiting on post-processing
    Incomplete,
    Resource,
    Failed,
    Complete,
    /// Classified correct
    Solved,
    /// Classified incorrect
    Wrong,
    /// Classified unknown
    Unknown,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown pair filter '{0}'. Valid filters: all, incomplete, resource, failed, complete, solved, wrong, unknown")]
pub struct UnknownFilterError(pub String);

impl PairFilter {
    pub const ALL: [PairFilter; 8] = [
        PairFilter::All,
        PairFilter::Incomplete,
        PairFilter::Resource,
        PairFilter::Failed,
        PairFilter::Complete,
        PairFilter::Solved,
        PairFilter::Wrong,
        PairFilter::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PairFilter::All => "all",
            PairFilter::Incomplete => "incomplete",
            PairFilter::Resource => "resource",
            PairFilter::Failed => "failed",
            PairFilter::Complete => "complete",
            PairFilter::Solved => "solved",
            PairFilter::Wrong => "wrong",
            PairFilter::Unknown => "unknown",
        }
    }
}

impl FromStr for PairFilter {
    type Err = UnknownFilterError;

    /// Case-insensitive. An empty name means no filtering.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        if name.is_empty() {
            return Ok(PairFilter::All);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == name)
            .ok_or_else(|| UnknownFilterError(s.to_string()))
    }
}

impl fmt::Display for PairFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_names() {
        for filter in PairFilter::ALL {
            assert_eq!(filter.as_str().parse::<PairFilter>(), Ok(filter));
        }
        assert_eq!("SOLVED".parse::<PairFilter>(), Ok(PairFilter::Solved));
        assert_eq!(" wrong ".parse::<PairFilter>(), Ok(PairFilter::Wrong));
        assert_eq!("".parse::<PairFilter>(), Ok(PairFilter::All));
    }

    #[test]
    fn test_unknown_name_is_an_error() {
        let err = "solvd".parse::<PairFilter>().unwrap_err();
        assert_eq!(err, UnknownFilterError("solvd".to_string()));
        assert!(err.to_string().contains("Valid filters"));
    }
}
