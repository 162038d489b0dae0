//! Errors raised by the pure lifecycle rules

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTime { value: String, reason: String },

    #[error("malformed poll option: {0:?}")]
    MalformedPollOption(String),

    #[error("a vote needs between {min} and {max} candidates, found {found}")]
    CandidateCount { found: usize, min: usize, max: usize },
}
