//! Error types for the curator engine.

use crate::RecordId;
use thiserror::Error;

/// All possible errors from the curator engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Input errors
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("duplicate record id: {0}")]
    DuplicateId(RecordId),

    // Data errors
    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error("corrupt job state: {0}")]
    CorruptJobState(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::Validation("batch size must be positive".into());
        assert_eq!(err.to_string(), "invalid input: batch size must be positive");

        let err = Error::DuplicateId(7);
        assert_eq!(err.to_string(), "duplicate record id: 7");

        let err = Error::MalformedData("missing required collection: records".into());
        assert_eq!(
            err.to_string(),
            "malformed data: missing required collection: records"
        );
    }
}
