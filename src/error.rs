//! Error taxonomy for the execution engine.
//!
//! Every failure that crosses the execution-strategy boundary is a
//! [`ProcessingError`]. Application layers (CLI, config loading) wrap these in
//! `anyhow` with context.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::EnvelopeKind;
use crate::operations::OperationKind;

/// Longest pattern accepted by validation, in characters.
pub const MAX_PATTERN_LENGTH: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessingError {
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("missing input: {0}")]
    MissingInput(&'static str),

    #[error("{kind} operation timed out after {after:?}")]
    Timeout { kind: OperationKind, after: Duration },

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("cannot convert {from} result to {to}")]
    UnsupportedConversion { from: EnvelopeKind, to: EnvelopeKind },

    #[error("{kind} operation was superseded by a newer request")]
    Cancelled { kind: OperationKind },

    #[error("{0}")]
    Unknown(String),
}

/// Coarse grouping used by callers that only care about the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Timeout,
    Transport,
    Conversion,
    Cancelled,
    Unknown,
}

impl ProcessingError {
    pub fn invalid_pattern(pattern: &str, reason: impl ToString) -> Self {
        // Patterns can be huge; keep the message readable.
        let shown: String = pattern.chars().take(64).collect();
        Self::InvalidPattern {
            pattern: shown,
            reason: reason.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidPattern { .. } | Self::MissingInput(_) => ErrorCategory::Validation,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::TransportFailure(_) => ErrorCategory::Transport,
            Self::UnsupportedConversion { .. } => ErrorCategory::Conversion,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    /// Short localizable key for user-facing messages.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::InvalidPattern { .. } => "errors.invalidRegex",
            Self::MissingInput(_) => "errors.missingInput",
            Self::Timeout { .. } => "errors.timeout",
            Self::TransportFailure(_) => "errors.transport",
            Self::UnsupportedConversion { .. } => "errors.unsupportedConversion",
            Self::Cancelled { .. } => "errors.cancelled",
            Self::Unknown(_) => "errors.unknown",
        }
    }
}

/// Checks length and syntax of a user supplied regular expression.
pub fn validate_regex(pattern: &str) -> Result<(), ProcessingError> {
    if pattern.chars().count() > MAX_PATTERN_LENGTH {
        return Err(ProcessingError::invalid_pattern(
            pattern,
            format!("pattern exceeds {MAX_PATTERN_LENGTH} characters"),
        ));
    }
    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ProcessingError::invalid_pattern(pattern, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_validation() {
        assert!(validate_regex(r"\d+").is_ok());

        let err = validate_regex("(unclosed").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(err.message_key(), "errors.invalidRegex");
    }

    #[test]
    fn test_overlong_pattern_rejected() {
        let pattern = "a".repeat(MAX_PATTERN_LENGTH + 1);
        let err = validate_regex(&pattern).unwrap_err();
        match err {
            ProcessingError::InvalidPattern { pattern, reason } => {
                assert_eq!(pattern.len(), 64);
                assert!(reason.contains("10000"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(validate_regex(&"a".repeat(MAX_PATTERN_LENGTH)).is_ok());
    }

    #[test]
    fn test_timeout_display() {
        let err = ProcessingError::Timeout {
            kind: OperationKind::Diff,
            after: Duration::from_secs(15),
        };
        assert_eq!(err.to_string(), "diff operation timed out after 15s");
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }
}
