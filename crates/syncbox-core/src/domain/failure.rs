//! Transfer failure taxonomy and retry policy
//!
//! Network round trips fail in one of two retryable ways:
//!
//! - **Transient** - connection resets, timeouts, 5xx, rate limiting.
//!   Retried up to `max_failure_retries`.
//! - **NotFound** - the server no longer has the object (404/410). Retried
//!   up to `max_not_founds`, counted separately because a persistent 404
//!   usually means the object was deleted server-side.
//!
//! Exceeding either cap makes the failure terminal for that change.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// FailureKind / TransferFailure
// ============================================================================

/// Class of a failed network round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Upload, download or metadata call failed for a retryable reason
    Transient,
    /// The remote object referenced by the change no longer exists
    NotFound,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => f.write_str("transient"),
            FailureKind::NotFound => f.write_str("not found"),
        }
    }
}

/// A failed upload, download or metadata round trip
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} failure: {message}")]
pub struct TransferFailure {
    kind: FailureKind,
    message: String,
}

impl TransferFailure {
    /// Creates a transient failure
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    /// Creates a not-found failure
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::NotFound,
            message: message.into(),
        }
    }

    /// Classifies an HTTP status code
    ///
    /// 404 and 410 are not-found failures; everything else is transient.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            404 | 410 => Self::not_found(message),
            _ => Self::transient(message),
        }
    }

    /// Returns the failure class
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Returns the failure message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true for not-found failures
    pub fn is_not_found(&self) -> bool {
        self.kind == FailureKind::NotFound
    }
}

// ============================================================================
// RetryPolicy / RetryDecision
// ============================================================================

/// Retry caps applied to every queued change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Transient failures tolerated before giving up
    pub max_failure_retries: u8,
    /// Not-found failures tolerated before giving up
    pub max_not_founds: u8,
}

impl RetryPolicy {
    /// Creates a policy with the given caps
    pub const fn new(max_failure_retries: u8, max_not_founds: u8) -> Self {
        Self {
            max_failure_retries,
            max_not_founds,
        }
    }

    /// Decides what happens after a failure has been counted
    ///
    /// `failure_counter` and `not_found_counter` are the totals *including*
    /// the failure just recorded. A change is terminal once either total
    /// exceeds its cap.
    pub fn evaluate(&self, failure_counter: u8, not_found_counter: u8) -> RetryDecision {
        if failure_counter > self.max_failure_retries {
            RetryDecision::Terminal(FailureKind::Transient)
        } else if not_found_counter > self.max_not_founds {
            RetryDecision::Terminal(FailureKind::NotFound)
        } else {
            RetryDecision::Retry {
                attempt: failure_counter.max(not_found_counter),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

/// Outcome of evaluating a failure against a [`RetryPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the change queued and try again
    Retry {
        /// Number of failures counted so far (highest of the two counters)
        attempt: u8,
    },
    /// Give up: the named cap was exceeded
    Terminal(FailureKind),
}

impl RetryDecision {
    /// Returns true if retries are exhausted
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryDecision::Terminal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert!(TransferFailure::from_status(404, "gone").is_not_found());
        assert!(TransferFailure::from_status(410, "gone").is_not_found());
        assert_eq!(
            TransferFailure::from_status(503, "busy").kind(),
            FailureKind::Transient
        );
        assert_eq!(
            TransferFailure::from_status(429, "slow down").kind(),
            FailureKind::Transient
        );
    }

    #[test]
    fn test_display() {
        let failure = TransferFailure::not_found("no such file");
        assert_eq!(failure.to_string(), "not found failure: no such file");
    }

    #[test]
    fn test_evaluate_transient_cap() {
        let policy = RetryPolicy::new(2, 5);
        assert_eq!(policy.evaluate(1, 0), RetryDecision::Retry { attempt: 1 });
        assert_eq!(policy.evaluate(2, 0), RetryDecision::Retry { attempt: 2 });
        assert_eq!(
            policy.evaluate(3, 0),
            RetryDecision::Terminal(FailureKind::Transient)
        );
    }

    #[test]
    fn test_evaluate_not_found_cap_is_independent() {
        let policy = RetryPolicy::new(5, 1);
        assert!(!policy.evaluate(4, 1).is_terminal());
        assert_eq!(
            policy.evaluate(0, 2),
            RetryDecision::Terminal(FailureKind::NotFound)
        );
    }

    #[test]
    fn test_zero_caps_terminate_on_first_failure() {
        let policy = RetryPolicy::new(0, 0);
        assert!(policy.evaluate(1, 0).is_terminal());
        assert!(policy.evaluate(0, 1).is_terminal());
    }
}
