//! # Coordinator Error Types
//!
//! The error taxonomy surfaced to callers of the coordination layer. Individual
//! retry attempts are never visible here; only the final outcome is.

use crate::remote::RemoteError;
use std::time::Duration;
use thiserror::Error;

/// Errors delivered to callers of the coordinator entry points
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinatorError {
    /// Rejected by the throttle limiter before any network attempt
    #[error("Request throttled: {signature} (retry after {retry_after:?})")]
    Throttled {
        signature: String,
        retry_after: Duration,
    },

    /// Rejected because the circuit breaker for the service is open
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Retries exhausted or a non-retryable error was hit
    #[error("Operation failed after {attempts} attempt(s) in {elapsed:?}: {last_error}")]
    OperationFailed {
        attempts: u32,
        elapsed: Duration,
        last_error: RemoteError,
    },

    /// This caller stopped waiting on its group; the group itself keeps running
    #[error("Timed out after {waited:?} waiting for {signature}")]
    WaitTimeout { signature: String, waited: Duration },

    #[error("Internal coordinator error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// `Throttled` and `CircuitOpen` mean "try again later", as opposed to a
    /// confirmed remote failure.
    pub fn is_try_again_later(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Throttled { .. } | CoordinatorError::CircuitOpen { .. }
        )
    }

    /// Number of attempts made against the remote service, if any were made
    pub fn attempts(&self) -> u32 {
        match self {
            CoordinatorError::OperationFailed { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// The last remote error, for `OperationFailed`
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            CoordinatorError::OperationFailed { last_error, .. } => Some(last_error),
            _ => None,
        }
    }
}

pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;
