//! # Remote Service Boundary
//!
//! The coordination layer treats the remote service as an opaque collaborator:
//! it accepts a `(method, path, body)` request and yields either a payload or a
//! structured [`RemoteError`]. Payloads are never inspected.

use crate::signature::RequestDescriptor;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Structured failure reported by the remote service (or by the transport to it)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// HTTP-style status failure, optionally carrying a provider-specific code
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        code: Option<String>,
    },

    /// Provider-specific failure without an HTTP status (e.g. a datastore error code)
    #[error("Provider error {code}: {message}")]
    Provider { code: String, message: String },

    #[error("Remote error: {message}")]
    Other { message: String },
}

impl RemoteError {
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn connection<M: Into<String>>(message: M) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn status<M: Into<String>>(status: u16, message: M) -> Self {
        Self::Status {
            status,
            message: message.into(),
            code: None,
        }
    }

    pub fn status_with_code<M: Into<String>, C: Into<String>>(
        status: u16,
        message: M,
        code: C,
    ) -> Self {
        Self::Status {
            status,
            message: message.into(),
            code: Some(code.into()),
        }
    }

    pub fn provider<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self::Provider {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn other<M: Into<String>>(message: M) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// HTTP status, when the failure carries one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Provider-specific error code, when the failure carries one
    pub fn code(&self) -> Option<&str> {
        match self {
            RemoteError::Status { code, .. } => code.as_deref(),
            RemoteError::Provider { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}

/// The external collaborator every coordinated call eventually reaches
///
/// Implementations perform exactly one network operation per `call`; retrying,
/// batching and circuit breaking all happen above this trait.
#[async_trait]
pub trait RemoteService: Send + Sync + 'static {
    /// Opaque success payload, shared between grouped callers
    type Payload: Clone + Send + Sync + 'static;

    async fn call(&self, request: &RequestDescriptor) -> Result<Self::Payload, RemoteError>;
}
