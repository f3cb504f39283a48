//! # Remote Error Classification
//!
//! Decides whether a failed attempt against the remote service is worth
//! retrying. The classifier is pluggable per call class so higher layers can
//! special-case provider-specific codes (for example a datastore's
//! permission-denied code arriving with a 5xx status).
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  RemoteError    │────▶│ ErrorClassifier │────▶│ ErrorCategory + │
//! │                 │     │ Strategy        │     │ retryable?      │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```

use crate::constants::status;
use crate::remote::RemoteError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Primary error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Transport-level failure before a response arrived
    Network,
    /// Connection could not be established or was reset
    Connection,
    /// Attempt exceeded its time budget
    Timeout,
    /// Remote side failed (5xx)
    Server,
    /// Remote asked us to slow down (429)
    RateLimit,
    /// Credentials missing or rejected (401)
    Authentication,
    /// Credentials valid but insufficient (403)
    Authorization,
    /// The request itself is wrong (other 4xx)
    ClientRequest,
    /// Provider-specific failure code
    Provider,
    Unknown,
}

impl ErrorCategory {
    /// Categories that may succeed if the same request is simply issued again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Network
                | ErrorCategory::Connection
                | ErrorCategory::Timeout
                | ErrorCategory::Server
                | ErrorCategory::RateLimit
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Network => write!(f, "Network"),
            ErrorCategory::Connection => write!(f, "Connection"),
            ErrorCategory::Timeout => write!(f, "Timeout"),
            ErrorCategory::Server => write!(f, "Server"),
            ErrorCategory::RateLimit => write!(f, "Rate Limit"),
            ErrorCategory::Authentication => write!(f, "Authentication"),
            ErrorCategory::Authorization => write!(f, "Authorization"),
            ErrorCategory::ClientRequest => write!(f, "Client Request"),
            ErrorCategory::Provider => write!(f, "Provider"),
            ErrorCategory::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Trait for error classification strategies
pub trait ErrorClassifier: Send + Sync {
    fn categorize(&self, error: &RemoteError) -> ErrorCategory;

    fn is_retryable(&self, error: &RemoteError) -> bool {
        self.categorize(error).is_transient()
    }

    /// Get the classifier name for identification
    fn classifier_name(&self) -> &'static str;
}

/// Default classification: network, connection, timeout, 5xx, 408 and 429 are
/// retryable; authentication, authorization and other client errors are not.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardErrorClassifier;

impl StandardErrorClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl ErrorClassifier for StandardErrorClassifier {
    fn categorize(&self, error: &RemoteError) -> ErrorCategory {
        match error {
            RemoteError::Network { .. } => ErrorCategory::Network,
            RemoteError::Connection { .. } => ErrorCategory::Connection,
            RemoteError::Timeout { .. } => ErrorCategory::Timeout,
            RemoteError::Status { status: code, .. } => match *code {
                status::UNAUTHORIZED => ErrorCategory::Authentication,
                status::FORBIDDEN => ErrorCategory::Authorization,
                status::REQUEST_TIMEOUT => ErrorCategory::Timeout,
                status::TOO_MANY_REQUESTS => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                400..=499 => ErrorCategory::ClientRequest,
                _ => ErrorCategory::Unknown,
            },
            RemoteError::Provider { .. } => ErrorCategory::Provider,
            RemoteError::Other { .. } => ErrorCategory::Unknown,
        }
    }

    fn classifier_name(&self) -> &'static str {
        "standard"
    }
}

/// Marks a set of provider codes as never retryable, deferring everything
/// else to an inner classifier
#[derive(Clone)]
pub struct CodeAwareClassifier {
    non_retryable_codes: HashSet<String>,
    inner: Arc<dyn ErrorClassifier>,
}

impl CodeAwareClassifier {
    pub fn new<I, S>(non_retryable_codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_inner(non_retryable_codes, Arc::new(StandardErrorClassifier))
    }

    pub fn with_inner<I, S>(non_retryable_codes: I, inner: Arc<dyn ErrorClassifier>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            non_retryable_codes: non_retryable_codes.into_iter().map(Into::into).collect(),
            inner,
        }
    }

    fn is_listed(&self, error: &RemoteError) -> bool {
        error
            .code()
            .is_some_and(|code| self.non_retryable_codes.contains(code))
    }
}

impl fmt::Debug for CodeAwareClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeAwareClassifier")
            .field("non_retryable_codes", &self.non_retryable_codes)
            .field("inner", &self.inner.classifier_name())
            .finish()
    }
}

impl ErrorClassifier for CodeAwareClassifier {
    fn categorize(&self, error: &RemoteError) -> ErrorCategory {
        if self.is_listed(error) {
            ErrorCategory::Provider
        } else {
            self.inner.categorize(error)
        }
    }

    fn is_retryable(&self, error: &RemoteError) -> bool {
        !self.is_listed(error) && self.inner.is_retryable(error)
    }

    fn classifier_name(&self) -> &'static str {
        "code_aware"
    }
}

/// Classifier backed by a closure; categories come from the standard classifier
pub struct FnClassifier<F> {
    predicate: F,
}

impl<F> FnClassifier<F>
where
    F: Fn(&RemoteError) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> ErrorClassifier for FnClassifier<F>
where
    F: Fn(&RemoteError) -> bool + Send + Sync,
{
    fn categorize(&self, error: &RemoteError) -> ErrorCategory {
        StandardErrorClassifier.categorize(error)
    }

    fn is_retryable(&self, error: &RemoteError) -> bool {
        (self.predicate)(error)
    }

    fn classifier_name(&self) -> &'static str {
        "closure"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_standard_classification() {
        let classifier = StandardErrorClassifier::new();

        assert!(classifier.is_retryable(&RemoteError::network("reset by peer")));
        assert!(classifier.is_retryable(&RemoteError::connection("refused")));
        assert!(classifier.is_retryable(&RemoteError::timeout(Duration::from_secs(5))));
        assert!(classifier.is_retryable(&RemoteError::status(500, "boom")));
        assert!(classifier.is_retryable(&RemoteError::status(503, "unavailable")));
        assert!(classifier.is_retryable(&RemoteError::status(429, "slow down")));
        assert!(classifier.is_retryable(&RemoteError::status(408, "request timeout")));

        assert!(!classifier.is_retryable(&RemoteError::status(400, "bad request")));
        assert!(!classifier.is_retryable(&RemoteError::status(401, "unauthorized")));
        assert!(!classifier.is_retryable(&RemoteError::status(403, "forbidden")));
        assert!(!classifier.is_retryable(&RemoteError::status(422, "invalid")));
        assert!(!classifier.is_retryable(&RemoteError::provider("42501", "denied")));
        assert!(!classifier.is_retryable(&RemoteError::other("mystery")));
    }

    #[test]
    fn test_categories() {
        let classifier = StandardErrorClassifier::new();
        assert_eq!(
            classifier.categorize(&RemoteError::status(401, "")),
            ErrorCategory::Authentication
        );
        assert_eq!(
            classifier.categorize(&RemoteError::status(403, "")),
            ErrorCategory::Authorization
        );
        for status in [400, 404, 422] {
            assert_eq!(
                classifier.categorize(&RemoteError::status(status, "")),
                ErrorCategory::ClientRequest
            );
        }
        assert_eq!(
            classifier.categorize(&RemoteError::status(302, "")),
            ErrorCategory::Unknown
        );
        assert_eq!(ErrorCategory::RateLimit.to_string(), "Rate Limit");
    }

    #[test]
    fn test_code_aware_classifier_overrides_status() {
        let classifier = CodeAwareClassifier::new(["42501", "PGRST301"]);

        let denied = RemoteError::status_with_code(500, "permission denied", "42501");
        assert!(!classifier.is_retryable(&denied));
        assert_eq!(classifier.categorize(&denied), ErrorCategory::Provider);

        let plain = RemoteError::status_with_code(500, "internal", "XX000");
        assert!(classifier.is_retryable(&plain));
        assert_eq!(classifier.categorize(&plain), ErrorCategory::Server);
        assert_eq!(classifier.classifier_name(), "code_aware");
    }

    #[test]
    fn test_fn_classifier() {
        let classifier = FnClassifier::new(|error: &RemoteError| error.status_code() == Some(404));

        assert!(classifier.is_retryable(&RemoteError::status(404, "not yet replicated")));
        assert!(!classifier.is_retryable(&RemoteError::status(503, "unavailable")));
        assert_eq!(
            classifier.categorize(&RemoteError::status(503, "")),
            ErrorCategory::Server
        );
    }
}
