//! # Resilience Module
//!
//! Fault tolerance for calls to the remote service: error classification,
//! bounded exponential-backoff retry, and per-service circuit breakers.
//!
//! ## Architecture
//!
//! - **Error Classification**: decide which remote failures are worth retrying
//! - **Retry Executor**: bounded exponential backoff around a single operation
//! - **Circuit Breakers**: fail fast against a persistently failing service
//! - **Metrics Collection**: track failure rates and breaker state transitions
//!
//! ## Usage
//!
//! ```rust,no_run
//! use request_coordinator::remote::RemoteError;
//! use request_coordinator::resilience::{
//!     CircuitBreaker, CircuitBreakerConfig, RetryExecutor, RetryPolicy,
//! };
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = CircuitBreaker::new("backend".to_string(), CircuitBreakerConfig::default());
//! let policy = RetryPolicy::new(3, Duration::from_millis(200), Duration::from_secs(2));
//!
//! let outcome = RetryExecutor::new()
//!     .run(&policy, Some(&breaker), || async {
//!         Ok::<_, RemoteError>("lead list")
//!     })
//!     .await?;
//! assert_eq!(outcome.attempts, 1);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod classifier;
pub mod config;
pub mod manager;
pub mod metrics;
pub mod retry;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerError, CircuitState};
pub use classifier::{
    CodeAwareClassifier, ErrorCategory, ErrorClassifier, FnClassifier, StandardErrorClassifier,
};
pub use config::CircuitBreakerConfig;
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
pub use retry::{RetryExecutor, RetryPolicy, RetrySuccess};
