//! # Retry Executor
//!
//! Bounded exponential-backoff retry around a single remote operation. Every
//! attempt asks the service's circuit breaker for a permit first and reports
//! its outcome back; an open breaker ends the run immediately as
//! `CircuitOpen` without consuming retry budget.
//!
//! Callers above the executor never observe individual attempt failures, only
//! the final outcome with its attempt count and elapsed time.

use crate::constants::defaults;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::remote::RemoteError;
use crate::resilience::{CircuitBreaker, ErrorClassifier, FnClassifier, StandardErrorClassifier};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Retry configuration for one call class
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound applied after the exponential growth
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Budget for a single attempt; an expired attempt becomes `RemoteError::Timeout`
    pub attempt_timeout: Option<Duration>,
    pub classifier: Arc<dyn ErrorClassifier>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Single attempt, no backoff
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = Some(attempt_timeout);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Use a closure as the retryable predicate
    pub fn with_classifier_fn<F>(self, predicate: F) -> Self
    where
        F: Fn(&RemoteError) -> bool + Send + Sync + 'static,
    {
        self.with_classifier(Arc::new(FnClassifier::new(predicate)))
    }

    pub fn is_retryable(&self, error: &RemoteError) -> bool {
        self.classifier.is_retryable(error)
    }

    /// Delay slept after failed attempt number `attempt` (1-based):
    /// `min(base_delay * backoff_factor^(attempt-1), max_delay)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }

        Duration::from_secs_f64(secs.max(0.0))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }

        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err("backoff_factor must be a finite value >= 1.0".to_string());
        }

        if self.max_delay < self.base_delay {
            return Err("max_delay must not be smaller than base_delay".to_string());
        }

        if self.attempt_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err("attempt_timeout must be greater than 0 when set".to_string());
        }

        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(defaults::RETRY_MAX_DELAY_MS),
            backoff_factor: defaults::RETRY_BACKOFF_FACTOR,
            attempt_timeout: None,
            classifier: Arc::new(StandardErrorClassifier),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("classifier", &self.classifier.classifier_name())
            .finish()
    }
}

/// Successful run outcome with diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySuccess<T> {
    pub value: T,
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor;

impl RetryExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `operation` under `policy`, gating each attempt with `breaker`
    pub async fn run<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        breaker: Option<&CircuitBreaker>,
        mut operation: F,
    ) -> CoordinatorResult<RetrySuccess<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let started = Instant::now();
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let permit = match breaker {
                Some(breaker) => match breaker.try_acquire() {
                    Some(permit) => Some(permit),
                    None => {
                        debug!(
                            component = breaker.name(),
                            attempt,
                            "⛔ Attempt skipped, circuit open"
                        );
                        return Err(CoordinatorError::CircuitOpen {
                            component: breaker.name().to_string(),
                        });
                    }
                },
                None => None,
            };

            let outcome = match policy.attempt_timeout {
                Some(budget) => match tokio::time::timeout(budget, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(RemoteError::timeout(budget)),
                },
                None => operation().await,
            };

            match outcome {
                Ok(value) => {
                    if let Some(permit) = permit {
                        permit.succeeded();
                    }
                    if attempt > 1 {
                        info!(attempt, "✅ Operation succeeded after retry");
                    }
                    return Ok(RetrySuccess {
                        value,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    });
                }
                Err(error) => {
                    if let Some(permit) = permit {
                        permit.failed();
                    }

                    let retryable = policy.is_retryable(&error);
                    if attempt >= max_attempts || !retryable {
                        warn!(
                            attempts = attempt,
                            retryable,
                            error = %error,
                            "❌ Operation failed, giving up"
                        );
                        return Err(CoordinatorError::OperationFailed {
                            attempts: attempt,
                            elapsed: started.elapsed(),
                            last_error: error,
                        });
                    }

                    let delay = policy.delay_for_attempt(attempt);
                    debug!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "🔄 Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
