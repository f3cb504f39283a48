//! # Circuit Breaker Implementation
//!
//! Fault isolation for calls to one remote service endpoint. Three states:
//! Closed (normal operation), Open (failing fast) and Half-Open (one trial call
//! probing recovery). The breaker is evaluated lazily: an open circuit only
//! moves to half-open when a caller observes that the recovery timeout has
//! passed since the last failure. Every read-modify-write of the breaker state
//! happens under a single lock, so concurrent failures cannot double-transition.

use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - exactly one trial call is allowed through
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => f.write_str("CLOSED"),
            CircuitState::Open => f.write_str("OPEN"),
            CircuitState::HalfOpen => f.write_str("HALF_OPEN"),
        }
    }
}

/// Errors returned by [`CircuitBreaker::call`]
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

#[derive(Debug)]
struct BreakerState {
    phase: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    /// Set while the single half-open trial call is outstanding
    trial_in_flight: bool,
    metrics: CircuitBreakerMetrics,
}

/// Circuit breaker guarding one remote service endpoint
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    config: CircuitBreakerConfig,

    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            config,
            state: Mutex::new(BreakerState {
                phase: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
                trial_in_flight: false,
                metrics: CircuitBreakerMetrics::new(),
            }),
        }
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get current circuit state as last evaluated
    pub fn state(&self) -> CircuitState {
        self.state.lock().phase
    }

    /// Consecutive failures since the last success
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    pub fn last_failure_at(&self) -> Option<Instant> {
        self.state.lock().last_failure_at
    }

    /// Ask permission to issue one call at the current instant
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        self.try_acquire_at(Instant::now())
    }

    /// Ask permission to issue one call, evaluating the breaker at `now`
    ///
    /// Returns `None` while the circuit is open (or while the half-open trial
    /// is outstanding). The returned permit must be settled with
    /// [`CallPermit::succeeded`] or [`CallPermit::failed`]; a trial permit that
    /// is dropped unsettled frees the trial slot for the next caller.
    pub fn try_acquire_at(&self, now: Instant) -> Option<CallPermit<'_>> {
        let mut state = self.state.lock();

        let trial = match state.phase {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let recovered = state
                    .last_failure_at
                    .map(|failed_at| {
                        now.saturating_duration_since(failed_at) >= self.config.recovery_timeout
                    })
                    .unwrap_or(true);

                if !recovered {
                    state.metrics.rejected_calls += 1;
                    debug!(component = %self.name, "⛔ Call rejected (circuit open)");
                    return None;
                }

                self.transition_to_half_open(&mut state);
                state.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if state.trial_in_flight {
                    state.metrics.rejected_calls += 1;
                    debug!(component = %self.name, "⛔ Call rejected (trial in flight)");
                    return None;
                }
                state.trial_in_flight = true;
                true
            }
        };

        Some(CallPermit {
            breaker: self,
            trial,
            started: now,
            settled: false,
        })
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(permit) = self.try_acquire() else {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        };

        let result = operation().await;

        match &result {
            Ok(_) => permit.succeeded(),
            Err(_) => permit.failed(),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    fn record_success(&self, trial: bool, duration: Duration) {
        let mut state = self.state.lock();
        state.metrics.total_calls += 1;
        state.metrics.success_count += 1;
        state.metrics.total_duration += duration;

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            trial = trial,
            "🟢 Operation succeeded"
        );

        match state.phase {
            CircuitState::HalfOpen if trial => {
                state.trial_in_flight = false;
                self.transition_to_closed(&mut state);
            }
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            phase => {
                // Admitted before the circuit opened; counted but no phase change
                debug!(component = %self.name, phase = %phase, "Late success recorded");
            }
        }
    }

    fn record_failure(&self, trial: bool, duration: Duration, now: Instant) {
        let mut state = self.state.lock();
        state.metrics.total_calls += 1;
        state.metrics.failure_count += 1;
        state.metrics.total_duration += duration;

        warn!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            trial = trial,
            "🔴 Operation failed"
        );

        match state.phase {
            CircuitState::HalfOpen if trial => {
                state.failure_count += 1;
                self.transition_to_open(&mut state, now);
            }
            CircuitState::Closed => {
                state.failure_count += 1;
                state.last_failure_at = Some(now);
                if state.failure_count >= self.config.failure_threshold {
                    self.transition_to_open(&mut state, now);
                }
            }
            phase => {
                debug!(component = %self.name, phase = %phase, "Late failure recorded");
            }
        }
    }

    fn release_trial(&self) {
        let mut state = self.state.lock();
        if state.phase == CircuitState::HalfOpen && state.trial_in_flight {
            state.trial_in_flight = false;
            debug!(component = %self.name, "Trial permit abandoned, slot released");
        }
    }

    /// Transition to closed state (normal operation)
    fn transition_to_closed(&self, state: &mut BreakerState) {
        state.phase = CircuitState::Closed;
        state.failure_count = 0;
        state.trial_in_flight = false;

        info!(
            component = %self.name,
            total_calls = state.metrics.total_calls,
            "🟢 Circuit breaker closed (recovered)"
        );
    }

    /// Transition to open state (failing fast)
    fn transition_to_open(&self, state: &mut BreakerState, now: Instant) {
        state.phase = CircuitState::Open;
        state.last_failure_at = Some(now);
        state.trial_in_flight = false;

        error!(
            component = %self.name,
            consecutive_failures = state.failure_count,
            failure_threshold = self.config.failure_threshold,
            recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
            "🔴 Circuit breaker opened (failing fast)"
        );
    }

    /// Transition to half-open state (testing recovery)
    fn transition_to_half_open(&self, state: &mut BreakerState) {
        state.phase = CircuitState::HalfOpen;
        state.trial_in_flight = false;

        info!(
            component = %self.name,
            "🟡 Circuit breaker half-open (testing recovery)"
        );
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        let mut state = self.state.lock();
        self.transition_to_open(&mut state, Instant::now());
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        let mut state = self.state.lock();
        self.transition_to_closed(&mut state);
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.state.lock();
        let mut snapshot = state.metrics.clone();

        snapshot.current_state = state.phase;
        snapshot.consecutive_failures = u64::from(state.failure_count);

        if snapshot.total_calls > 0 {
            snapshot.failure_rate = snapshot.failure_count as f64 / snapshot.total_calls as f64;
            snapshot.success_rate = snapshot.success_count as f64 / snapshot.total_calls as f64;
            snapshot.average_duration = snapshot
                .total_duration
                .div_f64(snapshot.total_calls as f64);
        }

        snapshot
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub fn is_healthy(&self) -> bool {
        let metrics = self.metrics();
        if metrics.current_state != CircuitState::Closed {
            return false;
        }

        if metrics.total_calls < 10 {
            // Too few calls to determine health
            return true;
        }

        metrics.failure_rate < 0.1
    }
}

/// Permission to issue exactly one call through a [`CircuitBreaker`]
#[must_use = "a permit must be settled with succeeded() or failed()"]
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    started: Instant,
    settled: bool,
}

impl CallPermit<'_> {
    /// Whether this is the single half-open trial call
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeeded(mut self) {
        self.settled = true;
        self.breaker
            .record_success(self.trial, self.started.elapsed());
    }

    pub fn failed(mut self) {
        self.settled = true;
        self.breaker
            .record_failure(self.trial, self.started.elapsed(), Instant::now());
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial();
        }
    }
}
