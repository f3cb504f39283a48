//! # Circuit Breaker Metrics
//!
//! Metrics snapshots for individual breakers and their system-wide aggregate,
//! consumed by `RequestCoordinator::stats()` and operational dashboards.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Calls that reached the protected operation
    pub total_calls: u64,

    pub success_count: u64,

    pub failure_count: u64,

    /// Calls rejected without reaching the operation
    pub rejected_calls: u64,

    /// Current consecutive failure count
    pub consecutive_failures: u64,

    /// Total duration of all operations
    pub total_duration: Duration,

    pub current_state: CircuitState,

    /// Calculated failure rate (0.0 to 1.0)
    pub failure_rate: f64,

    /// Calculated success rate (0.0 to 1.0)
    pub success_rate: f64,

    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    /// Create new metrics instance with zero values
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_calls: 0,
            consecutive_failures: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
            average_duration: Duration::ZERO,
        }
    }

    /// Check if metrics indicate healthy operation
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    /// Get human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Probing with a trial call",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Calls: {} | Success: {:.1}% | Failures: {} | Rejected: {} | Avg Duration: {}ms",
            self.state_description(),
            self.total_calls,
            self.success_rate * 100.0,
            self.failure_count,
            self.rejected_calls,
            self.average_duration.as_millis()
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// System-wide circuit breaker metrics aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    /// Metrics for individual circuit breakers by service name
    pub circuit_breakers: HashMap<String, CircuitBreakerMetrics>,

    /// Timestamp of last metrics collection
    pub collected_at: std::time::SystemTime,
}

impl SystemCircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            circuit_breakers: HashMap::new(),
            collected_at: std::time::SystemTime::now(),
        }
    }

    pub fn add_circuit_breaker(&mut self, name: String, metrics: CircuitBreakerMetrics) {
        self.circuit_breakers.insert(name, metrics);
        self.collected_at = std::time::SystemTime::now();
    }

    /// Get count of circuit breakers by state
    pub fn count_by_state(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();

        for metrics in self.circuit_breakers.values() {
            *counts.entry(metrics.current_state).or_insert(0) += 1;
        }

        counts
    }

    /// Get list of unhealthy circuit breakers
    pub fn unhealthy_circuits(&self) -> Vec<(&String, &CircuitBreakerMetrics)> {
        self.circuit_breakers
            .iter()
            .filter(|(_, metrics)| !metrics.is_healthy())
            .collect()
    }

    /// Calculate system-wide health score (0.0 to 1.0)
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0;
        }

        let healthy_count = self
            .circuit_breakers
            .values()
            .filter(|metrics| metrics.is_healthy())
            .count();

        healthy_count as f64 / self.circuit_breakers.len() as f64
    }

    pub fn total_calls(&self) -> u64 {
        self.circuit_breakers
            .values()
            .map(|metrics| metrics.total_calls)
            .sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.circuit_breakers
            .values()
            .map(|metrics| metrics.failure_count)
            .sum()
    }

    pub fn system_failure_rate(&self) -> f64 {
        let total_calls = self.total_calls();
        if total_calls == 0 {
            return 0.0;
        }

        self.total_failures() as f64 / total_calls as f64
    }

    /// Format summary for logging
    pub fn format_summary(&self) -> String {
        let state_counts = self.count_by_state();
        let closed_count = state_counts.get(&CircuitState::Closed).unwrap_or(&0);
        let open_count = state_counts.get(&CircuitState::Open).unwrap_or(&0);
        let half_open_count = state_counts.get(&CircuitState::HalfOpen).unwrap_or(&0);

        format!(
            "Circuit Breakers: {} total | {} closed | {} open | {} half-open | Health: {:.1}% | System failure rate: {:.2}%",
            self.circuit_breakers.len(),
            closed_count,
            open_count,
            half_open_count,
            self.health_score() * 100.0,
            self.system_failure_rate() * 100.0
        )
    }
}

impl Default for SystemCircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
