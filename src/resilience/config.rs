//! # Circuit Breaker Configuration
//!
//! Per-breaker configuration and validation. System-wide settings loaded from
//! configuration files live in `crate::config::CircuitBreakerSettings`, which
//! converts into these types.

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time since the last failure before an open circuit admits a trial call
    pub recovery_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Configuration for the application backend API
    pub fn for_external_api() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }

    /// Configuration for a hosted datastore, which tends to recover quickly
    pub fn for_datastore() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(15),
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.recovery_timeout.is_zero() {
            return Err("recovery_timeout must be greater than 0".to_string());
        }

        if self.recovery_timeout > Duration::from_secs(600) {
            return Err("recovery_timeout should not exceed 600 seconds".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::BREAKER_FAILURE_THRESHOLD,
            recovery_timeout: Duration::from_secs(defaults::BREAKER_RECOVERY_TIMEOUT_SECONDS),
        }
    }
}
