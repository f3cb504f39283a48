//! # Coordinator Configuration System
//!
//! Typed configuration for the coordination layer. Every section carries
//! defaults, so a configuration file only needs to name the values it changes.
//!
//! ## Architecture
//!
//! - **Layered Sources**: base TOML file, optional environment overlay, then
//!   `REQCOORD_SECTION__KEY` environment variables
//! - **Explicit Validation**: invalid values are rejected at load time
//!
//! ## Usage
//!
//! ```rust,no_run
//! use request_coordinator::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let batch_delay = manager.config().batch.delay();
//! let policy = manager.config().retry.to_policy();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use crate::resilience::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/coordinator.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Pending group accumulation settings
    pub batch: BatchConfig,

    /// Deduplication cache and sweeper settings
    pub dedup: DedupConfig,

    pub throttle: ThrottleConfig,

    /// Backoff and retry configuration
    pub retry: RetryConfig,

    /// Circuit breaker configuration for resilience patterns
    pub circuit_breakers: CircuitBreakerSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Accumulation window of a pending group
    pub delay_ms: u64,
    /// Waiter count that flushes a group before the window ends
    pub max_batch_size: usize,
    /// Longest a single caller waits on its group; the group keeps running
    pub wait_timeout_ms: Option<u64>,
}

impl BatchConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            delay_ms: defaults::BATCH_DELAY_MS,
            max_batch_size: defaults::MAX_BATCH_SIZE,
            wait_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    pub window_ms: u64,
    /// Entries at least this old are removed by a sweep
    pub max_age_seconds: u64,
    /// Interval of the background sweeper; 0 disables it
    pub sweep_interval_seconds: u64,
    /// Run a sweep inline after this many cache or throttle insertions; 0 disables it
    pub inline_sweep_every: usize,
}

impl DedupConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0).then(|| Duration::from_secs(self.sweep_interval_seconds))
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_ms: defaults::DEDUP_WINDOW_MS,
            max_age_seconds: defaults::MAX_AGE_SECONDS,
            sweep_interval_seconds: defaults::SWEEP_INTERVAL_SECONDS,
            inline_sweep_every: defaults::INLINE_SWEEP_EVERY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub interval_ms: u64,
}

impl ThrottleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            interval_ms: defaults::THROTTLE_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub attempt_timeout_ms: Option<u64>,
}

impl RetryConfig {
    /// Build a retry policy with the standard error classifier
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            attempt_timeout: self.attempt_timeout_ms.map(Duration::from_millis),
            ..RetryPolicy::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            backoff_factor: defaults::RETRY_BACKOFF_FACTOR,
            attempt_timeout_ms: None,
        }
    }
}

/// Circuit breaker configuration for every remote service endpoint
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Whether circuit breakers gate attempts at all
    pub enabled: bool,

    /// Soft limit; exceeding it only logs a warning
    pub max_circuit_breakers: usize,

    /// Default configuration for new circuit breakers
    pub default_config: CircuitBreakerComponentConfig,

    /// Specific configurations for named services
    pub component_configs: HashMap<String, CircuitBreakerComponentConfig>,
}

impl CircuitBreakerSettings {
    /// Get configuration for a specific service
    pub fn config_for_component(&self, component_name: &str) -> CircuitBreakerComponentConfig {
        self.component_configs
            .get(component_name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_circuit_breakers: defaults::MAX_CIRCUIT_BREAKERS,
            default_config: CircuitBreakerComponentConfig::default(),
            component_configs: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerComponentConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_seconds: u64,
}

impl CircuitBreakerComponentConfig {
    /// Convert to resilience module's CircuitBreakerConfig
    pub fn to_resilience_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_seconds),
        }
    }
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::BREAKER_FAILURE_THRESHOLD,
            recovery_timeout_seconds: defaults::BREAKER_RECOVERY_TIMEOUT_SECONDS,
        }
    }
}

impl CoordinatorConfig {
    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.batch.max_batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch.max_batch_size",
                "0",
                "batch size must be greater than 0",
            ));
        }

        if self.batch.wait_timeout_ms == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "batch.wait_timeout_ms",
                "0",
                "wait timeout must be greater than 0 when set",
            ));
        }

        if self.dedup.max_age_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "dedup.max_age_seconds",
                "0",
                "max age must be greater than 0",
            ));
        }

        self.retry
            .to_policy()
            .validate()
            .map_err(|reason| ConfigurationError::validation_error(format!("retry: {reason}")))?;

        let breakers = &self.circuit_breakers;
        if breakers.max_circuit_breakers == 0 {
            return Err(ConfigurationError::invalid_value(
                "circuit_breakers.max_circuit_breakers",
                "0",
                "at least one circuit breaker must be allowed",
            ));
        }

        std::iter::once(("default_config", &breakers.default_config))
            .chain(
                breakers
                    .component_configs
                    .iter()
                    .map(|(name, config)| (name.as_str(), config)),
            )
            .try_for_each(|(name, config)| {
                config.to_resilience_config().validate().map_err(|reason| {
                    ConfigurationError::validation_error(format!(
                        "circuit_breakers.{name}: {reason}"
                    ))
                })
            })
    }
}
