//! # System Constants
//!
//! Default values and well-known names that define the operational boundaries of
//! the coordination layer. Configuration files override every value here; these
//! are the fallbacks used by `Default` implementations.

/// Default timing and sizing values
pub mod defaults {
    /// Accumulation window for a pending group
    pub const BATCH_DELAY_MS: u64 = 50;
    /// Waiter count that flushes a pending group early
    pub const MAX_BATCH_SIZE: usize = 10;
    /// Window in which a cached success short-circuits a repeat read
    pub const DEDUP_WINDOW_MS: u64 = 1_000;
    /// Age after which cache and throttle entries are swept
    pub const MAX_AGE_SECONDS: u64 = 5 * 60;
    /// Interval of the background sweeper
    pub const SWEEP_INTERVAL_SECONDS: u64 = 5 * 60;
    /// Cache and throttle insertions between sweeps run inline by the coordinator
    pub const INLINE_SWEEP_EVERY: usize = 1_024;
    /// Minimum spacing between throttled calls with the same signature
    pub const THROTTLE_INTERVAL_MS: u64 = 500;

    pub const RETRY_MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 1_000;
    pub const RETRY_MAX_DELAY_MS: u64 = 10_000;
    pub const RETRY_BACKOFF_FACTOR: f64 = 2.0;

    pub const BREAKER_FAILURE_THRESHOLD: u32 = 5;
    pub const BREAKER_RECOVERY_TIMEOUT_SECONDS: u64 = 30;
    pub const MAX_CIRCUIT_BREAKERS: usize = 50;
}

/// Well-known names
pub mod system {
    /// Service name used when a request does not name its remote endpoint
    pub const DEFAULT_SERVICE: &str = "default";
    /// Prefix of environment variables that override configuration
    pub const ENV_PREFIX: &str = "REQCOORD";
    /// Environment variable that selects the configuration environment
    pub const ENVIRONMENT_VAR: &str = "REQCOORD_ENV";
    /// Default configuration file name, resolved under `config/`
    pub const CONFIG_FILE_NAME: &str = "coordinator.toml";
}

/// HTTP status codes the standard classifier treats specially
pub mod status {
    pub const UNAUTHORIZED: u16 = 401;
    pub const FORBIDDEN: u16 = 403;
    pub const REQUEST_TIMEOUT: u16 = 408;
    pub const TOO_MANY_REQUESTS: u16 = 429;
}
