//! # Request Coordinator
//!
//! The coordination object every call site goes through. It owns the dedup
//! cache, the throttle table, the pending group table and the per-service
//! circuit breakers, and exposes the entry points:
//!
//! - [`RequestCoordinator::batch`]: dedup cache, then single-flight grouping,
//!   then retry under the service's circuit breaker
//! - [`RequestCoordinator::dedupe`]: `batch` with an explicit dedup window
//! - [`RequestCoordinator::throttle`]: minimum-interval gate, then retry, no grouping
//! - [`RequestCoordinator::execute`]: retry only, for mutating calls
//!
//! Cloning a coordinator is cheap and shares all state.

use crate::config::CoordinatorConfig;
use crate::coordination::{
    BatchCoordinator, BatchPlan, BreakerSnapshot, CoordinatorStats, DedupCache, ThrottleLimiter,
};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::logging::log_coordination_operation;
use crate::remote::RemoteError;
use crate::resilience::{CircuitBreakerManager, RetryExecutor, RetryPolicy};
use crate::signature::RequestDescriptor;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Per-call overrides of the configured defaults
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub batch_delay: Option<Duration>,
    pub max_batch_size: Option<usize>,
    pub dedup_window: Option<Duration>,
    pub retry: Option<RetryPolicy>,
    /// Longest this caller waits on its group
    pub wait_timeout: Option<Duration>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = Some(delay);
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Some(max_batch_size);
        self
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = Some(window);
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = Some(wait_timeout);
        self
    }
}

/// Sweep outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub dedup_removed: usize,
    pub throttle_removed: usize,
}

#[derive(Debug, Default)]
struct Counters {
    total_calls: AtomicU64,
    dedup_hits: AtomicU64,
    throttled: AtomicU64,
    circuit_rejections: AtomicU64,
    inserts_since_sweep: AtomicUsize,
}

#[derive(Debug)]
struct CoordinatorInner<T> {
    config: CoordinatorConfig,
    default_policy: RetryPolicy,
    dedup: DedupCache<T>,
    throttle: ThrottleLimiter,
    batches: BatchCoordinator<T>,
    breakers: CircuitBreakerManager,
    executor: RetryExecutor,
    counters: Counters,
}

/// Request coordination and resilience layer in front of one remote service
#[derive(Debug)]
pub struct RequestCoordinator<T = Value> {
    inner: Arc<CoordinatorInner<T>>,
}

impl<T> Clone for RequestCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for RequestCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Coordinator with default configuration
    pub fn new() -> Self {
        Self::from_config(&CoordinatorConfig::default())
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        info!(
            batch_delay_ms = config.batch.delay_ms,
            max_batch_size = config.batch.max_batch_size,
            dedup_window_ms = config.dedup.window_ms,
            throttle_interval_ms = config.throttle.interval_ms,
            "🔀 Initializing request coordinator"
        );

        Self {
            inner: Arc::new(CoordinatorInner {
                config: config.clone(),
                default_policy: config.retry.to_policy(),
                dedup: DedupCache::new(config.dedup.max_age()),
                throttle: ThrottleLimiter::new(),
                batches: BatchCoordinator::new(),
                breakers: CircuitBreakerManager::from_config(&config.circuit_breakers),
                executor: RetryExecutor::new(),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerManager {
        &self.inner.breakers
    }

    /// Retry policy used when a call does not supply its own
    pub fn default_retry_policy(&self) -> &RetryPolicy {
        &self.inner.default_policy
    }

    /// Shareable reads go through the dedup cache and single-flight grouping;
    /// other calls take the [`execute`](Self::execute) path
    pub async fn batch<F, Fut>(
        &self,
        op: &RequestDescriptor,
        options: CallOptions,
        thunk: F,
    ) -> CoordinatorResult<T>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        self.inner.counters.total_calls.fetch_add(1, Ordering::Relaxed);

        if !op.is_shareable() {
            debug!(method = %op.method, path = %op.path, "Mutating call bypasses batching");
            let policy = self.policy_for(&options);
            return self.inner.execute_with_retry(op, &policy, thunk).await;
        }

        let signature = op.signature();
        let config = &self.inner.config;
        let window = options.dedup_window.unwrap_or_else(|| config.dedup.window());

        if let Some(value) = self.inner.dedup.get(&signature, window, Instant::now()) {
            self.inner.counters.dedup_hits.fetch_add(1, Ordering::Relaxed);
            debug!(signature = %signature, "♻️ Dedup cache hit");
            return Ok(value);
        }

        let plan = BatchPlan {
            delay: options.batch_delay.unwrap_or_else(|| config.batch.delay()),
            max_batch_size: options
                .max_batch_size
                .unwrap_or(config.batch.max_batch_size),
            wait_timeout: options.wait_timeout.or_else(|| config.batch.wait_timeout()),
        };

        let policy = self.policy_for(&options);
        let inner = Arc::clone(&self.inner);
        let op = op.clone();
        let cache_key = signature.clone();

        self.inner
            .batches
            .submit(signature, &plan, move || async move {
                let value = inner.execute_with_retry(&op, &policy, thunk).await?;
                // Cached before the outcome reaches any waiter
                inner.dedup.put(cache_key, value.clone());
                inner.note_insert();
                Ok(value)
            })
            .await
    }

    /// `batch` with an explicit dedup window, for near-duplicate bursts
    pub async fn dedupe<F, Fut>(
        &self,
        op: &RequestDescriptor,
        window: Duration,
        thunk: F,
    ) -> CoordinatorResult<T>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        self.batch(op, CallOptions::new().with_dedup_window(window), thunk)
            .await
    }

    /// Reject the call as `Throttled` when a call with the same signature was
    /// allowed less than `interval` ago; otherwise run it with retry
    pub async fn throttle<F, Fut>(
        &self,
        op: &RequestDescriptor,
        interval: Duration,
        thunk: F,
    ) -> CoordinatorResult<T>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        self.inner.counters.total_calls.fetch_add(1, Ordering::Relaxed);

        let signature = op.signature();
        if let Err(retry_after) = self
            .inner
            .throttle
            .try_acquire(&signature, interval, Instant::now())
        {
            self.inner.counters.throttled.fetch_add(1, Ordering::Relaxed);
            debug!(
                signature = %signature,
                retry_after_ms = retry_after.as_millis() as u64,
                "🚦 Call throttled"
            );
            return Err(CoordinatorError::Throttled {
                signature: signature.to_string(),
                retry_after,
            });
        }

        self.inner.note_insert();

        let policy = self.inner.default_policy.clone();
        self.inner.execute_with_retry(op, &policy, thunk).await
    }

    /// Run a single call with retry under its service's circuit breaker,
    /// without dedup or grouping
    pub async fn execute<F, Fut>(
        &self,
        op: &RequestDescriptor,
        options: CallOptions,
        thunk: F,
    ) -> CoordinatorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        self.inner.counters.total_calls.fetch_add(1, Ordering::Relaxed);
        let policy = self.policy_for(&options);
        self.inner.execute_with_retry(op, &policy, thunk).await
    }

    pub fn stats(&self) -> CoordinatorStats {
        let counters = &self.inner.counters;
        let system_metrics = self.inner.breakers.get_system_metrics();

        CoordinatorStats {
            total_calls: counters.total_calls.load(Ordering::Relaxed),
            dedup_hits: counters.dedup_hits.load(Ordering::Relaxed),
            batch_executions: self.inner.batches.executions(),
            throttled_rejections: counters.throttled.load(Ordering::Relaxed),
            circuit_rejections: counters.circuit_rejections.load(Ordering::Relaxed),
            pending_groups: self.inner.batches.pending_groups(),
            dedup_cache_size: self.inner.dedup.len(),
            throttle_entries: self.inner.throttle.len(),
            breakers: system_metrics
                .circuit_breakers
                .iter()
                .map(|(name, metrics)| (name.clone(), BreakerSnapshot::from(metrics)))
                .collect(),
        }
    }

    /// Remove dedup and throttle entries older than the configured max age
    pub fn sweep(&self) -> SweepReport {
        self.inner.sweep(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        self.inner.sweep(now)
    }

    /// Start the periodic sweeper; it stops once every coordinator handle is dropped
    ///
    /// Returns `None` when the sweep interval is configured as 0.
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let period = self.inner.config.dedup.sweep_interval()?;
        let weak: Weak<CoordinatorInner<T>> = Arc::downgrade(&self.inner);

        info!(interval_seconds = period.as_secs(), "🧹 Starting background sweeper");

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("Coordinator dropped, stopping sweeper");
                    break;
                };
                inner.sweep(Instant::now());
            }
        }))
    }

    fn policy_for(&self, options: &CallOptions) -> RetryPolicy {
        options
            .retry
            .clone()
            .unwrap_or_else(|| self.inner.default_policy.clone())
    }
}

impl<T> CoordinatorInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn execute_with_retry<F, Fut>(
        &self,
        op: &RequestDescriptor,
        policy: &RetryPolicy,
        thunk: F,
    ) -> CoordinatorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let breaker = self
            .breakers
            .is_enabled()
            .then(|| self.breakers.get_circuit_breaker(&op.service));

        let outcome = self.executor.run(policy, breaker.as_deref(), thunk).await;

        match outcome {
            Ok(success) => {
                if success.attempts > 1 {
                    log_coordination_operation(
                        "execute",
                        &op.signature().to_string(),
                        "recovered",
                        Some(success.attempts),
                        Some(success.elapsed.as_millis() as u64),
                        None,
                    );
                }
                Ok(success.value)
            }
            Err(error) => {
                if matches!(error, CoordinatorError::CircuitOpen { .. }) {
                    self.counters
                        .circuit_rejections
                        .fetch_add(1, Ordering::Relaxed);
                }
                log_coordination_operation(
                    "execute",
                    &op.signature().to_string(),
                    "failed",
                    Some(error.attempts()),
                    None,
                    Some(&error.to_string()),
                );
                Err(error)
            }
        }
    }

    /// Count one cache or throttle insertion, sweeping inline every
    /// `dedup.inline_sweep_every` of them so the tables stay bounded without
    /// the background sweeper
    fn note_insert(&self) {
        let every = self.config.dedup.inline_sweep_every;
        if every == 0 {
            return;
        }

        let inserted = self
            .counters
            .inserts_since_sweep
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        if inserted >= every {
            self.counters.inserts_since_sweep.store(0, Ordering::Relaxed);
            self.sweep(Instant::now());
        }
    }

    fn sweep(&self, now: Instant) -> SweepReport {
        let report = SweepReport {
            dedup_removed: self.dedup.sweep(now),
            throttle_removed: self.throttle.sweep(now, self.dedup.max_age()),
        };

        debug!(
            dedup_removed = report.dedup_removed,
            throttle_removed = report.throttle_removed,
            "🧹 Sweep completed"
        );
        report
    }
}
