//! Shared helpers for integration tests

#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use parking_lot::Mutex;
use request_coordinator::config::CircuitBreakerComponentConfig;
use request_coordinator::{CoordinatorConfig, RemoteError, RemoteService, RequestDescriptor};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Remote service that replays scripted failures, then succeeds
#[derive(Debug, Default)]
pub struct ScriptedService {
    calls: AtomicU32,
    latency: Duration,
    script: Mutex<VecDeque<RemoteError>>,
    /// Every call fails with this error once the script is exhausted
    persistent_failure: Mutex<Option<RemoteError>>,
    seen: Mutex<Vec<RequestDescriptor>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Fail the next calls with these errors, in order
    pub fn fail_next(&self, errors: impl IntoIterator<Item = RemoteError>) {
        self.script.lock().extend(errors);
    }

    pub fn fail_always(&self, error: RemoteError) {
        *self.persistent_failure.lock() = Some(error);
    }

    pub fn recover(&self) {
        self.script.lock().clear();
        *self.persistent_failure.lock() = None;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_paths(&self) -> Vec<String> {
        self.seen.lock().iter().map(|r| r.path.clone()).collect()
    }
}

#[async_trait]
impl RemoteService for ScriptedService {
    type Payload = Value;

    async fn call(&self, request: &RequestDescriptor) -> Result<Value, RemoteError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().push(request.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = self.script.lock().pop_front() {
            return Err(error);
        }
        if let Some(error) = self.persistent_failure.lock().clone() {
            return Err(error);
        }

        Ok(json!({
            "service": request.service,
            "path": request.path,
            "call": call,
        }))
    }
}

/// Configuration with short retry delays and a sweeper-free setup
pub fn fast_config() -> CoordinatorConfig {
    let mut config = CoordinatorConfig::default();
    config.retry.base_delay_ms = 100;
    config.retry.max_delay_ms = 1_000;
    config.dedup.sweep_interval_seconds = 0;
    config.circuit_breakers.default_config = CircuitBreakerComponentConfig {
        failure_threshold: 5,
        recovery_timeout_seconds: 30,
    };
    config
}
