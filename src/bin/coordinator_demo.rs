//! # Coordinator Demo
//!
//! Drives a simulated flaky remote service through every coordinator entry
//! point and prints the resulting statistics as JSON.
//!
//! Usage: `coordinator-demo [CONFIG_DIR]`

use anyhow::Context;
use async_trait::async_trait;
use request_coordinator::logging::init_structured_logging;
use request_coordinator::{
    ConfigManager, CoordinatedClient, CoordinatorConfig, RemoteError, RemoteService,
    RequestCoordinator, RequestDescriptor,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Fails every third call with a 503 and rejects the `auth` service with 401
#[derive(Debug, Default)]
struct FlakyService {
    calls: AtomicU32,
}

#[async_trait]
impl RemoteService for FlakyService {
    type Payload = Value;

    async fn call(&self, request: &RequestDescriptor) -> Result<Value, RemoteError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(20)).await;

        if request.service == "auth" {
            return Err(RemoteError::status(401, "session expired"));
        }
        if call % 3 == 0 {
            return Err(RemoteError::status(503, "upstream unavailable"));
        }

        Ok(json!({
            "method": request.method.as_str(),
            "path": request.path,
            "call": call,
        }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let config_dir = std::env::args().nth(1).map(PathBuf::from);
    let config = match ConfigManager::load_from_directory(config_dir) {
        Ok(manager) => manager.config().clone(),
        Err(e) => {
            warn!("Configuration loading failed, using defaults: {e}");
            CoordinatorConfig::default()
        }
    };

    let coordinator = RequestCoordinator::from_config(&config);
    let _sweeper = coordinator.spawn_sweeper();
    let client = CoordinatedClient::new(FlakyService::default(), coordinator.clone());

    // Concurrent identical reads collapse into one remote call
    let reads = (0..5).map(|_| client.get("/api/leads"));
    let results = futures::future::join_all(reads).await;
    info!(succeeded = results.iter().filter(|r| r.is_ok()).count(), "Concurrent reads settled");

    // A repeat inside the dedup window is answered from the cache
    let cached = client.get("/api/leads").await.context("cached read")?;
    info!(%cached, "Repeat read");

    let event = RequestDescriptor::post("/api/analytics/track", json!({ "event": "page_view" }));
    for attempt in 1..=2 {
        match client.throttle(event.clone()).await {
            Ok(_) => info!(attempt, "Analytics event sent"),
            Err(e) if e.is_try_again_later() => info!(attempt, "Analytics event deferred: {e}"),
            Err(e) => warn!(attempt, "Analytics event failed: {e}"),
        }
    }

    let created = client
        .send(RequestDescriptor::post("/api/leads", json!({ "name": "Ada Lovelace" })))
        .await;
    info!(ok = created.is_ok(), "Mutating call settled");

    match client
        .fetch(RequestDescriptor::get("/api/session").for_service("auth"))
        .await
    {
        Ok(_) => warn!("Auth service unexpectedly accepted the session"),
        Err(e) => info!(attempts = e.attempts(), "Non-retryable failure: {e}"),
    }

    let stats = serde_json::to_string_pretty(&coordinator.stats())?;
    println!("{stats}");

    Ok(())
}
