//! # Coordination Module
//!
//! Collapses duplicate and related calls to the remote service before they
//! reach the resilience layer.
//!
//! ```text
//! caller ──▶ signature ──▶ dedup cache ──hit──▶ cached value
//!                              │ miss
//!                              ▼
//!               throttle gate (throttle path only)
//!                              ▼
//!                  batch coordinator (join / open group)
//!                              ▼
//!                retry executor ──▶ circuit breaker ──▶ remote service
//! ```

pub mod batch;
pub mod coordinator;
pub mod dedup;
pub mod stats;
pub mod throttle;

pub use batch::{BatchCoordinator, BatchPlan, GroupState};
pub use coordinator::{CallOptions, RequestCoordinator, SweepReport};
pub use dedup::DedupCache;
pub use stats::{BreakerSnapshot, CoordinatorStats};
pub use throttle::ThrottleLimiter;
