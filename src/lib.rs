#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Request Coordinator
//!
//! In-process coordination and resilience layer for calls to a remote service.
//!
//! ## Overview
//!
//! Many independent call sites tend to request the same data within a short
//! window. This crate sits between them and the remote service and:
//!
//! - collapses concurrent identical reads into one network call (single-flight)
//! - answers repeat reads from a short-lived deduplication cache
//! - rate-limits noisy call sites per request signature
//! - retries transient failures with bounded exponential backoff
//! - stops calling a persistently failing service via per-service circuit breakers
//!
//! Every caller still receives its own result or error.
//!
//! ## Module Organization
//!
//! - [`signature`] - Request descriptors and their identity keys
//! - [`coordination`] - Dedup cache, throttle limiter, batch coordinator and the coordinator
//! - [`resilience`] - Error classification, retry executor and circuit breakers
//! - [`client`] - Coordinated client over a [`remote::RemoteService`]
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use request_coordinator::{CallOptions, RequestCoordinator, RequestDescriptor};
//! use request_coordinator::remote::RemoteError;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator: RequestCoordinator = RequestCoordinator::new();
//! let op = RequestDescriptor::get("/api/leads");
//!
//! let leads = coordinator
//!     .batch(&op, CallOptions::new(), || async {
//!         Ok::<_, RemoteError>(json!([{ "id": 1 }]))
//!     })
//!     .await?;
//!
//! println!("{leads} / {:?}", coordinator.stats());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod coordination;
pub mod error;
pub mod logging;
pub mod remote;
pub mod resilience;
pub mod signature;

pub use client::CoordinatedClient;
pub use config::{ConfigManager, ConfigurationError, CoordinatorConfig};
pub use coordination::{CallOptions, CoordinatorStats, RequestCoordinator};
pub use error::{CoordinatorError, CoordinatorResult};
pub use remote::{RemoteError, RemoteService};
pub use resilience::{CircuitState, RetryPolicy};
pub use signature::{Method, RequestDescriptor, RequestSignature};
