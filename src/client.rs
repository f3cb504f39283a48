//! # Coordinated Client
//!
//! Wraps a [`RemoteService`] so call sites describe requests instead of
//! building thunks: every call goes through the shared [`RequestCoordinator`].

use crate::coordination::{CallOptions, RequestCoordinator};
use crate::error::CoordinatorResult;
use crate::remote::{RemoteError, RemoteService};
use crate::signature::RequestDescriptor;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

pub struct CoordinatedClient<S: RemoteService> {
    service: Arc<S>,
    coordinator: RequestCoordinator<S::Payload>,
}

impl<S: RemoteService> Clone for CoordinatedClient<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<S: RemoteService> std::fmt::Debug for CoordinatedClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatedClient")
            .field("stats", &self.coordinator.stats())
            .finish()
    }
}

impl<S: RemoteService> CoordinatedClient<S> {
    pub fn new(service: S, coordinator: RequestCoordinator<S::Payload>) -> Self {
        Self::from_arc(Arc::new(service), coordinator)
    }

    pub fn from_arc(service: Arc<S>, coordinator: RequestCoordinator<S::Payload>) -> Self {
        Self {
            service,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &RequestCoordinator<S::Payload> {
        &self.coordinator
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Shareable GET on the default service
    pub async fn get(&self, path: &str) -> CoordinatorResult<S::Payload> {
        self.fetch(RequestDescriptor::get(path)).await
    }

    /// Dedup and batch path with configured defaults
    pub async fn fetch(&self, request: RequestDescriptor) -> CoordinatorResult<S::Payload> {
        self.fetch_with(request, CallOptions::default()).await
    }

    pub async fn fetch_with(
        &self,
        request: RequestDescriptor,
        options: CallOptions,
    ) -> CoordinatorResult<S::Payload> {
        let thunk = self.thunk(&request);
        self.coordinator.batch(&request, options, thunk).await
    }

    pub async fn dedupe(
        &self,
        request: RequestDescriptor,
        window: Duration,
    ) -> CoordinatorResult<S::Payload> {
        let thunk = self.thunk(&request);
        self.coordinator.dedupe(&request, window, thunk).await
    }

    /// Throttle path with the configured interval
    pub async fn throttle(&self, request: RequestDescriptor) -> CoordinatorResult<S::Payload> {
        let interval = self.coordinator.config().throttle.interval();
        self.throttle_every(request, interval).await
    }

    pub async fn throttle_every(
        &self,
        request: RequestDescriptor,
        interval: Duration,
    ) -> CoordinatorResult<S::Payload> {
        let thunk = self.thunk(&request);
        self.coordinator.throttle(&request, interval, thunk).await
    }

    /// Individual path for mutating calls: retry and circuit breaker only
    pub async fn send(&self, request: RequestDescriptor) -> CoordinatorResult<S::Payload> {
        let thunk = self.thunk(&request);
        self.coordinator
            .execute(&request, CallOptions::default(), thunk)
            .await
    }

    fn thunk(
        &self,
        request: &RequestDescriptor,
    ) -> impl FnMut() -> BoxFuture<'static, Result<S::Payload, RemoteError>> + Send + 'static
    {
        let service = Arc::clone(&self.service);
        let request = Arc::new(request.clone());

        move || {
            let service = Arc::clone(&service);
            let request = Arc::clone(&request);
            Box::pin(async move { service.call(&request).await })
        }
    }
}
