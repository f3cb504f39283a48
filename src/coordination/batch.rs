//! # Batch Coordinator
//!
//! Single-flight grouping of concurrent calls that share a signature.
//!
//! The first caller for a signature opens an accumulating group and arms a
//! `delay` timer; later callers attach as waiters. The group starts executing
//! when the timer fires or when `max_batch_size` waiters are attached,
//! whichever comes first. Exactly one representative operation runs per group
//! and its outcome is delivered to every waiter.
//!
//! The group table only holds accumulating groups. A group leaves the table
//! the moment it starts executing, so a caller arriving afterwards opens a new
//! group instead of joining one whose operation is already in flight.
//!
//! Execution happens on its own task: a caller that stops waiting (dropped
//! future or wait timeout) never cancels the group for the other waiters. An
//! operation that panics takes its task down with it; every waiter then
//! receives [`CoordinatorError::Internal`].

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::signature::RequestSignature;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Grouping parameters for one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub delay: Duration,
    /// Waiter count that starts execution early; values below 1 act as 1
    pub max_batch_size: usize,
    /// Longest this caller waits for the group outcome
    pub wait_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Accumulating,
    Executing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushReason {
    DelayElapsed,
    BatchFull,
}

type Waiter<T> = oneshot::Sender<CoordinatorResult<T>>;

struct PendingGroup<T> {
    id: u64,
    signature: RequestSignature,
    created_at: Instant,
    state: GroupState,
    waiters: Vec<Waiter<T>>,
    timer: Option<JoinHandle<()>>,
    operation: Option<BoxFuture<'static, CoordinatorResult<T>>>,
}

impl<T: Clone> PendingGroup<T> {
    /// Deliver the shared outcome to every waiter still listening
    fn resolve(&mut self, outcome: CoordinatorResult<T>) -> usize {
        let mut delivered = 0;
        for waiter in self.waiters.drain(..) {
            if waiter.send(outcome.clone()).is_ok() {
                delivered += 1;
            }
        }
        self.state = GroupState::Done;
        delivered
    }
}

struct BatchInner<T> {
    groups: Mutex<HashMap<RequestSignature, PendingGroup<T>>>,
    next_group_id: AtomicU64,
    executions: AtomicU64,
}

/// Single-flight batch coordinator
pub struct BatchCoordinator<T> {
    inner: Arc<BatchInner<T>>,
}

impl<T> Clone for BatchCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for BatchCoordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("pending_groups", &self.inner.groups.lock().len())
            .field("executions", &self.inner.executions.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> Default for BatchCoordinator<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BatchCoordinator<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BatchInner {
                groups: Mutex::new(HashMap::new()),
                next_group_id: AtomicU64::new(1),
                executions: AtomicU64::new(0),
            }),
        }
    }

    /// Join the accumulating group for `signature`, or open one whose
    /// representative operation is built by `operation`
    ///
    /// `operation` is only invoked when this call opens a new group.
    pub async fn submit<F, Fut>(
        &self,
        signature: RequestSignature,
        plan: &BatchPlan,
        operation: F,
    ) -> CoordinatorResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoordinatorResult<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let max_batch_size = plan.max_batch_size.max(1);

        let full_group = {
            let mut groups = self.inner.groups.lock();

            match groups.get_mut(&signature) {
                Some(group) => {
                    group.waiters.push(sender);
                    debug!(
                        signature = %signature,
                        group_id = group.id,
                        waiters = group.waiters.len(),
                        "🔗 Joined pending group"
                    );
                    (group.waiters.len() >= max_batch_size).then_some(group.id)
                }
                None => {
                    let id = self.inner.next_group_id.fetch_add(1, Ordering::Relaxed);
                    let mut group = PendingGroup {
                        id,
                        signature: signature.clone(),
                        created_at: Instant::now(),
                        state: GroupState::Accumulating,
                        waiters: vec![sender],
                        timer: None,
                        operation: Some(Box::pin(operation())),
                    };

                    if max_batch_size > 1 {
                        let inner = Arc::clone(&self.inner);
                        let timer_signature = signature.clone();
                        let delay = plan.delay;
                        group.timer = Some(tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            inner.flush(&timer_signature, id, FlushReason::DelayElapsed);
                        }));
                    }

                    debug!(
                        signature = %signature,
                        group_id = id,
                        delay_ms = plan.delay.as_millis() as u64,
                        "📦 Opened pending group"
                    );
                    groups.insert(signature.clone(), group);

                    (max_batch_size <= 1).then_some(id)
                }
            }
        };

        if let Some(group_id) = full_group {
            self.inner
                .flush(&signature, group_id, FlushReason::BatchFull);
        }

        let outcome = match plan.wait_timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    debug!(signature = %signature, "⏰ Stopped waiting on pending group");
                    return Err(CoordinatorError::WaitTimeout {
                        signature: signature.to_string(),
                        waited: limit,
                    });
                }
            },
            None => receiver.await,
        };

        outcome.unwrap_or_else(|_| {
            Err(CoordinatorError::Internal(format!(
                "group for {signature} ended without delivering an outcome"
            )))
        })
    }

    /// Number of groups still accumulating waiters
    pub fn pending_groups(&self) -> usize {
        self.inner.groups.lock().len()
    }

    /// Number of groups that have started executing
    pub fn executions(&self) -> u64 {
        self.inner.executions.load(Ordering::Relaxed)
    }
}

impl<T> BatchInner<T>
where
    T: Clone + Send + 'static,
{
    /// Move group `group_id` from accumulating to executing, if it still is
    fn flush(&self, signature: &RequestSignature, group_id: u64, reason: FlushReason) {
        let group = {
            let mut groups = self.groups.lock();
            match groups.get(signature) {
                Some(group) if group.id == group_id => groups.remove(signature),
                _ => None,
            }
        };

        let Some(mut group) = group else {
            return;
        };

        if let Some(timer) = group.timer.take() {
            if reason == FlushReason::BatchFull {
                timer.abort();
            }
        }

        let Some(operation) = group.operation.take() else {
            warn!(signature = %signature, group_id, "Pending group had no operation");
            group.resolve(Err(CoordinatorError::Internal(format!(
                "group for {signature} had no operation"
            ))));
            return;
        };

        group.state = GroupState::Executing;
        self.executions.fetch_add(1, Ordering::Relaxed);

        debug!(
            signature = %group.signature,
            group_id,
            waiters = group.waiters.len(),
            accumulated_ms = group.created_at.elapsed().as_millis() as u64,
            reason = ?reason,
            "🚀 Executing pending group"
        );

        tokio::spawn(async move {
            let outcome = operation.await;
            let succeeded = outcome.is_ok();
            let delivered = group.resolve(outcome);

            debug!(
                signature = %group.signature,
                group_id = group.id,
                state = ?group.state,
                succeeded,
                delivered,
                "📬 Pending group settled"
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteError;
    use crate::signature::RequestDescriptor;
    use std::sync::atomic::AtomicU32;

    fn plan(delay_ms: u64, max_batch_size: usize) -> BatchPlan {
        BatchPlan {
            delay: Duration::from_millis(delay_ms),
            max_batch_size,
            wait_timeout: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_execution() {
        let batches = BatchCoordinator::<u32>::new();
        let calls = Arc::new(AtomicU32::new(0));
        let signature = RequestDescriptor::get("/api/leads").signature();

        let submissions = (0..5).map(|_| {
            let calls = Arc::clone(&calls);
            let batches = batches.clone();
            let signature = signature.clone();
            async move {
                batches
                    .submit(signature, &plan(50, 10), move || async move {
                        Ok(calls.fetch_add(1, Ordering::SeqCst) + 100)
                    })
                    .await
            }
        });

        let results = futures::future::join_all(submissions).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|result| result == &Ok(100)));
        assert_eq!(batches.executions(), 1);
        assert_eq!(batches.pending_groups(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_fans_out_identically() {
        let batches = BatchCoordinator::<u32>::new();
        let signature = RequestDescriptor::get("/api/leads").signature();
        let failure = CoordinatorError::OperationFailed {
            attempts: 1,
            elapsed: Duration::ZERO,
            last_error: RemoteError::status(401, "unauthorized"),
        };

        let expected = failure.clone();
        let plan_a = plan(50, 10);
        let plan_b = plan(50, 10);
        let (first, second) = tokio::join!(
            batches.submit(signature.clone(), &plan_a, move || async move {
                Err(expected)
            }),
            batches.submit(signature.clone(), &plan_b, || async {
                Ok(7)
            }),
        );

        assert_eq!(first, Err(failure.clone()));
        assert_eq!(second, Err(failure));
        assert_eq!(batches.executions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_group_flushes_before_delay() {
        let batches = BatchCoordinator::<u32>::new();
        let signature = RequestDescriptor::get("/api/leads").signature();
        let started = Instant::now();

        let plan_a = plan(10_000, 2);
        let plan_b = plan(10_000, 2);
        let (first, second) = tokio::join!(
            batches.submit(signature.clone(), &plan_a, || async { Ok(1) }),
            batches.submit(signature.clone(), &plan_b, || async { Ok(2) }),
        );

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(1));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_caller_opens_new_group() {
        let batches = BatchCoordinator::<u32>::new();
        let calls = Arc::new(AtomicU32::new(0));
        let signature = RequestDescriptor::get("/api/leads").signature();

        let slow = {
            let calls = Arc::clone(&calls);
            move || async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(calls.fetch_add(1, Ordering::SeqCst))
            }
        };
        let first = tokio::spawn({
            let batches = batches.clone();
            let signature = signature.clone();
            async move { batches.submit(signature, &plan(50, 10), slow).await }
        });

        // First group is executing by now
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(batches.pending_groups(), 0);

        let calls_late = Arc::clone(&calls);
        let second = batches
            .submit(signature.clone(), &plan(50, 10), move || async move {
                Ok(calls_late.fetch_add(1, Ordering::SeqCst))
            })
            .await;

        // The second group settles first: its operation is not delayed
        assert_eq!(second, Ok(0));
        assert_eq!(first.await.unwrap(), Ok(1));
        assert_eq!(batches.executions(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_does_not_cancel_group() {
        let batches = BatchCoordinator::<u32>::new();
        let signature = RequestDescriptor::get("/api/leads").signature();
        let impatient = BatchPlan {
            wait_timeout: Some(Duration::from_millis(100)),
            ..plan(50, 10)
        };

        let patient = plan(50, 10);
        let (first, second) = tokio::join!(
            batches.submit(signature.clone(), &impatient, || async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(9)
            }),
            batches.submit(signature.clone(), &patient, || async { Ok(0) }),
        );

        assert!(matches!(first, Err(CoordinatorError::WaitTimeout { .. })));
        assert_eq!(second, Ok(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_operation_reports_internal_error() {
        let batches = BatchCoordinator::<u32>::new();
        let signature = RequestDescriptor::get("/api/leads").signature();

        let result = batches
            .submit(signature, &plan(0, 10), || async {
                if true {
                    panic!("operation blew up");
                }
                Ok(1)
            })
            .await;

        assert!(matches!(result, Err(CoordinatorError::Internal(_))));
    }
}
