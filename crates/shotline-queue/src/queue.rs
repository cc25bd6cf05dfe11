//! Concurrency-limited operation queue.
//!
//! Operations are admitted FIFO up to `max_concurrent` at a time. Operations
//! added with a positive priority go to a separate lane that is always
//! drained first; each lane is FIFO (two tiers only, not a heap).

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::retry::RetryConfig;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of operations in flight at once
    pub max_concurrent: usize,
    /// Retry policy applied to every backend call
    pub retry: RetryConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            retry: RetryConfig::new("generate"),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent: std::env::var("SHOTLINE_MAX_CONCURRENT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            retry: RetryConfig::from_env("generate"),
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.retry.base_delay = base_delay;
        self
    }
}

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
struct QueueState {
    priority: VecDeque<Job>,
    pending: VecDeque<Job>,
    running: usize,
    paused: bool,
}

struct Inner {
    max_concurrent: usize,
    state: Mutex<QueueState>,
}

/// Admits queued operations into execution up to a fixed ceiling.
///
/// Cloning is cheap; clones share the same queue. Must be used from within a
/// Tokio runtime, since admitted operations are spawned as tasks.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl TaskQueue {
    /// Create a queue admitting at most `max_concurrent` operations (min 1).
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_concurrent: max_concurrent.max(1),
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Enqueue `operation` and return a future resolving to its output.
    ///
    /// The operation is queued immediately, whether or not the returned
    /// future is polled. It resolves to [`QueueError::Cancelled`] if the
    /// operation is dropped by [`TaskQueue::clear`] before it runs.
    pub fn add<F, Fut, T>(
        &self,
        operation: F,
        priority: i32,
    ) -> impl Future<Output = QueueResult<T>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let output = operation().await;
                let _ = tx.send(output);
            })
        });

        {
            let mut state = self.inner.state.lock();
            if priority > 0 {
                state.priority.push_back(job);
            } else {
                state.pending.push_back(job);
            }
        }

        Inner::dispatch(&self.inner);

        async move { rx.await.map_err(|_| QueueError::Cancelled) }
    }

    /// Number of operations waiting to run.
    pub fn pending(&self) -> usize {
        let state = self.inner.state.lock();
        state.priority.len() + state.pending.len()
    }

    /// Number of operations currently running.
    pub fn active(&self) -> usize {
        self.inner.state.lock().running
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// Stop admitting pending operations. Running ones are unaffected.
    pub fn pause(&self) {
        self.inner.state.lock().paused = true;
    }

    /// Resume admission.
    pub fn resume(&self) {
        self.inner.state.lock().paused = false;
        Inner::dispatch(&self.inner);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    /// Drop every pending operation, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped: Vec<Job> = {
            let mut state = self.inner.state.lock();
            let mut jobs: Vec<Job> = state.priority.drain(..).collect();
            jobs.extend(state.pending.drain(..));
            jobs
        };
        let count = dropped.len();
        drop(dropped);
        if count > 0 {
            debug!(dropped = count, "Cleared pending queue operations");
        }
        count
    }
}

impl Inner {
    /// Start pending jobs while there is capacity.
    fn dispatch(inner: &Arc<Inner>) {
        // Slots can be released while a runtime is shutting down.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        loop {
            let job = {
                let mut state = inner.state.lock();
                if state.paused || state.running >= inner.max_concurrent {
                    return;
                }
                let next = match state.priority.pop_front() {
                    Some(job) => Some(job),
                    None => state.pending.pop_front(),
                };
                match next {
                    Some(job) => {
                        state.running += 1;
                        job
                    }
                    None => return,
                }
            };

            let slot = SlotGuard(Arc::clone(inner));
            runtime.spawn(async move {
                let _slot = slot;
                job().await;
            });
        }
    }
}

/// Releases one running slot when the operation settles, even on panic.
struct SlotGuard(Arc<Inner>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        {
            let mut state = self.0.state.lock();
            state.running = state.running.saturating_sub(1);
        }
        Inner::dispatch(&self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_ceiling_and_fifo() {
        let queue = TaskQueue::new(2);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            let order = Arc::clone(&order);
            handles.push(queue.add(
                move || async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    order.lock().push(i);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    i * 10
                },
                0,
            ));
        }

        assert!(queue.active() <= 2);
        let results = futures::future::join_all(handles).await;

        let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40]);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.active(), 0);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_priority_jumps_to_front() {
        let queue = TaskQueue::new(1);
        queue.pause();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for (name, priority) in [("a", 0), ("urgent", 1), ("b", 0), ("also-urgent", 2)] {
            let order = Arc::clone(&order);
            handles.push(queue.add(move || async move { order.lock().push(name) }, priority));
        }
        assert_eq!(queue.pending(), 4);

        queue.resume();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock(), vec!["urgent", "also-urgent", "a", "b"]);
    }

    #[tokio::test]
    async fn test_clear_cancels_pending() {
        let queue = TaskQueue::new(1);
        queue.pause();

        let first = queue.add(|| async { 1 }, 0);
        let second = queue.add(|| async { 2 }, 0);
        assert_eq!(queue.clear(), 2);

        assert!(matches!(first.await, Err(QueueError::Cancelled)));
        assert!(matches!(second.await, Err(QueueError::Cancelled)));
    }

    #[tokio::test]
    async fn test_clear_drops_both_lanes() {
        let queue = TaskQueue::new(1);
        queue.pause();

        let normal = queue.add(|| async { 1 }, 0);
        let urgent = queue.add(|| async { 2 }, 1);
        assert_eq!(queue.pending(), 2);
        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.pending(), 0);

        assert!(matches!(normal.await, Err(QueueError::Cancelled)));
        assert!(matches!(urgent.await, Err(QueueError::Cancelled)));
    }

    #[tokio::test]
    async fn test_panicking_operation_releases_slot() {
        let queue = TaskQueue::new(1);

        let failed = queue.add(|| async { panic!("boom") }, 0);
        let next = queue.add(|| async { "ok" }, 0);

        tokio_test::assert_err!(failed.await);
        assert_eq!(tokio_test::assert_ok!(next.await), "ok");
        assert_eq!(queue.active(), 0);
    }

    #[test]
    fn test_zero_ceiling_clamped() {
        assert_eq!(TaskQueue::new(0).max_concurrent(), 1);
    }
}
