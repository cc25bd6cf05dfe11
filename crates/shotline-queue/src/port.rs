//! Task submission contract and its queue-backed implementation.
//!
//! Orchestrators only see [`TaskSubmissionPort`]: submit a descriptor, get a
//! [`TaskId`], subscribe to the eventual [`TaskResult`]. The bundled
//! [`QueuedSubmissionPort`] runs every submission through a [`TaskQueue`]
//! and a [`RetryExecutor`] before handing it to a [`TaskBackend`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shotline_models::{TaskDescriptor, TaskId, TaskOutput, TaskResult};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{QueueError, QueueResult, TaskError};
use crate::metrics::{record_finished, record_submitted};
use crate::queue::{QueueConfig, TaskQueue};
use crate::retry::RetryExecutor;

/// The generation service that actually produces assets.
#[async_trait]
pub trait TaskBackend: Send + Sync + 'static {
    async fn generate(&self, descriptor: &TaskDescriptor) -> Result<TaskOutput, TaskError>;
}

#[async_trait]
impl<T: TaskBackend + ?Sized> TaskBackend for Arc<T> {
    async fn generate(&self, descriptor: &TaskDescriptor) -> Result<TaskOutput, TaskError> {
        (**self).generate(descriptor).await
    }
}

/// Contract between the orchestrators and whatever executes their tasks.
///
/// The control methods are best-effort signals.
#[async_trait]
pub trait TaskSubmissionPort: Send + Sync {
    /// Accept a task and return its identifier.
    async fn submit(&self, descriptor: TaskDescriptor) -> QueueResult<TaskId>;

    /// Subscribe to the result of a submitted task. Subscribing after the
    /// result was produced still yields it.
    fn subscribe(&self, task_id: &TaskId) -> QueueResult<TaskSubscription>;

    fn pause_all(&self);

    fn resume_all(&self);

    /// Abandon every unresolved task. Their subscribers receive a failed
    /// "Task cancelled" result and in-flight backend calls are dropped.
    fn cancel_all(&self);

    /// Forget a task once its result has been consumed. A task released
    /// before it resolved is abandoned as if cancelled.
    fn release(&self, task_id: &TaskId);
}

/// Handle on one task's eventual result. Dropping it unsubscribes.
#[derive(Debug)]
pub struct TaskSubscription {
    task_id: TaskId,
    rx: watch::Receiver<Option<TaskResult>>,
}

impl TaskSubscription {
    /// Wrap a watch receiver whose value becomes `Some` exactly once.
    pub fn new(task_id: TaskId, rx: watch::Receiver<Option<TaskResult>>) -> Self {
        Self { task_id, rx }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// The result, if it has already been produced.
    pub fn try_result(&self) -> Option<TaskResult> {
        self.rx.borrow().clone()
    }

    /// Wait for the result.
    ///
    /// If the producer goes away without publishing, a failed result is
    /// returned instead.
    pub async fn wait(mut self) -> TaskResult {
        let published = match self.rx.wait_for(|r| r.is_some()).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        published.unwrap_or_else(|| {
            TaskResult::failed(self.task_id, "Task was dropped before producing a result")
        })
    }
}

type ResultSender = Arc<watch::Sender<Option<TaskResult>>>;

/// Store `result` unless the task already has one. Returns whether it was stored.
fn publish(tx: &watch::Sender<Option<TaskResult>>, result: TaskResult) -> bool {
    tx.send_if_modified(|slot| {
        if slot.is_some() {
            false
        } else {
            *slot = Some(result);
            true
        }
    })
}

/// [`TaskSubmissionPort`] backed by a bounded queue and retrying backend calls.
pub struct QueuedSubmissionPort<B> {
    backend: Arc<B>,
    queue: TaskQueue,
    retry: RetryExecutor<TaskError>,
    tasks: Arc<Mutex<HashMap<TaskId, ResultSender>>>,
}

impl<B: TaskBackend> QueuedSubmissionPort<B> {
    pub fn new(backend: B, config: QueueConfig) -> Self {
        Self::with_backend(Arc::new(backend), config)
    }

    /// Share an existing backend handle.
    pub fn with_backend(backend: Arc<B>, config: QueueConfig) -> Self {
        Self {
            backend,
            queue: TaskQueue::new(config.max_concurrent),
            retry: RetryExecutor::new(config.retry),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Number of tasks currently tracked, resolved or not.
    pub fn tracked(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Number of tracked tasks without a result yet.
    pub fn unresolved(&self) -> usize {
        self.tasks
            .lock()
            .values()
            .filter(|tx| tx.borrow().is_none())
            .count()
    }
}

#[async_trait]
impl<B: TaskBackend> TaskSubmissionPort for QueuedSubmissionPort<B> {
    async fn submit(&self, descriptor: TaskDescriptor) -> QueueResult<TaskId> {
        let task_id = TaskId::new();
        let (tx, _rx) = watch::channel(None);
        let tx: ResultSender = Arc::new(tx);
        self.tasks.lock().insert(task_id.clone(), Arc::clone(&tx));

        let kind = descriptor.kind;
        debug!(
            task_id = %task_id,
            kind = %kind,
            shot_id = %descriptor.shot_id,
            index = descriptor.index,
            "Submitting task"
        );
        record_submitted(kind.as_str());

        let backend = Arc::clone(&self.backend);
        let retry = self.retry.clone();
        let job_tx = Arc::clone(&tx);
        let job_id = task_id.clone();
        let done = self.queue.add(
            move || async move {
                let mut resolved = job_tx.subscribe();
                tokio::select! {
                    biased;
                    // Resolved from outside (cancel or release): stop calling the backend.
                    _ = async { resolved.wait_for(|r| r.is_some()).await.is_ok() } => {
                        debug!(task_id = %job_id, "Task abandoned");
                    }
                    outcome = retry.execute(|| backend.generate(&descriptor)) => {
                        let result = match outcome {
                            Ok(output) => TaskResult::succeeded(job_id.clone(), output),
                            Err(e) => TaskResult::failed(job_id.clone(), e.message),
                        };
                        let success = result.success;
                        if publish(&job_tx, result) {
                            record_finished(kind.as_str(), success);
                            debug!(task_id = %job_id, success, "Task finished");
                        }
                    }
                }
            },
            0,
        );

        // Resolve tasks dropped from the queue before they ever ran.
        let cancel_id = task_id.clone();
        tokio::spawn(async move {
            if let Err(QueueError::Cancelled) = done.await {
                publish(&tx, TaskResult::failed(cancel_id, TaskError::cancelled().message));
            }
        });

        Ok(task_id)
    }

    fn subscribe(&self, task_id: &TaskId) -> QueueResult<TaskSubscription> {
        let tasks = self.tasks.lock();
        let tx = tasks
            .get(task_id)
            .ok_or_else(|| QueueError::TaskNotFound(task_id.clone()))?;
        Ok(TaskSubscription::new(task_id.clone(), tx.subscribe()))
    }

    fn pause_all(&self) {
        self.queue.pause();
        debug!(pending = self.queue.pending(), "Task queue paused");
    }

    fn resume_all(&self) {
        self.queue.resume();
        debug!(pending = self.queue.pending(), "Task queue resumed");
    }

    fn cancel_all(&self) {
        let dropped = self.queue.clear();
        let mut cancelled = 0;
        for (id, tx) in self.tasks.lock().iter() {
            if publish(tx, TaskResult::failed(id.clone(), TaskError::cancelled().message)) {
                cancelled += 1;
            }
        }
        info!(dropped, cancelled, "Cancelled outstanding tasks");
    }

    fn release(&self, task_id: &TaskId) {
        let Some(tx) = self.tasks.lock().remove(task_id) else {
            return;
        };
        if publish(&tx, TaskResult::failed(task_id.clone(), TaskError::cancelled().message)) {
            debug!(task_id = %task_id, "Released unresolved task");
        }
    }
}
