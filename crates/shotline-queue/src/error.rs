//! Queue and task error types.

use std::time::Duration;

use shotline_models::{TaskErrorKind, TaskId};
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Operation was cancelled before it ran")]
    Cancelled,

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Submission failed: {0}")]
    SubmitFailed(String),

    #[error("Task failed: {0}")]
    Task(#[from] TaskError),
}

impl QueueError {
    pub fn submit_failed(msg: impl Into<String>) -> Self {
        Self::SubmitFailed(msg.into())
    }
}

/// A failed generation attempt, tagged with its kind where it originated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Wrap a message from a collaborator that does not tag its errors.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: TaskErrorKind::classify(&message),
            message,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Network, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::RateLimited, message)
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Server(status), message)
    }

    pub fn client(status: u16, message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Client(status), message)
    }

    pub fn temporary(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Temporary, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Fatal, message)
    }

    pub fn cancelled() -> Self {
        Self::new(TaskErrorKind::Cancelled, "Task cancelled")
    }

    pub fn timed_out(after: Duration) -> Self {
        Self::new(
            TaskErrorKind::Timeout,
            format!("Operation timed out after {}ms", after.as_millis()),
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
