//! Task submission plumbing for the Shotline orchestrators.
//!
//! This crate provides:
//! - Retry with exponential backoff and per-attempt timeouts
//! - A concurrency-limited FIFO queue with a priority lane
//! - The task submission contract and a queue-backed implementation

pub mod error;
pub mod metrics;
pub mod port;
pub mod queue;
pub mod retry;

pub use error::{QueueError, QueueResult, TaskError};
pub use port::{QueuedSubmissionPort, TaskBackend, TaskSubmissionPort, TaskSubscription};
pub use queue::{QueueConfig, TaskQueue};
pub use retry::{with_retry, RetryConfig, RetryExecutor, RetryableError};
