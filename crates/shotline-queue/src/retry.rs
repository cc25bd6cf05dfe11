//! Retry utilities with exponential backoff.
//!
//! Runs an async operation up to `max_retries + 1` times. Failures are
//! classified as retryable or fatal; fatal errors and the last failure are
//! returned immediately. An optional per-attempt timeout turns a hung attempt
//! into an ordinary retryable failure.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use shotline_models::TaskErrorKind;
use tracing::{debug, warn};

use crate::error::TaskError;
use crate::metrics::record_retry;

/// Errors the retry executor knows how to classify and synthesize.
pub trait RetryableError: fmt::Display {
    /// Default classification, used when no custom classifier is installed.
    fn is_retryable(&self) -> bool;

    /// The error reported when an attempt exceeds its timeout.
    fn timed_out(after: Duration) -> Self;
}

impl RetryableError for TaskError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    fn timed_out(after: Duration) -> Self {
        TaskError::timed_out(after)
    }
}

/// Untyped errors fall back to message classification.
impl RetryableError for String {
    fn is_retryable(&self) -> bool {
        TaskErrorKind::classify(self).is_retryable()
    }

    fn timed_out(after: Duration) -> Self {
        format!("Operation timed out after {}ms", after.as_millis())
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Double the delay after every failed attempt.
    pub exponential_backoff: bool,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Per-attempt deadline.
    pub timeout: Option<Duration>,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            exponential_backoff: true,
            max_delay: Duration::from_secs(60),
            timeout: None,
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the given operation name.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    /// Create config from environment variables.
    pub fn from_env(operation_name: impl Into<String>) -> Self {
        let defaults = Self::new(operation_name);
        Self {
            max_retries: std::env::var("SHOTLINE_RETRY_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            base_delay: std::env::var("SHOTLINE_RETRY_BASE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            timeout: std::env::var("SHOTLINE_RETRY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            ..defaults
        }
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay for backoff.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Use a constant delay instead of doubling it.
    pub fn with_exponential_backoff(mut self, enabled: bool) -> Self {
        self.exponential_backoff = enabled;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Race every attempt against `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Delay after the failure of `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if !self.exponential_backoff {
            return self.base_delay.min(self.max_delay);
        }
        let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

type Classifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
type RetryHook<E> = Arc<dyn Fn(u32, &E, Duration) + Send + Sync>;

/// Runs operations under a [`RetryConfig`].
///
/// # Example
/// ```ignore
/// let executor = RetryExecutor::new(RetryConfig::new("generate_image"))
///     .on_retry(|attempt, err, delay| eprintln!("#{attempt} {err}, waiting {delay:?}"));
/// let output = executor.execute(|| backend.generate(&descriptor)).await?;
/// ```
pub struct RetryExecutor<E> {
    config: RetryConfig,
    classifier: Option<Classifier<E>>,
    on_retry: Option<RetryHook<E>>,
}

impl<E> Clone for RetryExecutor<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            classifier: self.classifier.clone(),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E: RetryableError> RetryExecutor<E> {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            classifier: None,
            on_retry: None,
        }
    }

    /// Replace the default retryability classification.
    pub fn with_classifier(mut self, classifier: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Observe each retry as `(failed_attempt, error, next_delay)`.
    pub fn on_retry(mut self, hook: impl Fn(u32, &E, Duration) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn is_retryable(&self, error: &E) -> bool {
        match &self.classifier {
            Some(classify) => classify(error),
            None => error.is_retryable(),
        }
    }

    /// Execute `operation` until it succeeds, fails fatally, or the attempts
    /// are exhausted.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt = 1u32;

        loop {
            let outcome = match self.config.timeout {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(E::timed_out(limit)),
                },
                None => operation().await,
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                debug!(
                    operation = %self.config.operation_name,
                    attempts = attempt,
                    "Retries exhausted: {}",
                    error
                );
                return Err(error);
            }

            if !self.is_retryable(&error) {
                debug!(
                    operation = %self.config.operation_name,
                    attempt,
                    "Non-retryable failure: {}",
                    error
                );
                return Err(error);
            }

            let delay = self.config.delay_for_attempt(attempt);
            warn!(
                operation = %self.config.operation_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, retrying: {}",
                error
            );
            record_retry(&self.config.operation_name);

            if let Some(hook) = &self.on_retry {
                hook(attempt, &error, delay);
            }

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Execute an async operation with the default classification of `E`.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    RetryExecutor::new(config.clone()).execute(operation).await
}
