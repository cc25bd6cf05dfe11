//! Structured run logging utilities.
//!
//! Every line of a batch or pipeline run carries the run id, the kind of
//! run and its item count, so one run can be followed through interleaved
//! worker output.

use shotline_models::{BatchId, PipelineStage, TaskResult};
use tracing::{debug, error, info, warn, Span};

/// Run logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct RunLogger {
    batch_id: String,
    operation: &'static str,
    total_items: usize,
}

impl RunLogger {
    /// Create a new run logger.
    ///
    /// # Arguments
    /// * `batch_id` - The identifier of the run
    /// * `operation` - The kind of run (e.g., "batch", "pipeline")
    /// * `total_items` - Number of shots the run covers
    pub fn new(batch_id: &BatchId, operation: &'static str, total_items: usize) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            operation,
            total_items,
        }
    }

    pub fn log_start(&self, detail: &str) {
        info!(
            batch_id = %self.batch_id,
            operation = self.operation,
            total_items = self.total_items,
            "Run started: {}", detail
        );
    }

    /// Outcome of one item. Failures are warnings, successes debug noise.
    pub fn log_item(&self, index: usize, shot_id: &str, result: &TaskResult) {
        if result.success {
            debug!(
                batch_id = %self.batch_id,
                index,
                shot_id,
                task_id = %result.task_id,
                "Item {}/{} done", index + 1, self.total_items
            );
        } else {
            warn!(
                batch_id = %self.batch_id,
                index,
                shot_id,
                task_id = %result.task_id,
                "Item {}/{} failed: {}",
                index + 1,
                self.total_items,
                result.error_message.as_deref().unwrap_or("unknown error")
            );
        }
    }

    pub fn log_stage_finished(&self, stage: PipelineStage, succeeded: usize, attempted: usize) {
        info!(
            batch_id = %self.batch_id,
            operation = self.operation,
            stage = %stage,
            succeeded,
            attempted,
            "Stage {} finished", stage
        );
    }

    pub fn log_stage_failed(&self, stage: PipelineStage, message: &str) {
        error!(
            batch_id = %self.batch_id,
            operation = self.operation,
            stage = %stage,
            "Stage {} failed: {}", stage, message
        );
    }

    /// `attempted` items have a recorded result; the rest were never reached.
    pub fn log_cancelled(&self, attempted: usize) {
        warn!(
            batch_id = %self.batch_id,
            operation = self.operation,
            attempted,
            skipped = self.total_items.saturating_sub(attempted),
            "Run cancelled"
        );
    }

    pub fn log_completion(&self, succeeded: usize, failed: usize) {
        info!(
            batch_id = %self.batch_id,
            operation = self.operation,
            succeeded,
            failed,
            total_items = self.total_items,
            "Run completed"
        );
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    /// Span carrying the run's identity, entered for the whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            batch_id = %self.batch_id,
            operation = self.operation,
            total_items = self.total_items
        )
    }
}
