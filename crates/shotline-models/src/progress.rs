//! Progress snapshots emitted by the orchestrators.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{BatchId, PipelineStage};

/// Status of the item currently being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Progress of a batch run.
///
/// The orchestrator mutates one instance in place and hands observers a
/// clone, so an emitted snapshot never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub current_index: usize,
    pub current_status: ItemStatus,
    /// 0-100, rounded
    pub percentage: u8,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            current_index: 0,
            current_status: ItemStatus::Pending,
            percentage: 0,
        }
    }

    /// Mark `index` as in flight.
    pub fn start_item(&mut self, index: usize) {
        self.current_index = index;
        self.current_status = ItemStatus::Running;
    }

    /// Record the outcome of `index` and recompute the percentage.
    pub fn finish_item(&mut self, index: usize, success: bool) {
        self.current_index = index;
        if success {
            self.completed += 1;
            self.current_status = ItemStatus::Completed;
        } else {
            self.failed += 1;
            self.current_status = ItemStatus::Failed;
        }
        self.percentage = percentage_of(index + 1, self.total);
    }

    /// Number of items with a recorded outcome.
    pub fn attempted(&self) -> usize {
        self.completed + self.failed
    }
}

/// `round(done / total * 100)`, with an empty batch counting as done.
pub fn percentage_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (done as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Progress of a pipeline run, derived from stage weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineProgress {
    pub stage: PipelineStage,
    /// 0-100 across the whole pipeline
    pub overall_progress: f64,
    /// 0-100 inside the current stage
    pub stage_progress: f64,
    pub completed_items: usize,
    pub total_items: usize,
    pub failed_items: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<usize>,
}

impl PipelineProgress {
    /// Progress inside `stage` with no item counts. `overall_progress` is
    /// left at zero for the orchestrator to fill in.
    pub fn at(stage: PipelineStage, stage_progress: f64) -> Self {
        Self {
            stage,
            overall_progress: 0.0,
            stage_progress,
            completed_items: 0,
            total_items: 0,
            failed_items: 0,
            current_item: None,
        }
    }

    pub fn with_items(mut self, completed: usize, failed: usize, total: usize) -> Self {
        self.completed_items = completed;
        self.failed_items = failed;
        self.total_items = total;
        self
    }

    pub fn with_current_item(mut self, index: usize) -> Self {
        self.current_item = Some(index);
        self
    }
}

/// Snapshot of an orchestrator's run-state flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub is_running: bool,
    pub is_paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_progress_counts() {
        let mut progress = BatchProgress::new(3);
        progress.start_item(0);
        assert_eq!(progress.current_status, ItemStatus::Running);

        progress.finish_item(0, true);
        progress.finish_item(1, false);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.attempted(), 2);
        assert_eq!(progress.percentage, 67);
        assert_eq!(progress.current_status, ItemStatus::Failed);
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage_of(1, 3), 33);
        assert_eq!(percentage_of(2, 3), 67);
        assert_eq!(percentage_of(3, 3), 100);
        assert_eq!(percentage_of(0, 0), 100);
    }
}
