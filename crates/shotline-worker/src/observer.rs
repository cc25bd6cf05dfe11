//! Observer interfaces for batch and pipeline runs.
//!
//! Callbacks are fire-and-forget and receive owned snapshots. Every method
//! has a no-op default, so observers implement only what they need. An
//! unbounded channel of serde-tagged events is the stock observer.

use shotline_models::{
    BatchEvent, BatchProgress, ErrorScope, GeneratedAsset, PipelineEvent, PipelineProgress,
    PipelineStage, Shot, TaskResult,
};
use tokio::sync::mpsc::UnboundedSender;

pub trait BatchObserver: Send + Sync {
    fn on_progress(&self, _progress: BatchProgress) {}

    fn on_item_complete(&self, _index: usize, _result: TaskResult, _shot: Shot) {}

    fn on_batch_complete(&self, _results: Vec<TaskResult>) {}

    /// An item failed. The batch carries on.
    fn on_error(&self, _index: usize, _message: String, _shot: Option<Shot>) {}
}

pub trait PipelineObserver: Send + Sync {
    fn on_progress(&self, _progress: PipelineProgress) {}

    /// Fired before the stage body runs.
    fn on_stage_change(&self, _stage: PipelineStage, _human_name: &str) {}

    fn on_image_generated(&self, _index: usize, _asset: GeneratedAsset) {}

    fn on_video_generated(&self, _index: usize, _asset: GeneratedAsset) {}

    fn on_error(&self, _scope: ErrorScope, _message: String) {}
}

/// Ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

impl PipelineObserver for NoopObserver {}

// A closed receiver only means nobody is listening any more.
impl BatchObserver for UnboundedSender<BatchEvent> {
    fn on_progress(&self, progress: BatchProgress) {
        let _ = self.send(BatchEvent::Progress { progress });
    }

    fn on_item_complete(&self, index: usize, result: TaskResult, shot: Shot) {
        let _ = self.send(BatchEvent::ItemComplete { index, result, shot });
    }

    fn on_batch_complete(&self, results: Vec<TaskResult>) {
        let _ = self.send(BatchEvent::BatchComplete { results });
    }

    fn on_error(&self, index: usize, message: String, shot: Option<Shot>) {
        let _ = self.send(BatchEvent::Error {
            index,
            message,
            shot,
        });
    }
}

impl PipelineObserver for UnboundedSender<PipelineEvent> {
    fn on_progress(&self, progress: PipelineProgress) {
        let _ = self.send(PipelineEvent::Progress { progress });
    }

    fn on_stage_change(&self, stage: PipelineStage, human_name: &str) {
        let _ = self.send(PipelineEvent::StageChange {
            stage,
            human_name: human_name.to_string(),
        });
    }

    fn on_image_generated(&self, index: usize, asset: GeneratedAsset) {
        let _ = self.send(PipelineEvent::ImageGenerated { index, asset });
    }

    fn on_video_generated(&self, index: usize, asset: GeneratedAsset) {
        let _ = self.send(PipelineEvent::VideoGenerated { index, asset });
    }

    fn on_error(&self, scope: ErrorScope, message: String) {
        let _ = self.send(PipelineEvent::Error { scope, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotline_models::{TaskId, TaskOutput};
    use tokio::sync::mpsc;

    #[test]
    fn test_channel_observer_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel::<BatchEvent>();
        let observer: &dyn BatchObserver = &tx;

        observer.on_progress(BatchProgress::new(2));
        let result = TaskResult::succeeded(TaskId::from_string("t"), TaskOutput { url: "u".into() });
        observer.on_item_complete(0, result, Shot::new("s1", "d"));

        assert!(matches!(rx.try_recv(), Ok(BatchEvent::Progress { .. })));
        assert!(matches!(rx.try_recv(), Ok(BatchEvent::ItemComplete { index: 0, .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel::<PipelineEvent>();
        drop(rx);
        tx.on_stage_change(PipelineStage::Images, PipelineStage::Images.human_name());
    }
}
