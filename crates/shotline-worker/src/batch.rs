//! Sequential batch orchestration.
//!
//! A batch run walks its shots in order, submitting one image task per shot
//! through a [`TaskSubmissionPort`] and waiting for each result before moving
//! on. Concurrency only exists beneath the port. One failed item never stops
//! the run; a cancelled run simply stops recording results.

use std::sync::Arc;
use std::time::Duration;

use shotline_models::{
    AspectRatio, BatchId, BatchProgress, Character, Location, RunStatus, Shot, TaskDescriptor,
    TaskId, TaskKind, TaskResult,
};
use shotline_queue::TaskSubmissionPort;
use tokio::sync::watch;
use tracing::{debug, info, Instrument};

use crate::control::{wait_until_both_runnable, wait_until_runnable, RunControl, RunState};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::logging::RunLogger;
use crate::metrics::{record_item, record_run};
use crate::observer::BatchObserver;
use crate::prompt::{build_prompt, collect_reference_images};

/// Format options applied to every task of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationSettings {
    pub art_style: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub image_size: Option<String>,
}

/// Input of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    pub shots: Vec<Shot>,
    pub characters: Vec<Character>,
    pub locations: Vec<Location>,
    pub settings: GenerationSettings,
}

impl BatchConfig {
    pub fn new(shots: Vec<Shot>) -> Self {
        Self {
            shots,
            ..Default::default()
        }
    }

    /// The image task for the shot at `index`.
    pub fn descriptor(&self, index: usize, shot: &Shot) -> TaskDescriptor {
        TaskDescriptor {
            kind: TaskKind::Image,
            shot_id: shot.id.clone(),
            index,
            prompt: build_prompt(shot, &self.locations, &self.characters),
            art_style: self.settings.art_style.clone(),
            aspect_ratio: self.settings.aspect_ratio,
            image_size: self.settings.image_size.clone(),
            reference_images: collect_reference_images(shot, &self.locations, &self.characters),
            source_image_url: None,
        }
    }
}

/// Submit one task and wait for its result, never longer than `timeout`.
///
/// Every failure mode, including the timeout, comes back as a failed result.
pub(crate) async fn submit_and_wait(
    port: &dyn TaskSubmissionPort,
    descriptor: TaskDescriptor,
    timeout: Duration,
) -> TaskResult {
    let task_id = match port.submit(descriptor).await {
        Ok(id) => id,
        Err(e) => return TaskResult::failed(TaskId::new(), e.to_string()),
    };

    let subscription = match port.subscribe(&task_id) {
        Ok(subscription) => subscription,
        Err(e) => {
            port.release(&task_id);
            return TaskResult::failed(task_id, e.to_string());
        }
    };

    let result = match tokio::time::timeout(timeout, subscription.wait()).await {
        Ok(result) => result,
        Err(_) => TaskResult::failed(
            task_id.clone(),
            format!("Task timed out after {}s", timeout.as_secs()),
        ),
    };
    // Also abandons a timed-out task still running beneath the port.
    port.release(&task_id);
    result
}

/// Drives one batch of shots at a time through a submission port.
pub struct BatchOrchestrator {
    port: Arc<dyn TaskSubmissionPort>,
    item_timeout: Duration,
    control: RunControl,
}

impl BatchOrchestrator {
    pub fn new(port: Arc<dyn TaskSubmissionPort>) -> Self {
        Self {
            port,
            item_timeout: Duration::from_secs(600),
            control: RunControl::new(),
        }
    }

    /// Hard ceiling on waiting for one item's result.
    pub fn with_item_timeout(mut self, item_timeout: Duration) -> Self {
        self.item_timeout = item_timeout;
        self
    }

    /// Run the batch to completion or cancellation.
    ///
    /// Returns one result per processed shot, in shot order. After a cancel,
    /// shots that were never reached have no entry.
    ///
    /// A batch without shots is rejected with `MissingInput` rather than
    /// returning an empty result list.
    pub async fn start(
        &self,
        config: &BatchConfig,
        observer: &dyn BatchObserver,
    ) -> OrchestratorResult<Vec<TaskResult>> {
        self.start_within(config, observer, None).await
    }

    /// Run the batch as part of an outer run. Pausing or cancelling the
    /// outer run pauses or stops this one, even before it has started.
    pub(crate) async fn start_within(
        &self,
        config: &BatchConfig,
        observer: &dyn BatchObserver,
        outer: Option<watch::Receiver<RunState>>,
    ) -> OrchestratorResult<Vec<TaskResult>> {
        let batch_id = BatchId::new();
        let _run = self
            .control
            .claim(batch_id.clone())
            .ok_or(OrchestratorError::AlreadyRunning)?;

        if config.shots.is_empty() {
            return Err(OrchestratorError::missing_input("batch has no shots"));
        }

        let logger = RunLogger::new(&batch_id, "batch", config.shots.len());
        let span = logger.create_span();
        Ok(self
            .run(config, observer, &logger, outer)
            .instrument(span)
            .await)
    }

    async fn run(
        &self,
        config: &BatchConfig,
        observer: &dyn BatchObserver,
        logger: &RunLogger,
        mut outer: Option<watch::Receiver<RunState>>,
    ) -> Vec<TaskResult> {
        let total = config.shots.len();
        let mut rx = self.control.subscribe();
        let mut progress = BatchProgress::new(total);
        let mut results = Vec::with_capacity(total);
        let mut cancelled = false;

        logger.log_start(&format!("aspect ratio {}", config.settings.aspect_ratio));

        for (index, shot) in config.shots.iter().enumerate() {
            let runnable = match outer.as_mut() {
                Some(outer) => wait_until_both_runnable(&mut rx, outer).await,
                None => wait_until_runnable(&mut rx).await,
            };
            if !runnable {
                cancelled = true;
                break;
            }

            progress.start_item(index);
            observer.on_progress(progress.clone());

            debug!(index, shot_id = %shot.id, "Submitting shot");
            let descriptor = config.descriptor(index, shot);
            let result = submit_and_wait(self.port.as_ref(), descriptor, self.item_timeout).await;

            logger.log_item(index, &shot.id, &result);
            progress.finish_item(index, result.success);
            record_item(TaskKind::Image.as_str(), result.success);
            results.push(result.clone());

            observer.on_progress(progress.clone());
            observer.on_item_complete(index, result.clone(), shot.clone());

            if !result.success {
                let message = result
                    .error_message
                    .unwrap_or_else(|| "Task failed".to_string());
                observer.on_error(index, message, Some(shot.clone()));
            }
        }

        let outcome = if !cancelled && self.control.is_running() {
            logger.log_completion(progress.completed, progress.failed);
            "completed"
        } else {
            logger.log_cancelled(progress.attempted());
            "cancelled"
        };
        record_run("batch", outcome);

        observer.on_batch_complete(results.clone());
        results
    }

    /// Suspend the run loop and the port's queue. Only effective while running.
    pub fn pause(&self) -> bool {
        if !self.control.pause() {
            return false;
        }
        self.port.pause_all();
        info!("Batch paused");
        true
    }

    /// Resume a paused run. No-op otherwise.
    pub fn resume(&self) -> bool {
        if !self.control.resume() {
            return false;
        }
        self.port.resume_all();
        info!("Batch resumed");
        true
    }

    /// Stop the run after the current item and abandon outstanding tasks.
    pub fn cancel(&self) -> bool {
        let Some(previous) = self.control.cancel() else {
            return false;
        };
        self.port.cancel_all();
        if previous.paused {
            self.port.resume_all();
        }
        info!("Batch cancelled");
        true
    }

    pub fn status(&self) -> RunStatus {
        self.control.status()
    }
}
