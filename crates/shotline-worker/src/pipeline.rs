//! Multi-stage pipeline orchestration.
//!
//! A run moves through `parsing → storyboard → images → videos → completed`.
//! `parsing` only runs when a script is supplied and `videos` only when
//! requested and at least one image succeeded. A stage failure moves the run
//! to `error` and skips the remaining stages; item failures inside a stage
//! are reported and tolerated.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shotline_models::{
    percentage_of, AspectRatio, BatchId, BatchProgress, Character, ErrorScope, GeneratedAsset,
    Location, PipelineProgress, PipelineResult, PipelineStage, RunSnapshot, RunStatus, Shot,
    StageWeights, TaskDescriptor, TaskKind, TaskResult, TOTAL_DURATION_KEY,
};
use shotline_queue::TaskSubmissionPort;
use shotline_storage::{ObjectStore, Repository};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

use crate::batch::{submit_and_wait, BatchConfig, BatchOrchestrator, GenerationSettings};
use crate::config::WorkerConfig;
use crate::control::{wait_until_runnable, RunControl, RunState};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::logging::RunLogger;
use crate::metrics::{record_item, record_run, record_stage_duration};
use crate::observer::{BatchObserver, PipelineObserver};
use crate::prompt::build_prompt;

/// Input of a pipeline run, as read from a storyboard file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Raw script text; converting it to shots happens upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// The storyboard. Absent or empty fails the storyboard stage.
    #[serde(default)]
    pub shots: Option<Vec<Shot>>,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub art_style: Option<String>,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
    #[serde(default)]
    pub auto_generate_video: bool,
}

impl PipelineConfig {
    pub fn new(shots: Vec<Shot>) -> Self {
        Self {
            shots: Some(shots),
            ..Default::default()
        }
    }

    pub fn settings(&self) -> GenerationSettings {
        GenerationSettings {
            art_style: self.art_style.clone(),
            aspect_ratio: self.aspect_ratio,
            image_size: self.image_size.clone(),
        }
    }

    fn batch_config(&self, shots: &[Shot]) -> BatchConfig {
        BatchConfig {
            shots: shots.to_vec(),
            characters: self.characters.clone(),
            locations: self.locations.clone(),
            settings: self.settings(),
        }
    }

    /// Video task animating a generated image.
    fn video_descriptor(&self, image: &GeneratedAsset) -> TaskDescriptor {
        TaskDescriptor {
            kind: TaskKind::Video,
            shot_id: image.shot_id.clone(),
            index: image.index,
            prompt: image.prompt.clone(),
            art_style: self.art_style.clone(),
            aspect_ratio: self.aspect_ratio,
            image_size: self.image_size.clone(),
            reference_images: Vec::new(),
            source_image_url: Some(image.url.clone()),
        }
    }
}

enum Flow {
    Completed,
    Cancelled,
}

/// Emits pipeline progress, keeping overall progress from going backwards.
struct ProgressReporter<'a> {
    observer: &'a dyn PipelineObserver,
    weights: StageWeights,
    last_overall: Mutex<f64>,
}

impl<'a> ProgressReporter<'a> {
    fn new(observer: &'a dyn PipelineObserver, weights: StageWeights) -> Self {
        Self {
            observer,
            weights,
            last_overall: Mutex::new(0.0),
        }
    }

    fn report(&self, mut progress: PipelineProgress) {
        progress.overall_progress = {
            let mut last = self.last_overall.lock();
            let overall = self
                .weights
                .overall(progress.stage, progress.stage_progress)
                .max(*last);
            *last = overall;
            overall
        };
        self.observer.on_progress(progress);
    }

    fn report_stage(&self, stage: PipelineStage, stage_progress: f64) {
        self.report(PipelineProgress::at(stage, stage_progress));
    }
}

/// Bridges batch callbacks of the images stage into pipeline callbacks.
struct ImageStageObserver<'a> {
    reporter: &'a ProgressReporter<'a>,
    config: &'a BatchConfig,
    assets: Mutex<Vec<GeneratedAsset>>,
}

impl<'a> ImageStageObserver<'a> {
    fn new(reporter: &'a ProgressReporter<'a>, config: &'a BatchConfig) -> Self {
        Self {
            reporter,
            config,
            assets: Mutex::new(Vec::new()),
        }
    }

    fn into_assets(self) -> Vec<GeneratedAsset> {
        self.assets.into_inner()
    }
}

impl BatchObserver for ImageStageObserver<'_> {
    fn on_progress(&self, progress: BatchProgress) {
        self.reporter.report(
            PipelineProgress::at(PipelineStage::Images, f64::from(progress.percentage))
                .with_items(progress.completed, progress.failed, progress.total)
                .with_current_item(progress.current_index),
        );
    }

    fn on_item_complete(&self, index: usize, result: TaskResult, shot: Shot) {
        let prompt = build_prompt(&shot, &self.config.locations, &self.config.characters);
        if let Some(asset) =
            GeneratedAsset::from_result(index, shot.id, TaskKind::Image, prompt, &result)
        {
            self.assets.lock().push(asset.clone());
            self.reporter.observer.on_image_generated(index, asset);
        }
    }

    fn on_error(&self, index: usize, message: String, _shot: Option<Shot>) {
        self.reporter.observer.on_error(ErrorScope::Item(index), message);
    }
}

/// Enter `next`, announcing it before its body runs.
fn enter(
    reporter: &ProgressReporter<'_>,
    result: &mut PipelineResult,
    next: PipelineStage,
) -> OrchestratorResult<()> {
    result.stage = result.stage.transition(next)?;
    debug!(stage = %next, "Entering stage");
    reporter.observer.on_stage_change(next, next.human_name());
    Ok(())
}

fn finish_stage(result: &mut PipelineResult, stage: PipelineStage, started: Instant) {
    let elapsed = started.elapsed();
    record_stage_duration(stage.as_str(), elapsed.as_secs_f64());
    result
        .stage_durations
        .insert(stage.as_str().to_string(), elapsed.as_millis() as u64);
}

async fn save_snapshot(
    repo: &Repository<RunSnapshot>,
    config: &PipelineConfig,
    result: &PipelineResult,
) -> OrchestratorResult<()> {
    let snapshot = RunSnapshot::new(config.project_id.clone(), result.clone());
    repo.save(&snapshot).await?;
    debug!(batch_id = %snapshot.batch_id, "Run snapshot saved");
    Ok(())
}

/// Runs storyboards through every pipeline stage, one run at a time.
pub struct PipelineOrchestrator {
    port: Arc<dyn TaskSubmissionPort>,
    batch: BatchOrchestrator,
    weights: StageWeights,
    item_timeout: Duration,
    snapshots: Option<Repository<RunSnapshot>>,
    control: RunControl,
}

impl PipelineOrchestrator {
    pub fn new(port: Arc<dyn TaskSubmissionPort>) -> Self {
        let item_timeout = Duration::from_secs(600);
        Self {
            batch: BatchOrchestrator::new(Arc::clone(&port)).with_item_timeout(item_timeout),
            port,
            weights: StageWeights::default(),
            item_timeout,
            snapshots: None,
            control: RunControl::new(),
        }
    }

    pub fn from_config(port: Arc<dyn TaskSubmissionPort>, config: &WorkerConfig) -> Self {
        Self::new(port)
            .with_weights(config.stage_weights)
            .with_item_timeout(config.item_timeout)
    }

    pub fn with_weights(mut self, weights: StageWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Hard ceiling on waiting for one image or video result.
    pub fn with_item_timeout(mut self, item_timeout: Duration) -> Self {
        self.item_timeout = item_timeout;
        self.batch = BatchOrchestrator::new(Arc::clone(&self.port)).with_item_timeout(item_timeout);
        self
    }

    /// Persist a snapshot of every finished run in `store`.
    pub fn with_snapshot_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.snapshots = Some(Repository::new(store));
        self
    }

    pub fn snapshots(&self) -> Option<&Repository<RunSnapshot>> {
        self.snapshots.as_ref()
    }

    /// Run the pipeline.
    ///
    /// Stage failures and cancellation are reported on the returned result;
    /// only setup failures are errors.
    pub async fn start(
        &self,
        config: PipelineConfig,
        observer: &dyn PipelineObserver,
    ) -> OrchestratorResult<PipelineResult> {
        let batch_id = BatchId::new();
        let _run = self
            .control
            .claim(batch_id.clone())
            .ok_or(OrchestratorError::AlreadyRunning)?;

        let shot_count = config.shots.as_ref().map(Vec::len).unwrap_or(0);
        let logger = RunLogger::new(&batch_id, "pipeline", shot_count);
        let span = logger.create_span();
        let result = self
            .run(batch_id, &config, observer, &logger)
            .instrument(span)
            .await;

        self.persist(&config, &result).await;
        Ok(result)
    }

    async fn run(
        &self,
        batch_id: BatchId,
        config: &PipelineConfig,
        observer: &dyn PipelineObserver,
        logger: &RunLogger,
    ) -> PipelineResult {
        let started = Instant::now();
        let reporter = ProgressReporter::new(observer, self.weights);
        let mut result = PipelineResult::new(batch_id);

        logger.log_start(&format!(
            "videos {}",
            if config.auto_generate_video { "on" } else { "off" }
        ));

        match self.run_stages(config, &reporter, &mut result, logger).await {
            Ok(Flow::Completed) => {
                result.success = true;
                record_run("pipeline", "completed");
                logger.log_completion(
                    result.images.len(),
                    result.image_results.len().saturating_sub(result.images.len()),
                );
            }
            Ok(Flow::Cancelled) => {
                result.cancelled = true;
                record_run("pipeline", "cancelled");
                logger.log_cancelled(result.image_results.len());
            }
            Err(e) => {
                let stage = match &e {
                    OrchestratorError::Stage { stage, .. } => *stage,
                    _ => result.stage,
                };
                let message = e.to_string();
                logger.log_stage_failed(stage, &message);
                record_run("pipeline", "error");

                result.error = Some(message.clone());
                result.stage = PipelineStage::Error;
                observer.on_error(ErrorScope::Stage(stage), message);
                observer.on_stage_change(PipelineStage::Error, PipelineStage::Error.human_name());
            }
        }

        result.stage_durations.insert(
            TOTAL_DURATION_KEY.to_string(),
            started.elapsed().as_millis() as u64,
        );
        result
    }

    async fn run_stages(
        &self,
        config: &PipelineConfig,
        reporter: &ProgressReporter<'_>,
        result: &mut PipelineResult,
        logger: &RunLogger,
    ) -> OrchestratorResult<Flow> {
        let mut rx = self.control.subscribe();

        // Parsing: the script is converted upstream; this stage only reports it.
        if let Some(script) = config.script.as_deref().filter(|s| !s.trim().is_empty()) {
            if !wait_until_runnable(&mut rx).await {
                return Ok(Flow::Cancelled);
            }
            let started = Instant::now();
            enter(reporter, result, PipelineStage::Parsing)?;
            reporter.report_stage(PipelineStage::Parsing, 0.0);
            debug!(chars = script.chars().count(), "Script supplied");
            reporter.report_stage(PipelineStage::Parsing, 100.0);
            finish_stage(result, PipelineStage::Parsing, started);
        }

        // Storyboard
        if !wait_until_runnable(&mut rx).await {
            return Ok(Flow::Cancelled);
        }
        let started = Instant::now();
        enter(reporter, result, PipelineStage::Storyboard)?;
        reporter.report_stage(PipelineStage::Storyboard, 0.0);
        let shots = match config.shots.as_deref() {
            Some(shots) if !shots.is_empty() => shots,
            _ => {
                return Err(OrchestratorError::stage_failed(
                    PipelineStage::Storyboard,
                    "missing storyboard data",
                ))
            }
        };
        reporter.report(
            PipelineProgress::at(PipelineStage::Storyboard, 100.0).with_items(0, 0, shots.len()),
        );
        finish_stage(result, PipelineStage::Storyboard, started);

        // Images
        if !wait_until_runnable(&mut rx).await {
            return Ok(Flow::Cancelled);
        }
        let started = Instant::now();
        enter(reporter, result, PipelineStage::Images)?;
        reporter.report(
            PipelineProgress::at(PipelineStage::Images, 0.0).with_items(0, 0, shots.len()),
        );
        let batch_config = config.batch_config(shots);
        let stage_observer = ImageStageObserver::new(reporter, &batch_config);
        let image_results = self
            .batch
            .start_within(&batch_config, &stage_observer, Some(rx.clone()))
            .await
            .map_err(|e| OrchestratorError::stage_failed(PipelineStage::Images, e.to_string()))?;
        result.image_results = image_results;
        result.images = stage_observer.into_assets();
        finish_stage(result, PipelineStage::Images, started);
        logger.log_stage_finished(
            PipelineStage::Images,
            result.images.len(),
            result.image_results.len(),
        );
        if !self.control.is_running() {
            return Ok(Flow::Cancelled);
        }

        // Videos
        if config.auto_generate_video && !result.images.is_empty() {
            if !wait_until_runnable(&mut rx).await {
                return Ok(Flow::Cancelled);
            }
            let started = Instant::now();
            enter(reporter, result, PipelineStage::Videos)?;
            let flow = self
                .generate_videos(config, reporter, result, &mut rx, logger)
                .await;
            finish_stage(result, PipelineStage::Videos, started);
            logger.log_stage_finished(
                PipelineStage::Videos,
                result.videos.len(),
                result.images.len(),
            );
            if matches!(flow, Flow::Cancelled) || !self.control.is_running() {
                return Ok(Flow::Cancelled);
            }
        }

        enter(reporter, result, PipelineStage::Completed)?;
        reporter.report_stage(PipelineStage::Completed, 100.0);
        Ok(Flow::Completed)
    }

    /// Animate every generated image, one at a time.
    async fn generate_videos(
        &self,
        config: &PipelineConfig,
        reporter: &ProgressReporter<'_>,
        result: &mut PipelineResult,
        rx: &mut watch::Receiver<RunState>,
        logger: &RunLogger,
    ) -> Flow {
        let images = result.images.clone();
        let total = images.len();
        let mut completed = 0;
        let mut failed = 0;

        for (position, image) in images.iter().enumerate() {
            if !wait_until_runnable(rx).await {
                return Flow::Cancelled;
            }
            reporter.report(
                PipelineProgress::at(
                    PipelineStage::Videos,
                    f64::from(percentage_of(position, total)),
                )
                .with_items(completed, failed, total)
                .with_current_item(image.index),
            );

            let descriptor = config.video_descriptor(image);
            let outcome = submit_and_wait(self.port.as_ref(), descriptor, self.item_timeout).await;
            logger.log_item(image.index, &image.shot_id, &outcome);
            record_item(TaskKind::Video.as_str(), outcome.success);

            match GeneratedAsset::from_result(
                image.index,
                image.shot_id.clone(),
                TaskKind::Video,
                image.prompt.clone(),
                &outcome,
            ) {
                Some(asset) => {
                    completed += 1;
                    result.videos.push(asset.clone());
                    reporter.observer.on_video_generated(image.index, asset);
                }
                None => {
                    failed += 1;
                    let message = outcome
                        .error_message
                        .unwrap_or_else(|| "Video task failed".to_string());
                    reporter.observer.on_error(ErrorScope::Item(image.index), message);
                }
            }

            reporter.report(
                PipelineProgress::at(
                    PipelineStage::Videos,
                    f64::from(percentage_of(position + 1, total)),
                )
                .with_items(completed, failed, total)
                .with_current_item(image.index),
            );
        }

        Flow::Completed
    }

    /// Snapshot persistence is best-effort; a failed write never fails the run.
    async fn persist(&self, config: &PipelineConfig, result: &PipelineResult) {
        let Some(repo) = &self.snapshots else {
            return;
        };
        if let Err(e) = save_snapshot(repo, config, result).await {
            warn!(batch_id = %result.batch_id, error = %e, "Failed to persist run snapshot");
        }
    }

    /// Pause the run. Forwarded to the images batch while it is running.
    pub fn pause(&self) -> bool {
        if !self.control.pause() {
            return false;
        }
        if !self.batch.pause() {
            self.port.pause_all();
        }
        info!("Pipeline paused");
        true
    }

    pub fn resume(&self) -> bool {
        if !self.control.resume() {
            return false;
        }
        if !self.batch.resume() {
            self.port.resume_all();
        }
        info!("Pipeline resumed");
        true
    }

    /// Cancel the run. Whatever was produced so far is kept on the result.
    pub fn cancel(&self) -> bool {
        let Some(previous) = self.control.cancel() else {
            return false;
        };
        if !self.batch.cancel() {
            self.port.cancel_all();
        }
        if previous.paused {
            self.port.resume_all();
        }
        info!("Pipeline cancelled");
        true
    }

    pub fn status(&self) -> RunStatus {
        self.control.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimulatedBackend, SimulationConfig};
    use async_trait::async_trait;
    use shotline_models::{PipelineEvent, TaskOutput};
    use shotline_queue::{QueueConfig, QueuedSubmissionPort, RetryConfig, TaskBackend, TaskError};
    use shotline_storage::MemoryStore;
    use tokio::sync::mpsc;

    fn shots(n: usize) -> Vec<Shot> {
        (0..n)
            .map(|i| Shot::new(format!("shot-{}", i), format!("scene number {}", i)))
            .collect()
    }

    fn simulated_port(
        failure_every: u64,
    ) -> (Arc<QueuedSubmissionPort<SimulatedBackend>>, Arc<dyn TaskSubmissionPort>) {
        let backend = SimulatedBackend::new(SimulationConfig {
            latency: Duration::from_millis(100),
            failure_every,
        });
        let config = QueueConfig::default()
            .with_retry(RetryConfig::new("generate").with_max_retries(0));
        let port = Arc::new(QueuedSubmissionPort::new(backend, config));
        let dyn_port: Arc<dyn TaskSubmissionPort> = port.clone();
        (port, dyn_port)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn stage_changes(events: &[PipelineEvent]) -> Vec<PipelineStage> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::StageChange { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_with_videos() {
        let (port, dyn_port) = simulated_port(0);
        let orchestrator = PipelineOrchestrator::new(dyn_port);
        let (tx, mut rx) = mpsc::unbounded_channel::<PipelineEvent>();

        let mut config = PipelineConfig::new(shots(3));
        config.script = Some("INT. HARBOR - NIGHT".to_string());
        config.auto_generate_video = true;

        let result = orchestrator.start(config, &tx).await.unwrap();

        assert!(result.success);
        assert!(!result.cancelled);
        assert_eq!(result.stage, PipelineStage::Completed);
        assert_eq!(result.image_results.len(), 3);
        assert_eq!(result.images.len(), 3);
        assert_eq!(result.videos.len(), 3);
        assert!(result.videos.iter().all(|v| v.kind == TaskKind::Video));
        assert_eq!(port.backend().calls(), 6);

        for key in ["parsing", "storyboard", "images", "videos", TOTAL_DURATION_KEY] {
            assert!(result.stage_durations.contains_key(key), "missing {}", key);
        }
        assert!(result.duration_ms(PipelineStage::Images).unwrap() >= 300);

        let events = drain(&mut rx);
        assert_eq!(
            stage_changes(&events),
            vec![
                PipelineStage::Parsing,
                PipelineStage::Storyboard,
                PipelineStage::Images,
                PipelineStage::Videos,
                PipelineStage::Completed,
            ]
        );

        let mut last = 0.0;
        for event in &events {
            if let PipelineEvent::Progress { progress } = event {
                assert!(progress.overall_progress >= last, "overall progress went backwards");
                last = progress.overall_progress;
            }
        }
        assert_eq!(last, 100.0);

        let images = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::ImageGenerated { .. }))
            .count();
        assert_eq!(images, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_progress_halfway_through_images() {
        let (_, dyn_port) = simulated_port(0);
        let orchestrator = PipelineOrchestrator::new(dyn_port);
        let (tx, mut rx) = mpsc::unbounded_channel::<PipelineEvent>();

        let result = orchestrator
            .start(PipelineConfig::new(shots(2)), &tx)
            .await
            .unwrap();
        assert!(result.success);

        let halfway = drain(&mut rx).into_iter().find_map(|e| match e {
            PipelineEvent::Progress { progress }
                if progress.stage == PipelineStage::Images && progress.stage_progress == 50.0 =>
            {
                Some(progress)
            }
            _ => None,
        });
        let halfway = halfway.expect("no progress event at 50% of images");
        assert_eq!(halfway.overall_progress, 50.0);
        assert_eq!(halfway.completed_items, 1);
        assert_eq!(halfway.total_items, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_storyboard_fails_without_submissions() {
        let (port, dyn_port) = simulated_port(0);
        let orchestrator = PipelineOrchestrator::new(dyn_port);
        let (tx, mut rx) = mpsc::unbounded_channel::<PipelineEvent>();

        for config in [PipelineConfig::default(), PipelineConfig::new(Vec::new())] {
            let result = orchestrator.start(config, &tx).await.unwrap();

            assert!(!result.success);
            assert_eq!(result.stage, PipelineStage::Error);
            assert_eq!(result.error.as_deref(), Some("missing storyboard data"));
            assert!(result.image_results.is_empty());
        }
        assert_eq!(port.backend().calls(), 0);

        let events = drain(&mut rx);
        assert_eq!(
            stage_changes(&events)[..2],
            [PipelineStage::Storyboard, PipelineStage::Error]
        );
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Error { scope: ErrorScope::Stage(PipelineStage::Storyboard), .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_videos_skipped_without_successful_images() {
        // Every call fails and retries are disabled.
        let (port, dyn_port) = simulated_port(1);
        let orchestrator = PipelineOrchestrator::new(dyn_port);
        let (tx, mut rx) = mpsc::unbounded_channel::<PipelineEvent>();

        let mut config = PipelineConfig::new(shots(2));
        config.auto_generate_video = true;
        let result = orchestrator.start(config, &tx).await.unwrap();

        // Item failures are tolerated; the run still completes.
        assert!(result.success);
        assert_eq!(result.image_results.len(), 2);
        assert!(result.images.is_empty());
        assert!(result.videos.is_empty());
        assert_eq!(port.backend().calls(), 2);

        let events = drain(&mut rx);
        assert!(!stage_changes(&events).contains(&PipelineStage::Videos));
        let item_errors = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Error { scope: ErrorScope::Item(_), .. }))
            .count();
        assert_eq!(item_errors, 2);
    }

    /// Images succeed, videos are rejected.
    struct NoVideoBackend;

    #[async_trait]
    impl TaskBackend for NoVideoBackend {
        async fn generate(&self, descriptor: &TaskDescriptor) -> Result<TaskOutput, TaskError> {
            match descriptor.kind {
                TaskKind::Image => Ok(TaskOutput {
                    url: format!("mem://{}.png", descriptor.shot_id),
                }),
                TaskKind::Video => {
                    assert!(descriptor.source_image_url.is_some());
                    Err(TaskError::client(422, "422 video model unavailable"))
                }
            }
        }
    }

    #[tokio::test]
    async fn test_video_failures_are_item_level() {
        let port: Arc<dyn TaskSubmissionPort> =
            Arc::new(QueuedSubmissionPort::new(NoVideoBackend, QueueConfig::default()));
        let orchestrator = PipelineOrchestrator::new(port);
        let (tx, mut rx) = mpsc::unbounded_channel::<PipelineEvent>();

        let mut config = PipelineConfig::new(shots(2));
        config.auto_generate_video = true;
        let result = orchestrator.start(config, &tx).await.unwrap();

        assert!(result.success);
        assert_eq!(result.stage, PipelineStage::Completed);
        assert_eq!(result.images.len(), 2);
        assert!(result.videos.is_empty());

        let events = drain(&mut rx);
        let video_errors: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Error { scope: ErrorScope::Item(index), message } => {
                    assert!(message.contains("422"));
                    Some(*index)
                }
                _ => None,
            })
            .collect();
        assert_eq!(video_errors, vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_images_keeps_partial_results() {
        let (_, dyn_port) = simulated_port(0);
        let orchestrator = Arc::new(PipelineOrchestrator::new(dyn_port));
        let (tx, mut rx) = mpsc::unbounded_channel::<PipelineEvent>();

        let handle = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                let mut config = PipelineConfig::new(shots(5));
                config.auto_generate_video = true;
                orchestrator.start(config, &tx).await
            })
        };

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(orchestrator.status().is_running);
        assert!(orchestrator.cancel());
        let result = handle.await.unwrap().unwrap();

        assert!(!result.success);
        assert!(result.cancelled);
        assert_eq!(result.stage, PipelineStage::Images);
        assert!(result.error.is_none());
        assert_eq!(result.image_results.len(), 2);
        assert_eq!(result.images.len(), 1);
        assert!(result.videos.is_empty());

        let changes = stage_changes(&drain(&mut rx));
        assert!(!changes.contains(&PipelineStage::Error));
        assert!(!changes.contains(&PipelineStage::Videos));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_resume_during_images() {
        let (_, dyn_port) = simulated_port(0);
        let orchestrator = Arc::new(PipelineOrchestrator::new(dyn_port));

        let handle = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                let observer = crate::observer::NoopObserver;
                orchestrator.start(PipelineConfig::new(shots(3)), &observer).await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(orchestrator.pause());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(orchestrator.status().is_paused);
        assert!(!handle.is_finished());

        assert!(orchestrator.resume());
        let result = handle.await.unwrap().unwrap();
        assert!(result.success);
        assert_eq!(result.images.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_rejected() {
        let (_, dyn_port) = simulated_port(0);
        let orchestrator = Arc::new(PipelineOrchestrator::new(dyn_port));

        let handle = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                let observer = crate::observer::NoopObserver;
                orchestrator.start(PipelineConfig::new(shots(2)), &observer).await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = orchestrator
            .start(PipelineConfig::new(shots(1)), &crate::observer::NoopObserver)
            .await;
        assert!(matches!(second, Err(OrchestratorError::AlreadyRunning)));
        assert!(orchestrator.status().is_running);
        assert!(handle.await.unwrap().unwrap().success);
    }

    #[derive(Clone, Copy)]
    enum Intent {
        Pause,
        Cancel,
    }

    /// Sends a control intent the moment the images stage is announced,
    /// before the inner batch has started.
    struct IntentAtImages {
        orchestrator: Arc<PipelineOrchestrator>,
        intent: Intent,
    }

    impl PipelineObserver for IntentAtImages {
        fn on_stage_change(&self, stage: PipelineStage, _human_name: &str) {
            if stage != PipelineStage::Images {
                return;
            }
            let accepted = match self.intent {
                Intent::Pause => self.orchestrator.pause(),
                Intent::Cancel => self.orchestrator.cancel(),
            };
            assert!(accepted);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_when_images_stage_starts() {
        let (port, dyn_port) = simulated_port(0);
        let orchestrator = Arc::new(PipelineOrchestrator::new(dyn_port));
        let observer = IntentAtImages {
            orchestrator: Arc::clone(&orchestrator),
            intent: Intent::Cancel,
        };

        let mut config = PipelineConfig::new(shots(5));
        config.auto_generate_video = true;
        let result = orchestrator.start(config, &observer).await.unwrap();

        assert!(result.cancelled);
        assert!(!result.success);
        assert_eq!(result.stage, PipelineStage::Images);
        assert!(result.image_results.is_empty());
        assert_eq!(port.backend().calls(), 0);
        assert!(!orchestrator.status().is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_when_images_stage_starts() {
        let (port, dyn_port) = simulated_port(0);
        let orchestrator = Arc::new(PipelineOrchestrator::new(dyn_port));

        let handle = {
            let observer = IntentAtImages {
                orchestrator: Arc::clone(&orchestrator),
                intent: Intent::Pause,
            };
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                orchestrator.start(PipelineConfig::new(shots(3)), &observer).await
            })
        };

        // Nothing is submitted while the run is paused.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(orchestrator.status().is_paused);
        assert!(!handle.is_finished());
        assert_eq!(port.backend().calls(), 0);

        assert!(orchestrator.resume());
        let result = handle.await.unwrap().unwrap();
        assert!(result.success);
        assert_eq!(result.images.len(), 3);
        assert_eq!(port.backend().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_persisted() {
        let (_, dyn_port) = simulated_port(0);
        let store = Arc::new(MemoryStore::new());
        let orchestrator = PipelineOrchestrator::new(dyn_port).with_snapshot_store(store.clone());

        let mut config = PipelineConfig::new(shots(1));
        config.project_id = Some("harbor-short".to_string());
        let result = orchestrator
            .start(config, &crate::observer::NoopObserver)
            .await
            .unwrap();

        let repo = orchestrator.snapshots().unwrap();
        let snapshot = repo.get(result.batch_id.as_str()).await.unwrap().unwrap();
        assert_eq!(snapshot.project_id.as_deref(), Some("harbor-short"));
        assert!(snapshot.result.success);
        assert_eq!(store.len("runs"), 1);
    }

    #[test]
    fn test_config_reads_storyboard_json() {
        let json = r#"{
            "shots": [{"id": "s1", "description": "a gull", "location": "Pier"}],
            "locations": [{"id": "l1", "name": "Pier", "description": "wet planks"}],
            "artStyle": "ink wash",
            "aspectRatio": "9:16",
            "autoGenerateVideo": true
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.shots.as_ref().map(Vec::len), Some(1));
        assert_eq!(config.aspect_ratio, AspectRatio::PORTRAIT);
        assert!(config.auto_generate_video);
        assert!(config.script.is_none());

        let batch = config.batch_config(config.shots.as_deref().unwrap());
        let descriptor = batch.descriptor(0, &batch.shots[0]);
        assert_eq!(descriptor.prompt, "a gull, Location: wet planks");
        assert_eq!(descriptor.art_style.as_deref(), Some("ink wash"));
    }
}
