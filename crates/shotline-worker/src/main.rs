//! Pipeline runner binary.
//!
//! Reads a storyboard JSON file, runs it through the pipeline against the
//! simulated backend and prints the result as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use shotline_models::PipelineEvent;
use shotline_queue::{QueuedSubmissionPort, TaskSubmissionPort};
use shotline_storage::{JsonFileStore, ObjectStore};
use shotline_worker::{
    PipelineConfig, PipelineOrchestrator, SimulatedBackend, SimulationConfig, WorkerConfig,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "shotline-worker")]
#[command(author, version, about = "Run a storyboard through the generation pipeline")]
struct Cli {
    /// Storyboard JSON file to run
    #[arg(required = true)]
    storyboard: PathBuf,

    /// Snapshot directory, overrides SHOTLINE_DATA_DIR
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("shotline=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let path = cli.storyboard;

    info!("Starting shotline-worker");

    let mut config = WorkerConfig::from_env();
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    info!("Worker config: {:?}", config);

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let pipeline_config: PipelineConfig =
        serde_json::from_str(&raw).with_context(|| format!("invalid storyboard {}", path.display()))?;

    let backend = SimulatedBackend::new(SimulationConfig::from_env());
    let port: Arc<dyn TaskSubmissionPort> =
        Arc::new(QueuedSubmissionPort::new(backend, config.queue.clone()));

    let store: Arc<dyn ObjectStore> = Arc::new(
        JsonFileStore::open(&config.data_dir)
            .await
            .context("failed to open snapshot store")?,
    );

    let orchestrator = Arc::new(
        PipelineOrchestrator::from_config(port, &config).with_snapshot_store(store),
    );

    // Stream events to the log
    let (events, mut rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::Progress { progress } => info!(
                    stage = %progress.stage,
                    overall = progress.overall_progress,
                    completed = progress.completed_items,
                    failed = progress.failed_items,
                    total = progress.total_items,
                    "Progress"
                ),
                PipelineEvent::StageChange { human_name, .. } => info!("{}", human_name),
                PipelineEvent::ImageGenerated { index, asset } => {
                    info!(index, url = %asset.url, "Image ready")
                }
                PipelineEvent::VideoGenerated { index, asset } => {
                    info!(index, url = %asset.url, "Video ready")
                }
                PipelineEvent::Error { scope, message } => warn!(?scope, "{}", message),
            }
        }
    });

    // Cancel on Ctrl-C; partial results are still printed
    {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                orchestrator.cancel();
            }
        });
    }

    let result = orchestrator.start(pipeline_config, &events).await?;
    drop(events);
    printer.await.ok();

    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        error!(
            stage = %result.stage,
            cancelled = result.cancelled,
            "Run did not complete: {}",
            result.error.as_deref().unwrap_or("cancelled")
        );
        std::process::exit(1);
    }

    info!("Run complete");
    Ok(())
}
