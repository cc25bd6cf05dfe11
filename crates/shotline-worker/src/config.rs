//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use shotline_models::StageWeights;
use shotline_queue::QueueConfig;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Submission queue and retry policy
    pub queue: QueueConfig,
    /// Hard ceiling on waiting for one item's result
    pub item_timeout: Duration,
    /// Share of overall progress per pipeline stage
    pub stage_weights: StageWeights,
    /// Directory holding persisted run snapshots
    pub data_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            item_timeout: Duration::from_secs(600), // 10 minutes
            stage_weights: StageWeights::default(),
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            queue: QueueConfig::from_env(),
            item_timeout: Duration::from_secs(
                std::env::var("SHOTLINE_ITEM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            stage_weights: std::env::var("SHOTLINE_STAGE_WEIGHTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            data_dir: std::env::var("SHOTLINE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
        }
    }
}
