//! Simulated generation backend for dry runs and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use shotline_models::{TaskDescriptor, TaskKind, TaskOutput};
use shotline_queue::{TaskBackend, TaskError};
use tracing::debug;

/// Simulation knobs.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Time every call takes
    pub latency: Duration,
    /// Fail every n-th call with a retryable 503 (0 disables failures)
    pub failure_every: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(200),
            failure_every: 0,
        }
    }
}

impl SimulationConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            latency: Duration::from_millis(
                std::env::var("SHOTLINE_SIM_LATENCY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(200),
            ),
            failure_every: std::env::var("SHOTLINE_SIM_FAILURE_EVERY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        }
    }
}

/// Backend that sleeps and hands back a synthetic asset URL.
pub struct SimulatedBackend {
    config: SimulationConfig,
    calls: AtomicU64,
}

impl SimulatedBackend {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            calls: AtomicU64::new(0),
        }
    }

    /// Number of `generate` calls so far, retries included.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskBackend for SimulatedBackend {
    async fn generate(&self, descriptor: &TaskDescriptor) -> Result<TaskOutput, TaskError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.config.latency).await;

        if self.config.failure_every > 0 && call % self.config.failure_every == 0 {
            debug!(call, shot_id = %descriptor.shot_id, "Simulated outage");
            return Err(TaskError::server(503, "503 Service Unavailable (simulated)"));
        }

        let extension = match descriptor.kind {
            TaskKind::Image => "png",
            TaskKind::Video => "mp4",
        };
        Ok(TaskOutput {
            url: format!(
                "sim://{}/{}/{}.{}",
                descriptor.kind, descriptor.shot_id, call, extension
            ),
        })
    }
}
