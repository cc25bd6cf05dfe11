//! Orchestrator error types.
//!
//! Only setup failures and stage-fatal failures surface here. Per-item
//! failures are recorded as failed `TaskResult`s and never become errors.

use shotline_models::{ModelError, PipelineStage};
use shotline_storage::StorageError;
use thiserror::Error;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("A run is already in progress")]
    AlreadyRunning,

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("{message}")]
    Stage {
        stage: PipelineStage,
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl OrchestratorError {
    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    pub fn stage_failed(stage: PipelineStage, msg: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: msg.into(),
        }
    }

    /// Rejected before any work started.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            OrchestratorError::AlreadyRunning | OrchestratorError::MissingInput(_)
        )
    }
}
