//! Model validation errors.

use thiserror::Error;

use crate::PipelineStage;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid stage weights: {0}")]
    InvalidWeights(String),

    #[error("Invalid stage transition from {from} to {to}")]
    InvalidTransition {
        from: PipelineStage,
        to: PipelineStage,
    },
}
