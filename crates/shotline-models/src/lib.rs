//! Shared data models for the Shotline generation pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Storyboard shots, characters and locations
//! - Task descriptors, results and error classification
//! - Batch and pipeline progress snapshots
//! - Pipeline stages and stage weights
//! - Generated assets, run results and persisted snapshots
//! - Tagged event schemas for streaming progress to a UI

pub mod asset;
pub mod error;
pub mod events;
pub mod ids;
pub mod progress;
pub mod shot;
pub mod stage;
pub mod style;
pub mod task;

// Re-export common types
pub use asset::{GeneratedAsset, PipelineResult, RunSnapshot, TOTAL_DURATION_KEY};
pub use error::{ModelError, ModelResult};
pub use events::{BatchEvent, ErrorScope, PipelineEvent};
pub use ids::{BatchId, TaskId};
pub use progress::{percentage_of, BatchProgress, ItemStatus, PipelineProgress, RunStatus};
pub use shot::{Character, Location, Shot};
pub use stage::{PipelineStage, StageWeights};
pub use style::{AspectRatio, AspectRatioParseError};
pub use task::{TaskDescriptor, TaskErrorKind, TaskKind, TaskOutput, TaskResult};
