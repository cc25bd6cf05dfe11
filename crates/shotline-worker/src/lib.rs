//! Batch and pipeline orchestration.
//!
//! This crate provides:
//! - Batch orchestrator driving shots through a task submission port
//! - Pipeline orchestrator sequencing parsing, storyboard, images and videos
//! - Observer traits and channel adapters for progress streaming
//! - Prompt enrichment from characters and locations
//! - A simulated generation backend for dry runs

pub mod batch;
pub mod config;
mod control;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod observer;
pub mod pipeline;
pub mod prompt;
pub mod simulated;

pub use batch::{BatchConfig, BatchOrchestrator, GenerationSettings};
pub use config::WorkerConfig;
pub use error::{OrchestratorError, OrchestratorResult};
pub use logging::RunLogger;
pub use observer::{BatchObserver, NoopObserver, PipelineObserver};
pub use pipeline::{PipelineConfig, PipelineOrchestrator};
pub use prompt::build_prompt;
pub use simulated::{SimulatedBackend, SimulationConfig};
