//! Tagged event types for streaming orchestrator callbacks over a channel.
//!
//! Each variant mirrors one observer callback; the serialized form is what a
//! UI subscribes to.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{BatchProgress, GeneratedAsset, PipelineProgress, PipelineStage, Shot, TaskResult};

/// Where an error originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "scope", content = "value", rename_all = "snake_case")]
pub enum ErrorScope {
    /// A single work item; the run continues
    Item(usize),
    /// A whole pipeline stage; the run aborts
    Stage(PipelineStage),
}

/// Events emitted by a batch run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    Progress {
        progress: BatchProgress,
    },
    ItemComplete {
        index: usize,
        result: TaskResult,
        shot: Shot,
    },
    BatchComplete {
        results: Vec<TaskResult>,
    },
    Error {
        index: usize,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        shot: Option<Shot>,
    },
}

/// Events emitted by a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Progress {
        progress: PipelineProgress,
    },
    StageChange {
        stage: PipelineStage,
        #[serde(rename = "humanName")]
        human_name: String,
    },
    ImageGenerated {
        index: usize,
        asset: GeneratedAsset,
    },
    VideoGenerated {
        index: usize,
        asset: GeneratedAsset,
    },
    Error {
        scope: ErrorScope,
        message: String,
    },
}

impl PipelineEvent {
    /// Stage-change event with the stage's display name.
    pub fn stage_change(stage: PipelineStage) -> Self {
        PipelineEvent::StageChange {
            stage,
            human_name: stage.human_name().to_string(),
        }
    }
}
