//! Generated assets and the final pipeline result.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{BatchId, PipelineStage, TaskId, TaskKind, TaskResult};

/// An image or video produced for one shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedAsset {
    /// Index of the shot in the storyboard
    pub index: usize,
    pub shot_id: String,
    pub kind: TaskKind,
    pub url: String,
    pub task_id: TaskId,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

impl GeneratedAsset {
    /// Build an asset from a successful task result. Returns `None` for
    /// failed results or results without a payload.
    pub fn from_result(
        index: usize,
        shot_id: impl Into<String>,
        kind: TaskKind,
        prompt: impl Into<String>,
        result: &TaskResult,
    ) -> Option<Self> {
        if !result.success {
            return None;
        }
        let url = result.url()?;
        Some(Self {
            index,
            shot_id: shot_id.into(),
            kind,
            url: url.to_string(),
            task_id: result.task_id.clone(),
            prompt: prompt.into(),
            created_at: Utc::now(),
        })
    }
}

/// Key under which the whole-run duration is stored in `stage_durations`.
pub const TOTAL_DURATION_KEY: &str = "total";

/// Outcome of a pipeline run, including partial results on failure or cancel.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub batch_id: BatchId,
    pub success: bool,
    /// Last stage reached (`completed` or `error` unless cancelled)
    pub stage: PipelineStage,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// One entry per attempted image item, in shot order
    pub image_results: Vec<TaskResult>,
    pub images: Vec<GeneratedAsset>,
    pub videos: Vec<GeneratedAsset>,
    /// Wall-clock milliseconds per stage plus a `total` entry
    pub stage_durations: BTreeMap<String, u64>,
}

impl PipelineResult {
    pub fn new(batch_id: BatchId) -> Self {
        Self {
            batch_id,
            success: false,
            stage: PipelineStage::Idle,
            cancelled: false,
            error: None,
            image_results: Vec::new(),
            images: Vec::new(),
            videos: Vec::new(),
            stage_durations: BTreeMap::new(),
        }
    }

    /// Duration of a stage in milliseconds, if it ran.
    pub fn duration_ms(&self, stage: PipelineStage) -> Option<u64> {
        self.stage_durations.get(stage.as_str()).copied()
    }

    pub fn total_duration_ms(&self) -> Option<u64> {
        self.stage_durations.get(TOTAL_DURATION_KEY).copied()
    }
}

/// Persisted record of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub batch_id: BatchId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub finished_at: DateTime<Utc>,
    pub result: PipelineResult,
}

impl RunSnapshot {
    pub fn new(project_id: Option<String>, result: PipelineResult) -> Self {
        Self {
            batch_id: result.batch_id.clone(),
            project_id,
            finished_at: Utc::now(),
            result,
        }
    }
}
