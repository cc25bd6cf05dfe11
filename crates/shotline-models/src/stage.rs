//! Pipeline stage state machine and progress weighting.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, ModelResult};

/// Phase of a pipeline run.
///
/// Moves strictly forward: `Idle → Parsing → Storyboard → Images → Videos →
/// Completed`. `Parsing` and `Videos` may be skipped, `Error` is reachable
/// from any non-terminal state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    #[default]
    Idle,
    Parsing,
    Storyboard,
    Images,
    Videos,
    Completed,
    Error,
}

impl PipelineStage {
    /// Stages that carry a progress weight, in execution order.
    pub const WORK_STAGES: [PipelineStage; 4] = [
        PipelineStage::Parsing,
        PipelineStage::Storyboard,
        PipelineStage::Images,
        PipelineStage::Videos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Parsing => "parsing",
            PipelineStage::Storyboard => "storyboard",
            PipelineStage::Images => "images",
            PipelineStage::Videos => "videos",
            PipelineStage::Completed => "completed",
            PipelineStage::Error => "error",
        }
    }

    /// Name shown to users when the stage starts.
    pub fn human_name(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "Idle",
            PipelineStage::Parsing => "Parsing script",
            PipelineStage::Storyboard => "Preparing storyboard",
            PipelineStage::Images => "Generating images",
            PipelineStage::Videos => "Generating videos",
            PipelineStage::Completed => "Completed",
            PipelineStage::Error => "Failed",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Completed | PipelineStage::Error)
    }

    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(&self, next: PipelineStage) -> bool {
        use PipelineStage::*;

        if self.is_terminal() {
            return false;
        }

        match next {
            Error => true,
            Idle => false,
            Completed => matches!(self, Images | Videos),
            Parsing => *self == Idle,
            Storyboard => matches!(self, Idle | Parsing),
            Images => *self == Storyboard,
            Videos => *self == Images,
        }
    }

    /// Validated transition.
    pub fn transition(self, next: PipelineStage) -> ModelResult<PipelineStage> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ModelError::InvalidTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Share of overall progress (in percent) assigned to each work stage.
///
/// Only constructed through [`StageWeights::new`] or parsing, so the table is
/// always valid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageWeights {
    parsing: f64,
    storyboard: f64,
    images: f64,
    videos: f64,
}

impl StageWeights {
    /// Validate and build a weight table. Weights must be non-negative and
    /// sum to at most 100.
    pub fn new(parsing: f64, storyboard: f64, images: f64, videos: f64) -> ModelResult<Self> {
        let weights = [parsing, storyboard, images, videos];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ModelError::InvalidWeights(format!(
                "weights must be non-negative numbers, got {:?}",
                weights
            )));
        }

        let total: f64 = weights.iter().sum();
        if total > 100.0 {
            return Err(ModelError::InvalidWeights(format!(
                "weights sum to {}, must be at most 100",
                total
            )));
        }

        Ok(Self {
            parsing,
            storyboard,
            images,
            videos,
        })
    }

    /// Weight of a single stage (zero for stages that carry none).
    pub fn weight(&self, stage: PipelineStage) -> f64 {
        match stage {
            PipelineStage::Parsing => self.parsing,
            PipelineStage::Storyboard => self.storyboard,
            PipelineStage::Images => self.images,
            PipelineStage::Videos => self.videos,
            _ => 0.0,
        }
    }

    /// Sum of the weights of every work stage ordered strictly before `stage`.
    pub fn completed_before(&self, stage: PipelineStage) -> f64 {
        PipelineStage::WORK_STAGES
            .iter()
            .filter(|s| **s < stage)
            .map(|s| self.weight(*s))
            .sum()
    }

    /// Overall progress (0-100) for `stage_progress` percent inside `stage`.
    pub fn overall(&self, stage: PipelineStage, stage_progress: f64) -> f64 {
        match stage {
            PipelineStage::Idle => 0.0,
            PipelineStage::Completed => 100.0,
            // Error has no weight of its own; callers keep the last value.
            PipelineStage::Error => self.completed_before(PipelineStage::Completed),
            _ => {
                let fraction = stage_progress.clamp(0.0, 100.0) / 100.0;
                self.completed_before(stage) + fraction * self.weight(stage)
            }
        }
    }
}

impl Default for StageWeights {
    fn default() -> Self {
        Self {
            parsing: 5.0,
            storyboard: 10.0,
            images: 70.0,
            videos: 15.0,
        }
    }
}

impl std::str::FromStr for StageWeights {
    type Err = ModelError;

    /// Parse `"parsing,storyboard,images,videos"`, e.g. `"5,10,70,15"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| ModelError::InvalidWeights(format!("cannot parse '{}'", s)))?;

        match parts.as_slice() {
            [parsing, storyboard, images, videos] => {
                Self::new(*parsing, *storyboard, *images, *videos)
            }
            _ => Err(ModelError::InvalidWeights(format!(
                "expected 4 comma-separated weights, got '{}'",
                s
            ))),
        }
    }
}
