//! Task descriptors submitted to the generation backend and their results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AspectRatio, TaskId};

/// What a task asks the backend to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Image,
    Video,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Image => "image",
            TaskKind::Video => "video",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-resolved generation request for one work item.
///
/// Built fresh for every item and never mutated after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub kind: TaskKind,
    /// Shot this task was derived from
    pub shot_id: String,
    /// Position of the shot in the run
    pub index: usize,
    /// Enriched prompt text
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub art_style: Option<String>,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
    /// Reference image URLs (at most one per matched location/character)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_images: Vec<String>,
    /// Still image to animate (video tasks only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image_url: Option<String>,
}

/// Successful output of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskOutput {
    /// Location of the generated asset
    pub url: String,
}

/// Terminal outcome of one submitted task. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: TaskId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<TaskOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TaskResult {
    /// A successful result carrying the produced asset.
    pub fn succeeded(task_id: TaskId, output: TaskOutput) -> Self {
        Self {
            task_id,
            success: true,
            payload: Some(output),
            error_message: None,
        }
    }

    /// A failed result with an error message.
    pub fn failed(task_id: TaskId, message: impl Into<String>) -> Self {
        Self {
            task_id,
            success: false,
            payload: None,
            error_message: Some(message.into()),
        }
    }

    /// URL of the produced asset, if any.
    pub fn url(&self) -> Option<&str> {
        self.payload.as_ref().map(|p| p.url.as_str())
    }
}

/// Structured classification of a task failure.
///
/// Transport layers tag their errors with a kind at the point of origin;
/// [`TaskErrorKind::classify`] is only a fallback for foreign error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "kind", content = "status")]
pub enum TaskErrorKind {
    /// Connection refused/reset, DNS failure, ...
    Network,
    /// The attempt exceeded its deadline
    Timeout,
    /// HTTP 429 or an explicit rate-limit response
    RateLimited,
    /// HTTP 5xx
    Server(u16),
    /// HTTP 4xx other than 429
    Client(u16),
    /// Error explicitly marked as temporary by its producer
    Temporary,
    /// The task was cancelled before producing a result
    Cancelled,
    /// Anything else
    Fatal,
}

impl TaskErrorKind {
    /// Whether a failure of this kind is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskErrorKind::Network
                | TaskErrorKind::Timeout
                | TaskErrorKind::RateLimited
                | TaskErrorKind::Server(_)
                | TaskErrorKind::Temporary
        )
    }

    /// Classify an untyped error message by inspecting its text.
    pub fn classify(message: &str) -> Self {
        let msg = message.to_lowercase();

        if msg.contains("cancelled") || msg.contains("canceled") {
            return TaskErrorKind::Cancelled;
        }

        if msg.contains("timed out") || msg.contains("timeout") {
            return TaskErrorKind::Timeout;
        }

        if msg.contains("rate limit") || msg.contains("too many requests") {
            return TaskErrorKind::RateLimited;
        }

        if let Some(status) = http_status(&msg) {
            return match status {
                429 => TaskErrorKind::RateLimited,
                500..=599 => TaskErrorKind::Server(status),
                400..=499 => TaskErrorKind::Client(status),
                _ => TaskErrorKind::Fatal,
            };
        }

        if msg.contains("temporary") || msg.contains("temporarily") {
            return TaskErrorKind::Temporary;
        }

        if msg.contains("network")
            || msg.contains("connection")
            || msg.contains("econnreset")
            || msg.contains("econnrefused")
            || msg.contains("socket")
            || msg.contains("dns")
        {
            return TaskErrorKind::Network;
        }

        TaskErrorKind::Fatal
    }
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskErrorKind::Network => f.write_str("network"),
            TaskErrorKind::Timeout => f.write_str("timeout"),
            TaskErrorKind::RateLimited => f.write_str("rate_limited"),
            TaskErrorKind::Server(code) => write!(f, "server_{}", code),
            TaskErrorKind::Client(code) => write!(f, "client_{}", code),
            TaskErrorKind::Temporary => f.write_str("temporary"),
            TaskErrorKind::Cancelled => f.write_str("cancelled"),
            TaskErrorKind::Fatal => f.write_str("fatal"),
        }
    }
}

/// First standalone three-digit number in the 100..=599 range.
fn http_status(msg: &str) -> Option<u16> {
    let bytes = msg.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i - start == 3 {
            if let Ok(code) = msg[start..i].parse::<u16>() {
                if (100..=599).contains(&code) {
                    return Some(code);
                }
            }
        }
    }
    None
}
