//! Orchestrator metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Finished work items by kind and status.
    pub const ITEMS_TOTAL: &str = "shotline_items_total";

    /// Finished runs by operation and outcome.
    pub const RUNS_TOTAL: &str = "shotline_runs_total";

    /// Wall-clock duration of each pipeline stage.
    pub const STAGE_DURATION_SECONDS: &str = "shotline_stage_duration_seconds";
}

pub fn record_item(kind: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        names::ITEMS_TOTAL,
        "kind" => kind.to_string(),
        "status" => status
    )
    .increment(1);
}

/// `outcome` is one of "completed", "cancelled" or "error".
pub fn record_run(operation: &str, outcome: &'static str) {
    counter!(
        names::RUNS_TOTAL,
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_stage_duration(stage: &str, duration_secs: f64) {
    histogram!(
        names::STAGE_DURATION_SECONDS,
        "stage" => stage.to_string()
    )
    .record(duration_secs);
}
