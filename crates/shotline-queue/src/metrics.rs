//! Queue metrics collection.
//!
//! Provides standardized metrics for monitoring task submission:
//! - Retry counters by operation
//! - Task outcome counters by kind and status

use metrics::counter;

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Total retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "shotline_retries_total";

    /// Total submitted tasks by kind.
    pub const TASKS_SUBMITTED_TOTAL: &str = "shotline_tasks_submitted_total";

    /// Total finished tasks by kind and status.
    pub const TASKS_FINISHED_TOTAL: &str = "shotline_tasks_finished_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a task submission.
pub fn record_submitted(kind: &str) {
    counter!(
        names::TASKS_SUBMITTED_TOTAL,
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a task reaching a terminal state.
pub fn record_finished(kind: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        names::TASKS_FINISHED_TOTAL,
        "kind" => kind.to_string(),
        "status" => status
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::RETRIES_TOTAL.contains("retries"));
        assert!(names::TASKS_SUBMITTED_TOTAL.contains("submitted"));
        assert!(names::TASKS_FINISHED_TOTAL.contains("finished"));
    }
}
