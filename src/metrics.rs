// src/metrics.rs
//! Metric names used across the pipeline. Series are emitted through the `metrics`
//! facade; installing a recorder/exporter is left to the embedding application.

use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

pub const API_CALLS_TOTAL: &str = "impact_api_calls_total";
pub const API_FAILURES_TOTAL: &str = "impact_api_failures_total";
pub const CACHE_HITS_TOTAL: &str = "impact_cache_hits_total";
pub const CACHE_MISSES_TOTAL: &str = "impact_cache_misses_total";
pub const CALL_LOG_DROPPED_TOTAL: &str = "impact_call_log_dropped_total";
pub const NOTIFICATIONS_TRIGGERED_TOTAL: &str = "impact_notifications_triggered_total";
pub const PIPELINE_RUNS_TOTAL: &str = "impact_pipeline_runs_total";
pub const PIPELINE_DURATION_MS: &str = "impact_pipeline_duration_ms";

/// One-time metrics registration (so series show up with descriptions).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(API_CALLS_TOTAL, "External API attempts, labelled by api.");
        describe_counter!(
            API_FAILURES_TOTAL,
            "External API attempts that failed (network or non-2xx)."
        );
        describe_counter!(CACHE_HITS_TOTAL, "Response cache hits, labelled by api.");
        describe_counter!(CACHE_MISSES_TOTAL, "Response cache misses, labelled by api.");
        describe_counter!(
            CALL_LOG_DROPPED_TOTAL,
            "Call records dropped because the log channel was full or closed."
        );
        describe_counter!(
            NOTIFICATIONS_TRIGGERED_TOTAL,
            "Notification rules that fired."
        );
        describe_counter!(
            PIPELINE_RUNS_TOTAL,
            "Impact Card pipeline runs, labelled by outcome."
        );
        describe_histogram!(
            PIPELINE_DURATION_MS,
            "Wall-clock duration of a pipeline run in milliseconds."
        );
    });
}
