//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Job coordinator (submissions, outcomes, durations, active jobs)
//! - Transfer (bytes fetched, results served)
//! - Transform (images rewritten)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Coordinator Metrics
// =============================================================================

/// Jobs accepted by the coordinator.
pub static JOBS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("pressroom_jobs_submitted_total", "Total jobs accepted").unwrap()
});

/// Jobs reaching a terminal phase, by outcome.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pressroom_jobs_finished_total", "Total jobs finished"),
        &["outcome"], // "completed", "fetch", "transform", "cancelled"
    )
    .unwrap()
});

/// Wall time from permit acquisition to terminal phase.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("pressroom_job_duration_seconds", "Duration of a job run")
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Jobs currently holding a worker permit.
pub static ACTIVE_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("pressroom_active_jobs", "Jobs currently fetching or transforming").unwrap()
});

// =============================================================================
// Transfer Metrics
// =============================================================================

/// Bytes written to working storage by completed fetches.
pub static BYTES_FETCHED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("pressroom_bytes_fetched_total", "Total source bytes fetched").unwrap()
});

/// Result downloads started.
pub static RESULTS_SERVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("pressroom_results_served_total", "Total result downloads opened").unwrap()
});

// =============================================================================
// Transform Metrics
// =============================================================================

/// Images re-encoded and substituted.
pub static IMAGES_TRANSFORMED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pressroom_images_transformed_total",
        "Total embedded images rewritten",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Coordinator
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(ACTIVE_JOBS.clone()),
        // Transfer
        Box::new(BYTES_FETCHED.clone()),
        Box::new(RESULTS_SERVED.clone()),
        // Transform
        Box::new(IMAGES_TRANSFORMED.clone()),
    ]
}
