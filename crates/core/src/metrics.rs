//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Update pipeline (outcomes, gate failures)
//! - Catalog calls
//! - Queue worker message handling

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Update pipeline
// =============================================================================

/// Jobs processed by outcome.
pub static UPDATE_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("itemupdate_outcomes_total", "Total update jobs by outcome"),
        &["outcome"], // "completed", "aborted", "already_applied", "error"
    )
    .unwrap()
});

/// Aborted jobs by gate failure kind.
pub static GATE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "itemupdate_gate_failures_total",
            "Total update jobs aborted at a gate",
        ),
        &["kind"],
    )
    .unwrap()
});

/// Catalog update call duration in seconds.
pub static CATALOG_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "itemupdate_catalog_request_duration_seconds",
            "Duration of catalog item update calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 90.0]),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

// =============================================================================
// Queue worker
// =============================================================================

/// Queue messages handled by the worker.
pub static WORKER_MESSAGES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "itemupdate_worker_messages_total",
            "Total queue messages handled by the worker",
        ),
        &["result"], // "deleted", "retained", "poisoned"
    )
    .unwrap()
});

/// Messages currently being processed.
pub static WORKER_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "itemupdate_worker_in_flight",
        "Queue messages currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(UPDATE_OUTCOMES.clone()),
        Box::new(GATE_FAILURES.clone()),
        Box::new(CATALOG_REQUEST_DURATION.clone()),
        Box::new(WORKER_MESSAGES.clone()),
        Box::new(WORKER_IN_FLIGHT.clone()),
    ]
}
