//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Searches and matching
//! - Downloads (enqueues, retries, aborts)
//! - Imports (validation, quarantine, library commands)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Search Metrics
// =============================================================================

/// Searches issued by outcome.
pub static SEARCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bookhound_searches_total", "Total searches issued"),
        &["result"], // "results", "empty", "timeout", "error"
    )
    .unwrap()
});

/// Fallback searches with a truncated title.
pub static FALLBACK_SEARCHES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "bookhound_fallback_searches_total",
        "Searches retried with the title truncated at ':'",
    )
    .unwrap()
});

/// Peer responses returned per search.
pub static SEARCH_RESPONSES: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "bookhound_search_responses",
            "Number of peer responses per search",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
    )
    .unwrap()
});

/// Accepted match scores.
pub static MATCH_SCORE: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("bookhound_match_score", "Distribution of accepted match scores")
            .buckets(vec![0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 1.1, 1.2, 1.3]),
        &["filetype"],
    )
    .unwrap()
});

// =============================================================================
// Download Metrics
// =============================================================================

/// Downloads enqueued.
pub static DOWNLOADS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("bookhound_downloads_started_total", "Total downloads enqueued").unwrap()
});

/// Downloads that reached every file succeeded.
pub static DOWNLOADS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "bookhound_downloads_completed_total",
        "Total downloads completed",
    )
    .unwrap()
});

/// Downloads aborted by reason.
pub static DOWNLOADS_ABORTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bookhound_downloads_aborted_total", "Total downloads aborted"),
        &["reason"],
    )
    .unwrap()
});

/// Per-file retry attempts.
pub static RETRY_ATTEMPTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "bookhound_file_retries_total",
        "Total per-file download retries",
    )
    .unwrap()
});

/// Record lifetime until a terminal state, in seconds.
pub static DOWNLOAD_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "bookhound_download_duration_seconds",
            "Time from enqueue to terminal state",
        )
        .buckets(vec![10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]),
        &["result"], // "succeeded", "aborted"
    )
    .unwrap()
});

// =============================================================================
// Import Metrics
// =============================================================================

/// Metadata validation outcomes.
pub static VALIDATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bookhound_validations_total", "Total metadata validations"),
        &["format", "result"], // result: "accepted", "rejected"
    )
    .unwrap()
});

/// Files or directories moved into quarantine.
pub static QUARANTINED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("bookhound_quarantined_total", "Total quarantined entries").unwrap()
});

/// Library import commands by final status.
pub static IMPORT_COMMANDS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bookhound_import_commands_total", "Total import commands"),
        &["status"], // "completed", "failed", "unknown"
    )
    .unwrap()
});

/// Wanted items that ended in failure.
pub static ITEMS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("bookhound_items_failed_total", "Total wanted items failed").unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Search
        Box::new(SEARCHES_TOTAL.clone()),
        Box::new(FALLBACK_SEARCHES.clone()),
        Box::new(SEARCH_RESPONSES.clone()),
        Box::new(MATCH_SCORE.clone()),
        // Downloads
        Box::new(DOWNLOADS_STARTED.clone()),
        Box::new(DOWNLOADS_COMPLETED.clone()),
        Box::new(DOWNLOADS_ABORTED.clone()),
        Box::new(RETRY_ATTEMPTS.clone()),
        Box::new(DOWNLOAD_DURATION.clone()),
        // Import
        Box::new(VALIDATIONS_TOTAL.clone()),
        Box::new(QUARANTINED_TOTAL.clone()),
        Box::new(IMPORT_COMMANDS.clone()),
        Box::new(ITEMS_FAILED.clone()),
    ]
}
