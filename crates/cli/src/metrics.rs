//! Prometheus metrics for a single run.
//!
//! The core component metrics are registered alongside a few run-level
//! gauges, and the whole registry is written out in text format at the end
//! of a run for a node exporter textfile collector to pick up.

use std::path::Path;

use once_cell::sync::Lazy;
use prometheus::{self, Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use bookhound_core::RunSummary;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// Run Metrics
// =============================================================================

/// Item counts of the last run by outcome.
pub static LAST_RUN_ITEMS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("bookhound_last_run_items", "Item counts of the last run"),
        &["outcome"], // "wanted", "enqueued", "downloaded", "imported", "rejected", "failed"
    )
    .unwrap()
});

/// Whether the last run finished without a fatal error.
pub static LAST_RUN_SUCCESS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "bookhound_last_run_success",
        "1 if the last run completed, 0 if it aborted",
    )
    .unwrap()
});

/// Unix time the last run finished.
pub static LAST_RUN_TIMESTAMP: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "bookhound_last_run_timestamp_seconds",
        "Unix time the last run finished",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(LAST_RUN_ITEMS.clone()))
        .unwrap();
    registry
        .register(Box::new(LAST_RUN_SUCCESS.clone()))
        .unwrap();
    registry
        .register(Box::new(LAST_RUN_TIMESTAMP.clone()))
        .unwrap();

    // Core metrics (search, downloads, imports)
    for metric in bookhound_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Record the outcome of a run in the run-level gauges.
pub fn record_run(summary: Option<&RunSummary>, finished_at: i64) {
    LAST_RUN_TIMESTAMP.set(finished_at);
    let Some(summary) = summary else {
        LAST_RUN_SUCCESS.set(0);
        return;
    };
    LAST_RUN_SUCCESS.set(1);
    for (outcome, count) in [
        ("wanted", summary.wanted),
        ("enqueued", summary.enqueued),
        ("downloaded", summary.downloaded),
        ("imported", summary.imported),
        ("rejected", summary.rejected),
        ("failed", summary.failed),
    ] {
        LAST_RUN_ITEMS
            .with_label_values(&[outcome])
            .set(count as i64);
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Write the encoded metrics to `path`, replacing it atomically.
pub async fn write_textfile(path: &Path) -> anyhow::Result<()> {
    let content = encode_metrics()?;
    let tmp = path.with_extension("prom.tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        bookhound_core::metrics::SEARCHES_TOTAL
            .with_label_values(&["results"])
            .inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("bookhound_searches_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_record_run_sets_gauges() {
        let summary = RunSummary {
            wanted: 4,
            enqueued: 3,
            downloaded: 2,
            imported: 2,
            rejected: 0,
            failed: 2,
        };
        record_run(Some(&summary), 1_700_000_000);

        let output = encode_metrics().unwrap();
        assert!(output.contains("bookhound_last_run_items{outcome=\"wanted\"} 4"));
        assert!(output.contains("bookhound_last_run_success 1"));
        assert!(output.contains("bookhound_last_run_timestamp_seconds 1700000000"));
    }

    #[tokio::test]
    async fn test_write_textfile() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bookhound.prom");

        write_textfile(&path).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("bookhound_last_run_success"));
        assert!(!dir.path().join("bookhound.prom.tmp").exists());
    }
}
