//! Prometheus metrics for Uploadkeeper.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`
//! and defines the metric names the registry reports.  Without an installed
//! recorder the `metrics` macros are no-ops, so library users who do not
//! call [`init_metrics`] pay nothing.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

// -- Metric name constants ----------------------------------------------------

/// Ingest attempts (counter). Labels: status (completed, failed, write_failed).
pub const UPLOADS_TOTAL: &str = "uploadkeeper_uploads_total";

/// Bytes stored by successful ingests (counter).
pub const BYTES_INGESTED_TOTAL: &str = "uploadkeeper_bytes_ingested_total";

/// Delete attempts (counter). Labels: outcome (deleted, not_found, failed).
pub const DELETES_TOTAL: &str = "uploadkeeper_deletes_total";

/// Files removed by cleanup sweeps (counter).
pub const CLEANUP_REMOVED_TOTAL: &str = "uploadkeeper_cleanup_removed_total";

/// Records currently held in the in-memory index (gauge).
pub const ACTIVE_UPLOADS: &str = "uploadkeeper_active_uploads";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent.
///
/// Returns `None` when another recorder was already installed in this
/// process.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                describe_metrics();
                Some(handle)
            }
            Err(e) => {
                tracing::warn!("Prometheus recorder not installed: {}", e);
                None
            }
        })
        .as_ref()
}

/// Register metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!(UPLOADS_TOTAL, "Ingest attempts by outcome");
    describe_counter!(BYTES_INGESTED_TOTAL, "Bytes stored by successful ingests");
    describe_counter!(DELETES_TOTAL, "Delete attempts by outcome");
    describe_counter!(CLEANUP_REMOVED_TOTAL, "Files removed by cleanup sweeps");
    describe_gauge!(ACTIVE_UPLOADS, "Records in the in-memory upload index");
}

/// Render the current Prometheus exposition text, if a recorder is installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE
        .get()
        .and_then(|handle| handle.as_ref())
        .map(|handle| handle.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::counter;

    #[test]
    fn test_init_is_idempotent_and_renders() {
        let first = init_metrics().map(|h| h as *const PrometheusHandle);
        let second = init_metrics().map(|h| h as *const PrometheusHandle);
        assert_eq!(first, second);

        if first.is_some() {
            counter!(DELETES_TOTAL, "outcome" => "deleted").increment(1);
            let text = render().expect("recorder installed");
            assert!(text.contains(DELETES_TOTAL));
        }
    }
}
