//! Prometheus metrics for the job runner and the replication log.
//!
//! Recording is a no-op until [`init_metrics`] installs the recorder, so the
//! library can be used (and tested) without it.

use std::sync::OnceLock;
use std::time::Duration;

use jobdeck_core::JobStatus;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder.
///
/// Returns `true` on first successful initialization, `false` if a recorder
/// was already installed.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }
    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();
    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!(
        "jobdeck_job_transitions_total",
        "Job status transitions, labelled by the status entered"
    );
    describe_counter!(
        "jobdeck_sync_appends_total",
        "Operations appended to the replication log"
    );
    describe_histogram!(
        "jobdeck_backfill_duration_seconds",
        "Duration of backfill runs in seconds"
    );
    describe_gauge!(
        "jobdeck_backfill_appended",
        "Operations appended by the last successful backfill"
    );
}

/// Current metrics in Prometheus text format, `None` before [`init_metrics`].
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_job_transition(status: JobStatus) {
    counter!("jobdeck_job_transitions_total", "status" => status.as_str()).increment(1);
}

pub fn record_sync_append() {
    counter!("jobdeck_sync_appends_total").increment(1);
}

/// Record a finished backfill. `appended` is `None` when the run failed.
pub fn record_backfill(duration: Duration, appended: Option<u64>) {
    let outcome = if appended.is_some() { "ok" } else { "error" };
    histogram!("jobdeck_backfill_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());

    if let Some(count) = appended {
        gauge!("jobdeck_backfill_appended").set(count as f64);
    }
}
