//! Prometheus Metrics Module
//!
//! One counter per stage transition, matching the pipeline's
//! operational surface: decoded / rejected / duplicate / admitted /
//! flushed / committed / failed-row / failed-batch. Exposed at
//! `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::candle::RejectReason;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");
            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn register_metrics() {
    describe_counter!(
        "ohlcv_ingest_decoded_total",
        "Envelopes run through the decoder"
    );
    describe_counter!(
        "ohlcv_ingest_rejected_total",
        "Updates rejected during normalization, by reason"
    );
    describe_counter!(
        "ohlcv_ingest_duplicate_total",
        "Records dropped as redelivered duplicates"
    );
    describe_counter!(
        "ohlcv_ingest_admitted_total",
        "Records admitted past the deduplicator"
    );
    describe_counter!(
        "ohlcv_ingest_flushed_total",
        "Records handed to the sink in drained batches"
    );
    describe_counter!(
        "ohlcv_ingest_committed_rows_total",
        "Rows durably committed"
    );
    describe_counter!(
        "ohlcv_ingest_failed_rows_total",
        "Rows that failed row-level persistence inside committed batches"
    );
    describe_counter!(
        "ohlcv_ingest_failed_batches_total",
        "Batch commit failures (whole batch rolled back)"
    );
    describe_counter!(
        "ohlcv_ingest_commit_retries_total",
        "Batch commit retry attempts"
    );
    describe_gauge!(
        "ohlcv_ingest_dedup_entries",
        "Fingerprints currently held in each worker's dedup window"
    );
    describe_gauge!(
        "ohlcv_ingest_batch_fill",
        "Records currently buffered in each worker's batch accumulator"
    );
    describe_histogram!(
        "ohlcv_ingest_commit_seconds",
        "Batch write-and-commit duration"
    );
}

/// Record an envelope passing through the decoder.
pub fn record_decoded() {
    counter!("ohlcv_ingest_decoded_total").increment(1);
}

/// Record a rejected update with its reason label.
pub fn record_rejected(reason: RejectReason) {
    counter!("ohlcv_ingest_rejected_total", "reason" => reason.as_str()).increment(1);
}

/// Record a duplicate drop.
pub fn record_duplicate() {
    counter!("ohlcv_ingest_duplicate_total").increment(1);
}

/// Record an admitted record.
pub fn record_admitted() {
    counter!("ohlcv_ingest_admitted_total").increment(1);
}

/// Record records flushed toward the sink.
pub fn record_flushed(count: u64) {
    counter!("ohlcv_ingest_flushed_total").increment(count);
}

/// Record rows committed durably.
pub fn record_committed_rows(count: u64) {
    counter!("ohlcv_ingest_committed_rows_total").increment(count);
}

/// Record rows that failed inside an otherwise-committed batch.
pub fn record_failed_rows(count: u64) {
    if count > 0 {
        counter!("ohlcv_ingest_failed_rows_total").increment(count);
    }
}

/// Record a failed batch commit.
pub fn record_failed_batch() {
    counter!("ohlcv_ingest_failed_batches_total").increment(1);
}

/// Record a commit retry attempt.
pub fn record_commit_retry() {
    counter!("ohlcv_ingest_commit_retries_total").increment(1);
}

/// Update a worker's dedup window size.
pub fn set_dedup_entries(worker: usize, entries: usize) {
    gauge!("ohlcv_ingest_dedup_entries", "worker" => worker.to_string()).set(entries as f64);
}

/// Update a worker's batch accumulator fill level.
pub fn set_batch_fill(worker: usize, buffered: usize) {
    gauge!("ohlcv_ingest_batch_fill", "worker" => worker.to_string()).set(buffered as f64);
}

/// Record one batch's write-and-commit duration.
pub fn record_commit_duration(duration: Duration) {
    histogram!("ohlcv_ingest_commit_seconds").record(duration.as_secs_f64());
}
