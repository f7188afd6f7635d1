//! Pipeline Worker
//!
//! One logical worker owning the full record path:
//!
//! ```text
//! envelope → decode → normalize → dedup admit → batch → durable sink
//! ```
//!
//! A record is either fully processed or not yet started; there is no
//! mid-record cancellation. On shutdown the worker drains and flushes
//! the residual batch before exiting. Records admitted but not yet
//! flushed when the process dies abruptly are lost; the batch boundary
//! is not persistent.
//!
//! Scale-out runs N workers, each owning an independent membership set,
//! accumulator, and store handle. Correctness requires that the same
//! symbol always routes to the same worker (see
//! `infrastructure::source::partition_for_symbol`).

use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{CandleStore, EnvelopeSource, RawEnvelope, StoreError};
use crate::application::services::batcher::BatchAccumulator;
use crate::application::services::retry::{CommitBackoff, CommitRetryPolicy};
use crate::domain::candle::normalize;
use crate::domain::fingerprint::{Admission, DedupWindow};
use crate::infrastructure::codec::EnvelopeCodec;
use crate::infrastructure::metrics;

/// Tuning knobs for one pipeline worker.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// How long a fingerprint stays in the dedup window.
    pub dedup_window: Duration,
    /// Flush when the batch reaches this many records.
    pub batch_max_size: usize,
    /// Flush when the oldest buffered record is this old.
    pub batch_max_age: Duration,
    /// Retry bounds for failed batch commits.
    pub retry: CommitRetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(3600),
            batch_max_size: 200,
            batch_max_age: Duration::from_secs(2),
            retry: CommitRetryPolicy::default(),
        }
    }
}

/// Fatal pipeline failures.
///
/// Stage-local errors (decode, normalize, duplicate) are absorbed and
/// counted; only exhausted commit retries propagate, because dropping a
/// batch at the sink would be silent data loss.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Every commit attempt for a batch failed.
    #[error("batch commit attempts exhausted after {attempts}: {source}")]
    CommitExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// The last store error.
        #[source]
        source: StoreError,
    },
}

/// Single pipeline worker: one envelope at a time, sink invoked
/// synchronously on flush.
pub struct PipelineWorker<S, C> {
    id: usize,
    source: S,
    store: C,
    codec: EnvelopeCodec,
    dedup: DedupWindow,
    batcher: BatchAccumulator,
    retry: CommitRetryPolicy,
    flush_tick: Duration,
    shutdown: CancellationToken,
}

impl<S, C> PipelineWorker<S, C>
where
    S: EnvelopeSource,
    C: CandleStore,
{
    /// Build a worker owning its own dedup window and accumulator.
    #[must_use]
    pub fn new(
        id: usize,
        source: S,
        store: C,
        options: &PipelineOptions,
        shutdown: CancellationToken,
    ) -> Self {
        // Age-based flushes are checked on a timer a few times per
        // max_age so a quiet stream still flushes promptly.
        let flush_tick = (options.batch_max_age / 4)
            .clamp(Duration::from_millis(10), Duration::from_secs(1));

        Self {
            id,
            source,
            store,
            codec: EnvelopeCodec::new(),
            dedup: DedupWindow::new(options.dedup_window),
            batcher: BatchAccumulator::new(options.batch_max_size, options.batch_max_age),
            retry: options.retry.clone(),
            flush_tick,
            shutdown,
        }
    }

    /// Run until the source ends or shutdown is requested, draining the
    /// residual batch on the way out.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CommitExhausted`] when a batch cannot be
    /// committed within the configured attempt limit.
    pub async fn run(mut self) -> Result<(), PipelineError> {
        tracing::info!(worker = self.id, "pipeline worker started");

        let mut tick = tokio::time::interval(self.flush_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    tracing::info!(worker = self.id, buffered = self.batcher.len(), "shutdown requested, draining");
                    self.flush().await?;
                    break;
                }
                envelope = self.source.next() => {
                    match envelope {
                        Some(envelope) => {
                            self.process(&envelope);
                            if self.batcher.should_flush() {
                                self.flush().await?;
                            }
                        }
                        None => {
                            tracing::info!(worker = self.id, buffered = self.batcher.len(), "source ended, draining");
                            self.flush().await?;
                            break;
                        }
                    }
                }
                _ = tick.tick() => {
                    if self.batcher.should_flush() {
                        self.flush().await?;
                    }
                }
            }
        }

        tracing::info!(worker = self.id, "pipeline worker stopped");
        Ok(())
    }

    /// Decode, normalize, and admit one envelope. All stage-local
    /// failures are absorbed here and converted to counters.
    fn process(&mut self, envelope: &RawEnvelope) {
        let update = self.codec.decode(&envelope.payload);
        metrics::record_decoded();

        let record = match normalize(update) {
            Ok(record) => record,
            Err(reason) => {
                metrics::record_rejected(reason);
                tracing::debug!(
                    worker = self.id,
                    reason = reason.as_str(),
                    offset = envelope.offset,
                    "envelope rejected"
                );
                return;
            }
        };

        match self.dedup.admit(&record) {
            Admission::Duplicate => {
                metrics::record_duplicate();
                tracing::debug!(
                    worker = self.id,
                    symbol = %record.symbol,
                    time_ms = record.time_ms,
                    "duplicate candle dropped"
                );
            }
            Admission::Admitted => {
                metrics::record_admitted();
                self.batcher.offer(record);
            }
        }

        metrics::set_dedup_entries(self.id, self.dedup.len());
        metrics::set_batch_fill(self.id, self.batcher.len());
    }

    /// Drain the accumulator and persist the batch, retrying failed
    /// commits with bounded backoff.
    async fn flush(&mut self) -> Result<(), PipelineError> {
        let batch = self.batcher.drain();
        if batch.is_empty() {
            return Ok(());
        }

        metrics::record_flushed(batch.len() as u64);
        metrics::set_batch_fill(self.id, 0);
        let mut backoff = CommitBackoff::new(&self.retry);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let started = Instant::now();

            match self.store.write(&batch).await {
                Ok(report) => {
                    metrics::record_commit_duration(started.elapsed());
                    metrics::record_committed_rows(report.accepted);
                    metrics::record_failed_rows(report.failed);
                    tracing::info!(
                        worker = self.id,
                        accepted = report.accepted,
                        failed = report.failed,
                        "batch committed"
                    );
                    return Ok(());
                }
                Err(err) => {
                    metrics::record_failed_batch();
                    if attempt >= self.retry.max_attempts {
                        tracing::error!(
                            worker = self.id,
                            attempts = attempt,
                            rows = batch.len(),
                            error = %err,
                            "batch commit attempts exhausted"
                        );
                        return Err(PipelineError::CommitExhausted {
                            attempts: attempt,
                            source: err,
                        });
                    }

                    let delay = backoff.next_backoff();
                    metrics::record_commit_retry();
                    tracing::warn!(
                        worker = self.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "batch commit failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
