//! Port Interfaces
//!
//! Contracts between the pipeline core and its external collaborators,
//! following the Hexagonal Architecture pattern.
//!
//! ## Driver Ports (Inbound)
//!
//! - [`EnvelopeSource`]: the at-least-once, ordered-per-partition stream
//!   of raw byte envelopes. The actual feed connector and bus transport
//!   live behind this trait.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`CandleStore`]: the durable append-only destination. Implemented
//!   by the PostgreSQL adapter in production and by an in-memory store
//!   in tests.

use async_trait::async_trait;

use crate::domain::candle::CandleRecord;

/// Opaque byte payload with source metadata, as delivered by the
/// transport. Ephemeral: owned by the decoder until consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEnvelope {
    /// Raw message bytes.
    pub payload: Vec<u8>,
    /// Transport partition key (the symbol, when the bus provides it).
    pub partition_key: Option<String>,
    /// Transport offset or sequence number, if available.
    pub offset: Option<u64>,
}

impl RawEnvelope {
    /// Envelope from bare bytes, without transport metadata.
    #[must_use]
    pub fn from_bytes(payload: Vec<u8>) -> Self {
        Self {
            payload,
            partition_key: None,
            offset: None,
        }
    }
}

/// Inbound stream of raw envelopes for one worker partition.
#[async_trait]
pub trait EnvelopeSource: Send {
    /// Receive the next envelope, or `None` when the stream has ended.
    async fn next(&mut self) -> Option<RawEnvelope>;
}

/// Per-batch write outcome: rows staged and committed vs rows that
/// failed individually while the batch went on to commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Rows successfully committed.
    pub accepted: u64,
    /// Rows that failed row-level persistence within a committed batch.
    pub failed: u64,
}

/// Errors from the durable store.
///
/// Row-level failures are *not* errors: they are absorbed into
/// [`WriteReport::failed`] and the batch commits without the offending
/// rows. An `Err` from [`CandleStore::write`] always means the whole
/// batch was rolled back and zero rows are visible.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Could not reach the store or open a transaction.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The batch commit failed; the transaction was rolled back.
    #[error("batch commit failed: {0}")]
    Commit(String),

    /// The commit did not complete within the configured timeout.
    #[error("batch commit timed out after {0:?}")]
    CommitTimeout(std::time::Duration),
}

/// Durable, append-only candle store.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Create the destination schema, table, and indexes if absent.
    ///
    /// Idempotent. Failures are logged and swallowed by implementations:
    /// a pre-existing schema from an earlier deployment is the common
    /// case, and if the table truly does not exist, subsequent writes
    /// fail visibly instead.
    async fn ensure_schema(&self);

    /// Persist a batch in one transaction.
    ///
    /// Per-row failures are tolerated (logged, counted in the report,
    /// batch continues); a commit failure rolls back the whole batch.
    /// An empty batch is a no-op: no transaction is opened.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction cannot be opened or
    /// the commit fails or times out. In every error case zero rows
    /// from the batch are visible to readers.
    async fn write(&self, batch: &[CandleRecord]) -> Result<WriteReport, StoreError>;
}
