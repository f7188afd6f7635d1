#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! OHLCV Ingestor - Kline Stream Pipeline
//!
//! Ingests real-time exchange candlestick (kline) events, normalizes
//! them into a canonical record, suppresses duplicate deliveries from
//! the at-least-once transport by content fingerprint, and persists the
//! deduplicated stream to PostgreSQL in batched, partially
//! failure-tolerant transactions.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: pure pipeline core
//!   - `candle`: canonical OHLCV record and normalization
//!   - `fingerprint`: content digests and the time-windowed dedup set
//!
//! - **Application**: services and port definitions
//!   - `ports`: envelope source and durable store contracts
//!   - `services`: batch accumulator, commit retries, worker loop
//!
//! - **Infrastructure**: adapters and process concerns
//!   - `codec`: wire-format decoding of raw envelopes
//!   - `source`: in-process envelope channels and partition routing
//!   - `postgres`: the durable sink
//!   - `config`, `metrics`, `telemetry`, `health`
//!
//! # Data Flow
//!
//! ```text
//! raw envelope ──► Decoder ──► Normalizer ──► Deduplicator ──► Batch ──► PostgreSQL
//!                 (classify)   (validate)    (drop replays)   (size/age)  (txn per batch)
//! ```
//!
//! Exactly one logical row per (symbol, time bucket) reaches the store,
//! even when the upstream feed redelivers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - canonical candle types and deduplication logic.
pub mod domain;

/// Application layer - pipeline services and port definitions.
pub mod application;

/// Infrastructure layer - adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::candle::{CandleRecord, CandleUpdate, KlineFields, RejectReason, normalize};
pub use domain::fingerprint::{Admission, DedupWindow, Fingerprint};

// Ports
pub use application::ports::{CandleStore, EnvelopeSource, RawEnvelope, StoreError, WriteReport};

// Services
pub use application::services::pipeline::{PipelineError, PipelineOptions, PipelineWorker};
pub use application::services::{BatchAccumulator, CommitBackoff, CommitRetryPolicy};

// Infrastructure
pub use infrastructure::codec::EnvelopeCodec;
pub use infrastructure::config::{
    BatchSettings, CommitSettings, ConfigError, PipelineConfig, ServerSettings, SourceSettings,
};
pub use infrastructure::health::{HealthServer, HealthServerState};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::persistence::in_memory::InMemoryCandleStore;
pub use infrastructure::postgres::PostgresCandleStore;
pub use infrastructure::source::{
    ChannelEnvelopeSource, EnvelopeDispatcher, NdjsonEnvelopeSource, partition_for_symbol,
};
