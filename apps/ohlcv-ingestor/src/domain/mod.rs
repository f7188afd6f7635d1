//! Domain Layer - Canonical candle types and deduplication logic.
//!
//! This layer contains the pure core of the pipeline: the canonical
//! candle record, normalization rules, and content-fingerprint
//! deduplication. No I/O happens here.

/// Canonical candle record, decoded update variants, normalization.
pub mod candle;

/// Content fingerprints and the time-windowed membership set.
pub mod fingerprint;
