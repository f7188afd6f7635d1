//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the port interfaces defined in the
//! application layer, plus process-level concerns (config, metrics,
//! telemetry, health).

/// Wire-format decoding of raw exchange envelopes.
pub mod codec;

/// Configuration loaded from environment variables.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// In-memory store for tests and development.
pub mod persistence;

/// PostgreSQL durable sink.
pub mod postgres;

/// In-process envelope sources and partition routing.
pub mod source;

/// Tracing initialization.
pub mod telemetry;
