//! Application Layer - Pipeline services and port definitions.
//!
//! This layer wires the domain core to the outside world through port
//! interfaces and owns the per-worker processing loop.

/// Port interfaces for the inbound envelope stream and the durable store.
pub mod ports;

/// Pipeline services: batch accumulation, commit retries, worker loop.
pub mod services;
