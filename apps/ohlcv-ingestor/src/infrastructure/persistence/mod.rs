//! Test/Development Persistence Adapters

/// In-memory candle store with failure injection.
pub mod in_memory;
