//! Pipeline Services
//!
//! The stateful pieces between the pure domain core and the ports:
//! batch accumulation, commit retry policy, and the worker loop that
//! drives decode → normalize → admit → batch → flush.

pub mod batcher;
pub mod pipeline;
pub mod retry;

pub use batcher::BatchAccumulator;
pub use pipeline::{PipelineError, PipelineWorker};
pub use retry::{CommitBackoff, CommitRetryPolicy};
