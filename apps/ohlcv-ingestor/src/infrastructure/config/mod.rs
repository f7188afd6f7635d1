//! Configuration
//!
//! Pipeline configuration loaded from environment variables.

mod settings;

pub use settings::{
    BatchSettings, CommitSettings, ConfigError, PipelineConfig, ServerSettings, SourceSettings,
};
