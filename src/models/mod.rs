// src/models/mod.rs

//! Domain models for the relay.
//!
//! Configuration structures and the values passed between pipeline tasks.

mod config;
mod stream;

// Re-export all public types
pub use config::{
    Config, KeywordStoreConfig, LoggingConfig, PipelineConfig, QueueConfig, StreamConfig,
};
pub use stream::{CycleStats, KeywordSet, MatchEvent, StreamItem};
