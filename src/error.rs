// src/error.rs

//! Unified error handling for the relay.

use std::fmt;

use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The stream connection could not be established
    #[error("Dial failed for {target}: {message}")]
    Dial { target: String, message: String },

    /// The stream source answered with a non-success status
    #[error("Stream source returned HTTP {status}")]
    Status { status: u16 },

    /// Keyword store could not be read
    #[error("Keyword store error for {source_name}: {message}")]
    KeywordStore {
        source_name: String,
        message: String,
    },

    /// Message queue failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// The publisher side of the match channel is gone
    #[error("Match channel closed")]
    ChannelClosed,

    /// A pipeline task panicked or was cancelled
    #[error("Task {task} failed: {message}")]
    Task { task: &'static str, message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a dial error for the given target.
    pub fn dial(target: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Dial {
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Create a keyword store error with context.
    pub fn keyword_store(source_name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::KeywordStore {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Create a queue error.
    pub fn queue(message: impl fmt::Display) -> Self {
        Self::Queue(message.to_string())
    }
}
