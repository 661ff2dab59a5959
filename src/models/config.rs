//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};
use crate::services::queue::is_valid_topic;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Stream source and connection behavior
    #[serde(default)]
    pub stream: StreamConfig,

    /// Keyword store location
    #[serde(default)]
    pub keywords: KeywordStoreConfig,

    /// Message queue producer settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Channel sizing between poller and publisher
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Log filter settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.stream.user_agent.trim().is_empty() {
            return Err(AppError::validation("stream.user_agent is empty"));
        }
        Url::parse(&self.stream.url)
            .map_err(|e| AppError::validation(format!("stream.url is invalid: {e}")))?;
        if self.stream.dial_timeout_secs == 0 {
            return Err(AppError::validation("stream.dial_timeout_secs must be > 0"));
        }
        if self.stream.poll_interval_secs == 0 {
            return Err(AppError::validation("stream.poll_interval_secs must be > 0"));
        }
        if self.stream.reset_interval_secs == 0 {
            return Err(AppError::validation(
                "stream.reset_interval_secs must be > 0",
            ));
        }
        if self.keywords.path.as_os_str().is_empty() {
            return Err(AppError::validation("keywords.path is empty"));
        }
        if self.queue.address.trim().is_empty() {
            return Err(AppError::validation("queue.address is empty"));
        }
        if self.queue.publish_timeout_secs == 0 {
            return Err(AppError::validation("queue.publish_timeout_secs must be > 0"));
        }
        if !is_valid_topic(&self.queue.topic) {
            return Err(AppError::validation(format!(
                "queue.topic '{}' is not a valid topic name",
                self.queue.topic
            )));
        }
        if self.pipeline.channel_capacity == 0 {
            return Err(AppError::validation(
                "pipeline.channel_capacity must be > 0",
            ));
        }
        Ok(())
    }
}

/// Stream source and connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Filter endpoint of the stream source
    #[serde(default = "defaults::stream_url")]
    pub url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Timeout for establishing the connection
    #[serde(default = "defaults::dial_timeout")]
    pub dial_timeout_secs: u64,

    /// Sleep between poll cycles
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_secs: u64,

    /// Period of the forced connection reset
    #[serde(default = "defaults::reset_interval")]
    pub reset_interval_secs: u64,
}

impl StreamConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn reset_interval(&self) -> Duration {
        Duration::from_secs(self.reset_interval_secs)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: defaults::stream_url(),
            user_agent: defaults::user_agent(),
            dial_timeout_secs: defaults::dial_timeout(),
            poll_interval_secs: defaults::poll_interval(),
            reset_interval_secs: defaults::reset_interval(),
        }
    }
}

/// Keyword store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordStoreConfig {
    /// TOML file holding the polls and their options
    #[serde(default = "defaults::keywords_path")]
    pub path: PathBuf,
}

impl Default for KeywordStoreConfig {
    fn default() -> Self {
        Self {
            path: defaults::keywords_path(),
        }
    }
}

/// Message queue producer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// nsqd TCP address
    #[serde(default = "defaults::queue_address")]
    pub address: String,

    /// Topic every match is published to
    #[serde(default = "defaults::topic")]
    pub topic: String,

    /// Bound on connecting and on waiting for each publish acknowledgement
    #[serde(default = "defaults::publish_timeout")]
    pub publish_timeout_secs: u64,
}

impl QueueConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            address: defaults::queue_address(),
            topic: defaults::topic(),
            publish_timeout_secs: defaults::publish_timeout(),
        }
    }
}

/// Poller to publisher channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bound of the match-event channel. 1 behaves like a rendezvous.
    #[serde(default = "defaults::channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: defaults::channel_capacity(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Stream defaults
    pub fn stream_url() -> String {
        "https://stream.twitter.com/1.1/statuses/filter.json".into()
    }
    pub fn user_agent() -> String {
        "keyword-relay/0.1".into()
    }
    pub fn dial_timeout() -> u64 {
        5
    }
    pub fn poll_interval() -> u64 {
        10
    }
    pub fn reset_interval() -> u64 {
        60
    }

    // Keyword store defaults
    pub fn keywords_path() -> PathBuf {
        PathBuf::from("polls.toml")
    }

    // Queue defaults
    pub fn queue_address() -> String {
        "127.0.0.1:4150".into()
    }
    pub fn topic() -> String {
        "votes".into()
    }
    pub fn publish_timeout() -> u64 {
        5
    }

    pub fn channel_capacity() -> usize {
        1
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
