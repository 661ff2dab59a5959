// src/utils/http.rs

//! HTTP client utilities.

use crate::error::Result;
use crate::models::StreamConfig;

/// Create the client used for stream polling.
///
/// Idle connections are never pooled, so each poll cycle dials afresh and
/// a torn-down connection cannot be handed back out.
pub fn create_client(config: &StreamConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .connect_timeout(config.dial_timeout())
        .pool_max_idle_per_host(0)
        .build()?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_default_config() {
        assert!(create_client(&StreamConfig::default()).is_ok());
    }
}
