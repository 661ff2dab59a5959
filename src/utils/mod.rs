//! Utility functions and helpers.

pub mod http;

use url::Url;

/// `host:port` of a URL, for log and error context.
pub fn dial_target(url: &Url) -> String {
    match (url.host_str(), url.port_or_known_default()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => url.to_string(),
    }
}
