// crates/client/src/config.rs
//! Job service connection settings.

use std::time::Duration;

/// Default base URL of the playbook REST API.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default per-request HTTP timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for an [`HttpJobClient`](crate::HttpJobClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL, without the `/api` suffix.
    pub api_url: String,
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Read `PLAYBOOK_API_URL` and `PLAYBOOK_HTTP_TIMEOUT_SECS`, falling back to defaults.
    pub fn from_env() -> Self {
        let api_url = env_non_empty("PLAYBOOK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        let http_timeout = env_non_empty("PLAYBOOK_HTTP_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);

        Self {
            api_url,
            http_timeout,
        }
    }
}

/// Value of an environment variable, ignoring unset and blank values.
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
