//! Shared HTTP client construction for search, scraping and feeds.

use crate::error::{NewscastError, Result};
use std::time::Duration;

/// Default browser-like user agent.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                                      (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Build a client with the given timeout and user agent.
pub fn build_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| NewscastError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Build a client with the default user agent.
pub fn default_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    build_client(Duration::from_secs(timeout_seconds), DEFAULT_USER_AGENT)
}
