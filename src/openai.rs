//! OpenAI client configuration with sensible defaults.
//!
//! Any OpenAI-compatible endpoint works: set `OPENAI_API_BASE` (or
//! `llm.api_base` in the config file) to point at another provider.

use crate::error::{NewscastError, Result};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Shared client type used by agents, the script writer and TTS.
pub type LlmClient = Client<OpenAIConfig>;

/// Create a client for an optional custom API base with a custom timeout.
pub fn create_client_with(api_base: Option<&str>, timeout: Duration) -> Result<LlmClient> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| NewscastError::Config(format!("Failed to create HTTP client: {}", e)))?;

    let mut config = OpenAIConfig::default();
    let base = api_base
        .map(str::to_string)
        .or_else(|| std::env::var("OPENAI_API_BASE").ok().filter(|b| !b.is_empty()));
    if let Some(base) = base {
        config = config.with_api_base(base);
    }

    Ok(Client::with_config(config).with_http_client(http_client))
}
