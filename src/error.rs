//! Error types for Newscast.

use thiserror::Error;

/// Library-level error type for Newscast operations.
#[derive(Error, Debug)]
pub enum NewscastError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Scraping failed: {0}")]
    Scrape(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Script generation failed: {0}")]
    Script(String),

    #[error("Speech synthesis failed: {0}")]
    Tts(String),

    #[error("Audio assembly failed: {0}")]
    Audio(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database schema version {db_version} is newer than supported version {latest_supported}")]
    UnsupportedSchema { db_version: u32, latest_supported: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Agent error: {0}")]
    Agent(String),
}

/// Result type alias for Newscast operations.
pub type Result<T> = std::result::Result<T, NewscastError>;
