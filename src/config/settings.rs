//! Configuration settings for Newscast.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub llm: LlmSettings,
    pub search: SearchSettings,
    pub scrape: ScrapeSettings,
    pub tts: TtsSettings,
    pub storage: StorageSettings,
    pub queue: QueueSettings,
    pub scheduler: SchedulerSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data (database, audio, logs).
    pub data_dir: String,
    /// Directory for temporary files.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.newscast".to_string(),
            temp_dir: "/tmp/newscast".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl GeneralSettings {
    /// Tracing level: `-v` flags win over the configured `log_level`.
    pub fn log_level_for(&self, verbose: u8) -> &str {
        match verbose {
            0 => self.log_level.as_str(),
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Custom OpenAI-compatible API base (overrides OPENAI_API_BASE).
    pub api_base: Option<String>,
    /// Model driving the podcast chat coordinator.
    pub agent_model: String,
    /// Model used by the search agent.
    pub search_model: String,
    /// Model used to write podcast scripts.
    pub script_model: String,
    /// Model used by the HackerNews research assistant.
    pub research_model: String,
    /// Maximum LLM calls per agent run.
    pub max_iterations: usize,
    /// Number of previous chat messages replayed into the coordinator.
    pub history_messages: usize,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_base: None,
            agent_model: "gpt-4o-mini".to_string(),
            search_model: "gpt-4o-mini".to_string(),
            script_model: "gpt-4.1".to_string(),
            research_model: "gpt-4o-mini".to_string(),
            max_iterations: 15,
            history_messages: 30,
            timeout_seconds: 300,
        }
    }
}

/// Source discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Exact number of sources a search should produce.
    pub max_sources: usize,
    /// Results requested from each provider.
    pub results_per_provider: usize,
    /// Provider priority order for the deterministic fallback chain.
    pub providers: Vec<String>,
    /// Let an LLM pick tools before falling back to the fixed chain.
    pub use_agent: bool,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_sources: 5,
            results_per_provider: 10,
            providers: vec![
                "tavily_search".to_string(),
                "google_news_discovery".to_string(),
                "duckduckgo".to_string(),
                "wikipedia_search".to_string(),
                "hackernews_search".to_string(),
                "article_search".to_string(),
            ],
            use_agent: true,
            timeout_seconds: 30,
        }
    }
}

/// Article scraping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeSettings {
    /// Per-URL timeout in seconds.
    pub timeout_seconds: u64,
    /// Maximum characters of article text kept.
    pub max_chars: usize,
    /// Maximum concurrent fetches.
    pub max_concurrent: usize,
    /// User agent sent with requests.
    pub user_agent: String,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_chars: 50_000,
            max_concurrent: 5,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

/// Text-to-speech settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    /// Preferred engine (edge, elevenlabs, openai). None = automatic.
    pub engine: Option<String>,
    /// OpenAI speech model.
    pub openai_model: String,
    /// OpenAI voices for speaker 1 and 2.
    pub openai_voices: [String; 2],
    /// Edge voices for speaker 1 and 2.
    pub edge_voices: [String; 2],
    /// ElevenLabs voice IDs for speaker 1 and 2.
    pub elevenlabs_voices: [String; 2],
    /// ElevenLabs model.
    pub elevenlabs_model: String,
    /// Pause inserted between dialog turns.
    pub silence_ms: u64,
    /// Maximum concurrent segment synthesis calls.
    pub max_concurrent: usize,
    /// Optional intro music file.
    pub intro_music: Option<String>,
    /// Optional outro music file.
    pub outro_music: Option<String>,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            engine: None,
            openai_model: "gpt-4o-mini-tts".to_string(),
            openai_voices: ["alloy".to_string(), "nova".to_string()],
            edge_voices: ["en-US-GuyNeural".to_string(), "en-US-JennyNeural".to_string()],
            // Rachel, Adam
            elevenlabs_voices: [
                "21m00Tcm4TlvDq8ikWAM".to_string(),
                "pNInz6obpgDQGcFmaJgB".to_string(),
            ],
            elevenlabs_model: "eleven_multilingual_v2".to_string(),
            silence_ms: 500,
            max_concurrent: 8,
            intro_music: None,
            outro_music: None,
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path to the SQLite database holding sessions, jobs and podcasts.
    pub database_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "~/.newscast/newscast.db".to_string(),
        }
    }
}

/// Background job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Sleep between polls when the queue is empty.
    pub poll_interval_ms: u64,
    /// Session lock expiry in seconds.
    pub session_lock_seconds: u64,
    /// Delay before retrying a job whose session is locked.
    pub locked_retry_ms: u64,
    /// Retries for chat jobs.
    pub max_retries: u32,
    /// Running jobs older than this are considered abandoned.
    pub stale_after_seconds: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 500,
            session_lock_seconds: 600,
            locked_retry_ms: 2000,
            max_retries: 0,
            stale_after_seconds: 1800,
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Seconds between due-task polls.
    pub poll_seconds: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { poll_seconds: 60 }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    /// Save settings to a specific path.
    pub fn save_to(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::NewscastError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("newscast")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn database_path(&self) -> PathBuf {
        Self::expand_path(&self.storage.database_path)
    }

    /// Directory where finished episodes are written.
    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir().join("podcasts").join("audio")
    }

    /// Directory for worker log files.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}

/// Load `.env` from the current directory or the nearest parent that has one.
///
/// Existing environment variables are never overridden.
pub fn load_env() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => Some(path),
        Err(_) => None,
    }
}

/// Read a non-empty API key from the environment.
pub fn api_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|k| !k.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_config_or_flags() {
        let mut general = GeneralSettings::default();
        assert_eq!(general.log_level_for(0), "warn");
        general.log_level = "debug".to_string();
        assert_eq!(general.log_level_for(0), "debug");
        assert_eq!(general.log_level_for(1), "info");
        assert_eq!(general.log_level_for(5), "trace");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [search]
            max_sources = 3

            [tts]
            engine = "openai"
            "#,
        )
        .unwrap();

        assert_eq!(settings.search.max_sources, 3);
        assert_eq!(settings.search.providers[0], "tavily_search");
        assert_eq!(settings.tts.engine.as_deref(), Some("openai"));
        assert_eq!(settings.tts.silence_ms, 500);
        assert_eq!(settings.queue.max_retries, 0);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.server.port = 9100;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.server.port, 9100);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = PathBuf::from("/nonexistent/newscast/config.toml");
        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.scrape.max_chars, 50_000);
    }
}
