//! Newscast - agent-driven news podcasts
//!
//! Turns a topic into a short two-host podcast: an LLM producer discovers
//! sources, reads them, writes a dialog script and records it with a
//! text-to-speech engine. A HackerNews research assistant rides along.
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `db` - SQLite bootstrap and migrations
//! - `agent` - Tool-calling loop over an OpenAI-compatible API
//! - `search` - Source discovery providers, fallback chain and search agent
//! - `scrape` - Article extraction
//! - `feed` - RSS/Atom parsing and the article archive
//! - `script` - Podcast script generation
//! - `tts` / `audio` - Speech synthesis and episode assembly
//! - `session` / `studio` - Chat sessions and the podcast producer
//! - `research` - HackerNews research assistant
//! - `queue` / `scheduler` - Background jobs, workers and periodic tasks
//! - `server` - REST API
//! - `orchestrator` - Wiring
//!
//! # Example
//!
//! ```rust,no_run
//! use newscast::config::Settings;
//! use newscast::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let podcast = orchestrator
//!         .studio()
//!         .generate_podcast("fusion energy breakthroughs", None)
//!         .await?;
//!     println!("Recorded {}", podcast.audio_path.display());
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod audio;
pub mod cli;
pub mod config;
pub mod cost;
pub mod db;
pub mod error;
pub mod feed;
pub mod http;
pub mod openai;
pub mod orchestrator;
pub mod podcasts;
pub mod queue;
pub mod research;
pub mod scheduler;
pub mod scrape;
pub mod script;
pub mod search;
pub mod server;
pub mod session;
pub mod studio;
pub mod text;
pub mod tts;

pub use error::{NewscastError, Result};
