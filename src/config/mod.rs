//! Configuration module for Newscast.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{CoordinatorPrompts, Prompts, ResearchPrompts, ScriptPrompts, SearchPrompts};
pub use settings::{
    api_key, load_env, GeneralSettings, LlmSettings, PromptSettings, QueueSettings,
    SchedulerSettings, ScrapeSettings, SearchSettings, ServerSettings, Settings,
    StorageSettings, TtsSettings,
};
