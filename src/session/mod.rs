//! Podcast chat sessions: state, persistence and the per-session advisory lock.

mod lock;
mod store;

pub use lock::SessionLocks;
pub use store::{ChatMessage, Session, SessionStore, SessionSummary};

use crate::script::PodcastScript;
use crate::search::SearchItem;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a session is in the podcast pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Welcome,
    Search,
    Scrape,
    Script,
    Audio,
    Finished,
    Error,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Welcome => "welcome",
            Stage::Search => "search",
            Stage::Scrape => "scrape",
            Stage::Script => "script",
            Stage::Audio => "audio",
            Stage::Finished => "finished",
            Stage::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub code: String,
    pub name: String,
}

impl Default for Language {
    fn default() -> Self {
        Self {
            code: "en".to_string(),
            name: "English".to_string(),
        }
    }
}

impl Language {
    const KNOWN: &'static [(&'static str, &'static str)] = &[
        ("en", "English"),
        ("es", "Spanish"),
        ("fr", "French"),
        ("de", "German"),
        ("it", "Italian"),
        ("pt", "Portuguese"),
        ("nl", "Dutch"),
        ("ru", "Russian"),
        ("ja", "Japanese"),
        ("ko", "Korean"),
        ("zh", "Chinese"),
        ("hi", "Hindi"),
        ("ar", "Arabic"),
    ];

    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.trim().to_lowercase(),
            name: name.trim().to_string(),
        }
    }

    /// Resolve a language code or English name ("es", "Spanish").
    pub fn resolve(input: &str) -> Self {
        let needle = input.trim();
        Self::KNOWN
            .iter()
            .find(|(code, name)| code.eq_ignore_ascii_case(needle) || name.eq_ignore_ascii_case(needle))
            .map(|(code, name)| Self::new(code, name))
            .unwrap_or_else(|| Self::new(needle, needle))
    }

    pub fn is_english(&self) -> bool {
        self.code == "en"
    }
}

/// Frontend panels; at most one is visible at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiToggle {
    SourcesForSelection,
    ScriptForConfirmation,
    AudioForConfirmation,
    RecordingPlayer,
}

impl UiToggle {
    pub const ALL: [UiToggle; 4] = [
        UiToggle::SourcesForSelection,
        UiToggle::ScriptForConfirmation,
        UiToggle::AudioForConfirmation,
        UiToggle::RecordingPlayer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            UiToggle::SourcesForSelection => "show_sources_for_selection",
            UiToggle::ScriptForConfirmation => "show_script_for_confirmation",
            UiToggle::AudioForConfirmation => "show_audio_for_confirmation",
            UiToggle::RecordingPlayer => "show_recording_player",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name.trim())
    }
}

/// Everything the coordinator knows about a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub stage: Stage,
    pub search_results: Vec<SearchItem>,
    pub generated_script: Option<PodcastScript>,
    pub audio_url: Option<String>,
    pub selected_language: Language,
    pub tts_engine: Option<String>,
    pub title: Option<String>,
    pub podcast_id: Option<String>,
    pub show_sources_for_selection: bool,
    pub show_script_for_confirmation: bool,
    pub show_audio_for_confirmation: bool,
    pub show_recording_player: bool,
    pub finished: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            stage: Stage::Welcome,
            search_results: Vec::new(),
            generated_script: None,
            audio_url: None,
            selected_language: Language::default(),
            tts_engine: None,
            title: None,
            podcast_id: None,
            show_sources_for_selection: false,
            show_script_for_confirmation: false,
            show_audio_for_confirmation: false,
            show_recording_player: false,
            finished: false,
        }
    }
}

impl SessionState {
    fn toggle_mut(&mut self, toggle: UiToggle) -> &mut bool {
        match toggle {
            UiToggle::SourcesForSelection => &mut self.show_sources_for_selection,
            UiToggle::ScriptForConfirmation => &mut self.show_script_for_confirmation,
            UiToggle::AudioForConfirmation => &mut self.show_audio_for_confirmation,
            UiToggle::RecordingPlayer => &mut self.show_recording_player,
        }
    }

    pub fn toggle(&self, toggle: UiToggle) -> bool {
        match toggle {
            UiToggle::SourcesForSelection => self.show_sources_for_selection,
            UiToggle::ScriptForConfirmation => self.show_script_for_confirmation,
            UiToggle::AudioForConfirmation => self.show_audio_for_confirmation,
            UiToggle::RecordingPlayer => self.show_recording_player,
        }
    }

    pub fn clear_toggles(&mut self) {
        for toggle in UiToggle::ALL {
            *self.toggle_mut(toggle) = false;
        }
    }

    /// Set one panel and clear every other one.
    ///
    /// Source selection is never shown: sources are auto-selected, so activating
    /// it leaves the state untouched and says so.
    pub fn set_ui(&mut self, toggle: UiToggle, active: bool) -> String {
        if toggle == UiToggle::SourcesForSelection && active {
            return "Source selection skipped - all sources auto-selected. Proceeding to script generation."
                .to_string();
        }

        self.clear_toggles();
        *self.toggle_mut(toggle) = active;
        format!(
            "Updated {} to {} and all other UI states to false.",
            toggle.name(),
            active
        )
    }

    /// Confirm sources by 1-based index; an empty selection confirms all.
    /// Returns the confirmed count.
    pub fn select_sources(&mut self, selected: &[usize]) -> usize {
        let select_all = selected.is_empty();
        for (i, item) in self.search_results.iter_mut().enumerate() {
            item.confirmed = select_all || selected.contains(&(i + 1));
        }
        self.confirmed_count()
    }

    pub fn confirmed_count(&self) -> usize {
        self.search_results.iter().filter(|s| s.confirmed).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_results(n: usize) -> SessionState {
        SessionState {
            search_results: (1..=n)
                .map(|i| SearchItem::new(&format!("https://{}", i), "t", "d", "x"))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_toggles_are_mutually_exclusive() {
        let mut state = SessionState::default();
        state.set_ui(UiToggle::ScriptForConfirmation, true);
        state.set_ui(UiToggle::AudioForConfirmation, true);
        assert!(state.show_audio_for_confirmation);
        assert!(!state.show_script_for_confirmation);

        state.set_ui(UiToggle::AudioForConfirmation, false);
        assert!(UiToggle::ALL.iter().all(|t| !state.toggle(*t)));
    }

    #[test]
    fn test_source_selection_toggle_refused() {
        let mut state = SessionState::default();
        state.set_ui(UiToggle::RecordingPlayer, true);
        let message = state.set_ui(UiToggle::SourcesForSelection, true);
        assert!(message.contains("auto-selected"));
        assert!(!state.show_sources_for_selection);
        assert!(state.show_recording_player);
    }

    #[test]
    fn test_select_sources_by_index() {
        let mut state = with_results(4);
        assert_eq!(state.select_sources(&[1, 3, 9]), 2);
        let confirmed: Vec<bool> = state.search_results.iter().map(|s| s.confirmed).collect();
        assert_eq!(confirmed, vec![true, false, true, false]);
    }

    #[test]
    fn test_empty_selection_confirms_all() {
        let mut state = with_results(3);
        state.select_sources(&[2]);
        assert_eq!(state.select_sources(&[]), 3);
    }

    #[test]
    fn test_state_json_defaults() {
        let state: SessionState = serde_json::from_str(r#"{"stage": "script"}"#).unwrap();
        assert_eq!(state.stage, Stage::Script);
        assert_eq!(state.selected_language, Language::default());
        assert!(state.search_results.is_empty());
    }

    #[test]
    fn test_language_resolve() {
        assert_eq!(Language::resolve("es"), Language::new("es", "Spanish"));
        assert_eq!(Language::resolve("german"), Language::new("de", "German"));
        assert_eq!(Language::resolve("sv").name, "sv");
        assert!(Language::default().is_english());
    }

    #[test]
    fn test_toggle_names_parse() {
        for toggle in UiToggle::ALL {
            assert_eq!(UiToggle::parse(toggle.name()), Some(toggle));
        }
        assert_eq!(UiToggle::parse("show_nothing"), None);
    }
}
