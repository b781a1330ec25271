//! The podcast pipeline over a chat session.
//!
//! Every step reads the session, does its work and writes the result back
//! into [`SessionState`]. Steps return a short message for the coordinator
//! model; precondition failures are `InvalidInput` errors, which the tool layer
//! turns into text the model can react to.

mod chat;
mod tools;

pub use chat::{ChatOutcome, PodcastAgent};
pub use tools::PodcastTools;

use crate::error::{NewscastError, Result};
use crate::podcasts::{NewPodcast, PodcastStore};
use crate::scrape::ArticleScraper;
use crate::script::{format_sources_for_script, ScriptAuthor};
use crate::search::SourceSearch;
use crate::session::{Language, SessionState, SessionStore, Stage, UiToggle};
use crate::tts::{EpisodeRenderer, TtsEngine};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Result of a non-interactive podcast run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GeneratedPodcast {
    pub session_id: String,
    pub podcast_id: String,
    pub title: String,
    pub audio_path: PathBuf,
}

/// `podcast_<timestamp>_<random>.mp3`; unique even for renders in the same second.
fn episode_file_name(now: chrono::DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("podcast_{}_{}.mp3", now.format("%Y%m%d_%H%M%S"), &suffix[..12])
}

pub struct Studio {
    sessions: Arc<SessionStore>,
    podcasts: Arc<PodcastStore>,
    search: Arc<dyn SourceSearch>,
    scraper: Arc<dyn ArticleScraper>,
    author: Arc<dyn ScriptAuthor>,
    renderer: Arc<dyn EpisodeRenderer>,
    audio_dir: PathBuf,
}

impl Studio {
    pub fn new(
        sessions: Arc<SessionStore>,
        podcasts: Arc<PodcastStore>,
        search: Arc<dyn SourceSearch>,
        scraper: Arc<dyn ArticleScraper>,
        author: Arc<dyn ScriptAuthor>,
        renderer: Arc<dyn EpisodeRenderer>,
        audio_dir: PathBuf,
    ) -> Self {
        Self {
            sessions,
            podcasts,
            search,
            scraper,
            author,
            renderer,
            audio_dir,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Discover sources and replace the session's results.
    #[instrument(skip(self))]
    pub async fn search(&self, session_id: &str, query: &str) -> Result<String> {
        let query = query.trim();
        if query.is_empty() {
            return Err(NewscastError::InvalidInput("Search query is empty".to_string()));
        }
        self.sessions.get(session_id)?;

        let items = self.search.find_sources(query).await?;
        if items.is_empty() {
            return Err(NewscastError::Search(format!("No sources found for '{}'", query)));
        }

        let listing: Vec<String> = items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}. {} ({})", i + 1, item.title, item.url))
            .collect();
        let count = items.len();

        self.sessions.update(session_id, |state| {
            state.search_results = items;
            state.generated_script = None;
            state.audio_url = None;
            state.podcast_id = None;
            state.stage = Stage::Search;
            state.clear_toggles();
        })?;

        info!("Session {} has {} sources", session_id, count);
        Ok(format!("Found {} sources:\n{}", count, listing.join("\n")))
    }

    /// Confirm sources by 1-based index; an empty list confirms all.
    pub fn select_sources(&self, session_id: &str, selected: &[usize]) -> Result<String> {
        let (confirmed, total) = self.sessions.update(session_id, |state| {
            if state.search_results.is_empty() {
                return None;
            }
            Some((state.select_sources(selected), state.search_results.len()))
        })?
        .ok_or_else(|| {
            NewscastError::InvalidInput("No sources to select yet. Run a search first.".to_string())
        })?;

        if confirmed == 0 {
            return Err(NewscastError::InvalidInput(format!(
                "None of the selected numbers match the {} sources",
                total
            )));
        }
        Ok(format!("Confirmed {} of {} sources.", confirmed, total))
    }

    /// Fetch full text for every result that still needs it.
    #[instrument(skip(self))]
    pub async fn scrape(&self, session_id: &str) -> Result<String> {
        let state = self.sessions.get(session_id)?.state;
        if state.search_results.is_empty() {
            return Err(NewscastError::InvalidInput(
                "No sources to scrape. Run a search first.".to_string(),
            ));
        }

        let urls: Vec<String> = state
            .search_results
            .iter()
            .filter(|item| item.is_scraping_required)
            .map(|item| item.url.clone())
            .collect();

        if urls.is_empty() {
            self.sessions.update(session_id, |state| state.stage = Stage::Scrape)?;
            return Ok("All sources already have their full text.".to_string());
        }

        let results = self.scraper.scrape_urls(&urls).await;
        let succeeded = results.iter().filter(|r| r.success).count();

        self.sessions.update(session_id, |state| {
            for result in results.iter().filter(|r| r.success) {
                let Some(item) = state
                    .search_results
                    .iter_mut()
                    .find(|item| item.url == result.original_url)
                else {
                    continue;
                };
                item.full_text = Some(result.full_text.clone());
                item.is_scraping_required = false;
                if item.published_date.is_empty() {
                    if let Some(date) = &result.published_date {
                        item.published_date = date.clone();
                    }
                }
            }
            state.stage = Stage::Scrape;
        })?;

        if succeeded < urls.len() {
            warn!("Scraped {}/{} sources for {}", succeeded, urls.len(), session_id);
        }
        Ok(format!(
            "Scraped {} of {} sources. Sources without full text will use their descriptions.",
            succeeded,
            urls.len()
        ))
    }

    pub fn set_ui(&self, session_id: &str, state_type: &str, active: bool) -> Result<String> {
        let toggle = UiToggle::parse(state_type).ok_or_else(|| {
            let names: Vec<&str> = UiToggle::ALL.iter().map(|t| t.name()).collect();
            NewscastError::InvalidInput(format!(
                "Unknown UI state '{}'. Valid states: {}",
                state_type,
                names.join(", ")
            ))
        })?;
        self.sessions.update(session_id, |state| state.set_ui(toggle, active))
    }

    pub fn update_language(&self, session_id: &str, code: &str, name: &str) -> Result<String> {
        let language = if name.trim().is_empty() {
            Language::resolve(code)
        } else {
            Language::new(code, name)
        };
        if language.code.is_empty() {
            return Err(NewscastError::InvalidInput("Language code is empty".to_string()));
        }

        let message = format!("Language set to {} ({}).", language.name, language.code);
        self.sessions
            .update(session_id, |state| state.selected_language = language)?;
        Ok(message)
    }

    /// Write the script from the confirmed sources.
    #[instrument(skip(self))]
    pub async fn write_script(
        &self,
        session_id: &str,
        query: &str,
        language_name: Option<&str>,
    ) -> Result<String> {
        let state = self.sessions.get(session_id)?.state;
        let created_at = Utc::now().format("%B %d, %Y at %I:%M %p").to_string();
        let (content, sources) = format_sources_for_script(&state.search_results, &created_at)
            .ok_or_else(|| {
                NewscastError::InvalidInput(
                    "No confirmed sources. Confirm sources before writing the script.".to_string(),
                )
            })?;

        let language = language_name
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(&state.selected_language.name)
            .to_string();

        let mut script = self.author.write(query, &language, &content).await?;
        script.sources = sources;

        let turns = script.dialog_entries().len();
        let message = format!(
            "Script '{}' is ready: {} sections, {} dialog turns.",
            script.title,
            script.sections.len(),
            turns
        );

        self.sessions.update(session_id, |state| {
            if state.title.is_none() {
                state.title = Some(script.title.clone());
            }
            state.generated_script = Some(script);
            state.audio_url = None;
            state.stage = Stage::Script;
            state.clear_toggles();
        })?;
        Ok(message)
    }

    /// Render the session's script to audio and store the episode.
    pub async fn generate_audio(&self, session_id: &str) -> Result<String> {
        let (message, _) = self.render_episode(session_id, None).await?;
        Ok(message)
    }

    #[instrument(skip(self))]
    async fn render_episode(&self, session_id: &str, query: Option<&str>) -> Result<(String, String)> {
        let state: SessionState = self.sessions.get(session_id)?.state;
        let script = state
            .generated_script
            .clone()
            .filter(|s| s.has_dialog())
            .ok_or_else(|| {
                NewscastError::InvalidInput(
                    "No script with dialog yet. Write the script first.".to_string(),
                )
            })?;

        let entries = script.dialog_entries();
        if entries.is_empty() {
            return Err(NewscastError::InvalidInput(
                "The script has no speakable dialog".to_string(),
            ));
        }

        let output = self.audio_dir.join(episode_file_name(Utc::now()));
        let preferred = state.tts_engine.as_deref().and_then(TtsEngine::parse);
        let rendered = self
            .renderer
            .render(&entries, &output, preferred, &state.selected_language)
            .await?;

        let title = state.title.clone().unwrap_or_else(|| script.title.clone());
        let podcast = self.podcasts.insert(NewPodcast {
            title: title.clone(),
            query: query.map(str::to_string),
            session_id: Some(session_id.to_string()),
            language_code: state.selected_language.code.clone(),
            tts_engine: rendered.engine.to_string(),
            audio_path: rendered.path.clone(),
            duration_secs: rendered.duration_secs,
            script,
        })?;

        let audio_url = format!("/api/podcasts/{}/audio", podcast.id);
        self.sessions.update(session_id, |state| {
            state.audio_url = Some(audio_url.clone());
            state.podcast_id = Some(podcast.id.clone());
            state.tts_engine = Some(rendered.engine.to_string());
            state.stage = Stage::Audio;
            state.set_ui(UiToggle::AudioForConfirmation, true);
        })?;

        Ok((
            format!(
                "Audio for '{}' generated with {} ({} dialog turns). Listen at {}",
                title,
                rendered.engine,
                entries.len(),
                audio_url
            ),
            podcast.id,
        ))
    }

    pub fn update_title(&self, session_id: &str, title: &str) -> Result<String> {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(NewscastError::InvalidInput("Title is empty".to_string()));
        }
        let message = format!("Chat title set to '{}'.", title);
        self.sessions
            .update(session_id, |state| state.title = Some(title))?;
        Ok(message)
    }

    pub fn mark_finished(&self, session_id: &str) -> Result<String> {
        self.sessions.update(session_id, |state| {
            state.finished = true;
            state.stage = Stage::Finished;
            state.set_ui(UiToggle::RecordingPlayer, state.audio_url.is_some());
        })?;
        Ok("Session marked as finished.".to_string())
    }

    /// Record a failed step so the session shows it.
    pub fn mark_error(&self, session_id: &str) {
        if let Err(e) = self
            .sessions
            .update(session_id, |state| state.stage = Stage::Error)
        {
            warn!("Could not mark session {} as failed: {}", session_id, e);
        }
    }

    /// Run the whole pipeline without a conversation.
    #[instrument(skip(self))]
    pub async fn generate_podcast(
        &self,
        query: &str,
        language: Option<&str>,
    ) -> Result<GeneratedPodcast> {
        let session = self.sessions.create()?;
        let id = session.id.as_str();

        match self.run_pipeline(id, query, language).await {
            Ok(podcast_id) => {
                let podcast = self.podcasts.get(&podcast_id)?;
                Ok(GeneratedPodcast {
                    session_id: session.id.clone(),
                    podcast_id,
                    title: podcast.title,
                    audio_path: podcast.audio_path,
                })
            }
            Err(e) => {
                self.mark_error(id);
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, id: &str, query: &str, language: Option<&str>) -> Result<String> {
        if let Some(language) = language {
            self.update_language(id, language, "")?;
        }
        self.update_title(id, query)?;

        info!("{}", self.search(id, query).await?.lines().next().unwrap_or_default());
        self.select_sources(id, &[])?;
        info!("{}", self.scrape(id).await?);
        info!("{}", self.write_script(id, query, None).await?);

        let (message, podcast_id) = self.render_episode(id, Some(query)).await?;
        info!("{}", message);
        self.mark_finished(id)?;
        Ok(podcast_id)
    }
}
