//! Component wiring for Newscast.
//!
//! Builds every store, agent and service from [`Settings`] and runs queued
//! jobs against them.

use crate::agent::Llm;
use crate::config::{api_key, Prompts, Settings};
use crate::cost::CostTracker;
use crate::db::Database;
use crate::error::{NewscastError, Result};
use crate::feed::{ArticleStore, FeedFetcher};
use crate::http::default_client;
use crate::openai::create_client_with;
use crate::podcasts::PodcastStore;
use crate::queue::{Job, JobHandler, JobKind, JobQueue};
use crate::research::{ResearchAssistant, ResearchTools};
use crate::scheduler::ScheduleStore;
use crate::scrape::Scraper;
use crate::script::ScriptWriter;
use crate::search::{
    build_providers, DuckDuckGoSearch, FallbackSearch, HackerNewsClient, SearchAgent,
    SearchProvider, SearchService,
};
use crate::session::{SessionLocks, SessionStore};
use crate::studio::{PodcastAgent, Studio};
use crate::tts::AudioProducer;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Outcome of a feed refresh.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FeedReport {
    pub feeds: usize,
    pub entries: usize,
    pub inserted: usize,
    pub errors: Vec<String>,
}

/// The assembled application.
pub struct Orchestrator {
    settings: Settings,
    db: Arc<Database>,
    sessions: Arc<SessionStore>,
    locks: Arc<SessionLocks>,
    podcasts: Arc<PodcastStore>,
    articles: Arc<ArticleStore>,
    costs: Arc<CostTracker>,
    queue: Arc<JobQueue>,
    schedules: Arc<ScheduleStore>,
    providers: Vec<Arc<dyn SearchProvider>>,
    search: Arc<SearchService>,
    scraper: Arc<Scraper>,
    feeds: FeedFetcher,
    studio: Arc<Studio>,
    agent: Arc<PodcastAgent>,
    research: Arc<ResearchAssistant>,
}

impl Orchestrator {
    /// Open the database and build every component.
    pub fn new(settings: Settings) -> Result<Self> {
        let db = Arc::new(Database::open(&settings.database_path())?);
        Self::with_database(settings, db)
    }

    /// Build every component over an already opened database.
    pub fn with_database(settings: Settings, db: Arc<Database>) -> Result<Self> {
        let prompts = Prompts::load(settings.prompts.custom_dir.as_deref())?;

        let sessions = Arc::new(SessionStore::new(db.clone()));
        let locks = Arc::new(SessionLocks::new(db.clone()));
        let podcasts = Arc::new(PodcastStore::new(db.clone()));
        let articles = Arc::new(ArticleStore::new(db.clone()));
        let costs = Arc::new(CostTracker::new(db.clone()));
        let queue = Arc::new(JobQueue::new(db.clone()));
        let schedules = Arc::new(ScheduleStore::new(db.clone()));

        let client = create_client_with(
            settings.llm.api_base.as_deref(),
            Duration::from_secs(settings.llm.timeout_seconds),
        )?;
        let llm = Llm::new(client.clone(), Some(costs.clone()));
        let has_llm_key = api_key("OPENAI_API_KEY").is_some();

        let providers = build_providers(&settings.search, articles.clone())?;
        let search_agent = (settings.search.use_agent && has_llm_key).then(|| {
            SearchAgent::new(
                llm.clone(),
                &settings.llm.search_model,
                &prompts.search.system,
                providers.clone(),
                settings.search.max_sources,
                settings.search.results_per_provider,
            )
            .with_max_iterations(settings.llm.max_iterations)
        });
        if search_agent.is_none() {
            info!("Search agent disabled, using the provider chain only");
        }
        let search = Arc::new(SearchService::new(
            search_agent,
            FallbackSearch::new(
                providers.clone(),
                settings.search.max_sources,
                settings.search.results_per_provider,
            ),
            settings.search.max_sources,
        ));

        let scraper = Arc::new(Scraper::new(&settings.scrape)?);
        let http = default_client(settings.search.timeout_seconds)?;
        let author = Arc::new(ScriptWriter::new(
            llm.clone(),
            &settings.llm.script_model,
            prompts.script.clone(),
        ));
        let renderer = Arc::new(AudioProducer::new(
            &settings,
            http.clone(),
            has_llm_key.then(|| client.clone()),
        ));

        let studio = Arc::new(Studio::new(
            sessions.clone(),
            podcasts.clone(),
            search.clone(),
            scraper.clone(),
            author,
            renderer,
            settings.audio_dir(),
        ));

        let agent = Arc::new(
            PodcastAgent::new(
                studio.clone(),
                llm.clone(),
                &settings.llm.agent_model,
                &prompts.coordinator.system,
            )
            .with_history_messages(settings.llm.history_messages)
            .with_max_iterations(settings.llm.max_iterations),
        );

        let research_tools = Arc::new(ResearchTools::new(
            Arc::new(HackerNewsClient::new(http.clone())),
            Arc::new(DuckDuckGoSearch::new(http.clone())),
            scraper.clone(),
        ));
        let research = Arc::new(
            ResearchAssistant::new(
                llm,
                &settings.llm.research_model,
                &prompts.research.system,
                research_tools,
            )
            .with_max_iterations(settings.llm.max_iterations),
        );

        Ok(Self {
            settings,
            db,
            sessions,
            locks,
            podcasts,
            articles,
            costs,
            queue,
            schedules,
            providers,
            search,
            scraper,
            feeds: FeedFetcher::new(http),
            studio,
            agent,
            research,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn locks(&self) -> &Arc<SessionLocks> {
        &self.locks
    }

    pub fn podcasts(&self) -> &Arc<PodcastStore> {
        &self.podcasts
    }

    pub fn articles(&self) -> &Arc<ArticleStore> {
        &self.articles
    }

    pub fn costs(&self) -> &Arc<CostTracker> {
        &self.costs
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn schedules(&self) -> &Arc<ScheduleStore> {
        &self.schedules
    }

    pub fn providers(&self) -> &[Arc<dyn SearchProvider>] {
        &self.providers
    }

    pub fn search(&self) -> &Arc<SearchService> {
        &self.search
    }

    pub fn scraper(&self) -> &Arc<Scraper> {
        &self.scraper
    }

    pub fn studio(&self) -> &Arc<Studio> {
        &self.studio
    }

    pub fn agent(&self) -> &Arc<PodcastAgent> {
        &self.agent
    }

    pub fn research(&self) -> &Arc<ResearchAssistant> {
        &self.research
    }

    /// Fetch feeds and archive their entries. Failing feeds are reported, not fatal.
    #[instrument(skip(self))]
    pub async fn fetch_feeds(&self, urls: &[String]) -> Result<FeedReport> {
        let mut report = FeedReport::default();

        for url in urls {
            match self.feeds.fetch(url).await {
                Ok(feed) => {
                    let inserted = self.articles.insert_entries(Some(url), &feed.entries)?;
                    info!(
                        "{}: {} entries, {} new",
                        url,
                        feed.entries.len(),
                        inserted
                    );
                    report.feeds += 1;
                    report.entries += feed.entries.len();
                    report.inserted += inserted;
                }
                Err(e) => {
                    warn!("Failed to fetch feed {}: {}", url, e);
                    report.errors.push(format!("{}: {}", url, e));
                }
            }
        }

        if report.feeds == 0 && !report.errors.is_empty() {
            return Err(NewscastError::Feed(report.errors.join("; ")));
        }
        Ok(report)
    }
}

#[async_trait]
impl JobHandler for Orchestrator {
    async fn handle(&self, job: &Job) -> Result<serde_json::Value> {
        match &job.kind {
            JobKind::AgentChat {
                session_id,
                message,
            } => {
                let outcome = self.agent.chat(session_id, message).await;
                Ok(serde_json::to_value(outcome)?)
            }
            JobKind::GeneratePodcast { query, language } => {
                let generated = self
                    .studio
                    .generate_podcast(query, language.as_deref())
                    .await?;
                Ok(serde_json::to_value(generated)?)
            }
            JobKind::FetchFeeds { urls } => {
                let report = self.fetch_feeds(urls).await?;
                Ok(serde_json::to_value(report)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orchestrator() -> Orchestrator {
        let mut settings = Settings::default();
        settings.search.use_agent = false;
        let dir = std::env::temp_dir().join("newscast-orchestrator-test");
        settings.general.data_dir = dir.to_string_lossy().into_owned();
        Orchestrator::with_database(settings, Arc::new(Database::open_in_memory().unwrap()))
            .unwrap()
    }

    #[test]
    fn test_builds_configured_providers() {
        let orchestrator = orchestrator();
        let names: Vec<&str> = orchestrator.providers().iter().map(|p| p.name()).collect();
        assert!(names.contains(&"duckduckgo"));
        assert!(names.contains(&"article_search"));
    }

    #[tokio::test]
    async fn test_fetch_feeds_with_no_urls() {
        let report = orchestrator().fetch_feeds(&[]).await.unwrap();
        assert_eq!(report, FeedReport::default());
    }

    #[tokio::test]
    async fn test_chat_job_for_unknown_session_completes_with_apology() {
        let orchestrator = orchestrator();
        let id = orchestrator
            .queue()
            .enqueue(
                &JobKind::AgentChat {
                    session_id: "missing".to_string(),
                    message: "hi".to_string(),
                },
                0,
            )
            .unwrap();
        let job = orchestrator.queue().claim("w").unwrap().unwrap();
        assert_eq!(job.id, id);

        let value = orchestrator.handle(&job).await.unwrap();
        assert_eq!(value["stage"], "error");
    }
}
