//! Source discovery for podcast episodes.
//!
//! Each backend implements [`SearchProvider`]. The [`SearchService`] first lets an
//! LLM agent pick providers as tools, then falls back to walking the providers in
//! priority order when the agent fails or returns nothing usable.

mod agent;
mod articles;
mod duckduckgo;
mod fallback;
mod google_news;
pub mod hackernews;
mod tavily;
mod wikipedia;

pub use agent::{SearchAgent, SearchTools};
pub use articles::ArticleSearch;
pub use duckduckgo::{parse_results as parse_duckduckgo_results, DuckDuckGoSearch};
pub use fallback::FallbackSearch;
pub use google_news::GoogleNewsSearch;
pub use hackernews::{HackerNewsClient, HackerNewsSearch};
pub use tavily::TavilySearch;
pub use wikipedia::WikipediaSearch;

use crate::config::{api_key, SearchSettings};
use crate::error::Result;
use crate::feed::ArticleStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// A discovered source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchItem {
    /// URL of the source.
    pub url: String,
    /// Title of the source.
    pub title: String,
    /// Short description or snippet.
    #[serde(default)]
    pub description: String,
    /// Name or type of the source (e.g. "wikipedia", "general", a publisher).
    #[serde(default = "default_source_name")]
    pub source_name: String,
    /// Tool that produced this item.
    #[serde(default = "default_tool_used")]
    pub tool_used: String,
    /// Publication date in ISO format, empty when unknown.
    #[serde(default)]
    pub published_date: String,
    /// Whether the full text still has to be fetched.
    #[serde(default = "default_true", alias = "is_scrapping_required")]
    pub is_scraping_required: bool,
    /// Whether the source was confirmed for the script.
    #[serde(default)]
    pub confirmed: bool,
    /// Scraped article text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
}

fn default_source_name() -> String {
    "general".to_string()
}

fn default_tool_used() -> String {
    "unknown".to_string()
}

fn default_true() -> bool {
    true
}

impl SearchItem {
    /// Create an item that still needs scraping.
    pub fn new(url: &str, title: &str, description: &str, tool_used: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            source_name: default_source_name(),
            tool_used: tool_used.to_string(),
            published_date: String::new(),
            is_scraping_required: true,
            confirmed: false,
            full_text: None,
        }
    }

    pub fn with_source_name(mut self, source_name: &str) -> Self {
        if !source_name.is_empty() {
            self.source_name = source_name.to_string();
        }
        self
    }

    pub fn with_published_date(mut self, published_date: &str) -> Self {
        self.published_date = published_date.to_string();
        self
    }

    /// Best available text for script writing.
    pub fn content(&self) -> &str {
        match &self.full_text {
            Some(text) if !text.trim().is_empty() => text,
            _ => &self.description,
        }
    }
}

/// A search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Tool name exposed to the agent (e.g. "tavily_search").
    fn name(&self) -> &str;

    /// One-line description shown to the agent.
    fn description(&self) -> &str;

    /// Search for up to `max_results` items.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchItem>>;
}

/// Anything that can turn a topic into a list of sources.
#[async_trait]
pub trait SourceSearch: Send + Sync {
    async fn find_sources(&self, query: &str) -> Result<Vec<SearchItem>>;
}

/// Build the configured providers in priority order.
///
/// Providers that need a missing API key are skipped.
pub fn build_providers(
    settings: &SearchSettings,
    articles: Arc<ArticleStore>,
) -> Result<Vec<Arc<dyn SearchProvider>>> {
    let client = crate::http::default_client(settings.timeout_seconds)?;
    let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();

    for name in &settings.providers {
        match name.as_str() {
            "tavily_search" => match api_key("TAVILY_API_KEY") {
                Some(key) => providers.push(Arc::new(TavilySearch::new(client.clone(), key))),
                None => info!("TAVILY_API_KEY not set, skipping tavily_search"),
            },
            "google_news_discovery" => {
                providers.push(Arc::new(GoogleNewsSearch::new(client.clone())))
            }
            "duckduckgo" => providers.push(Arc::new(DuckDuckGoSearch::new(client.clone()))),
            "wikipedia_search" => providers.push(Arc::new(WikipediaSearch::new(client.clone()))),
            "hackernews_search" => providers.push(Arc::new(HackerNewsSearch::new(
                HackerNewsClient::new(client.clone()),
            ))),
            "article_search" => providers.push(Arc::new(ArticleSearch::new(articles.clone()))),
            other => warn!("Unknown search provider '{}' in config, ignoring", other),
        }
    }

    Ok(providers)
}

/// Whether a query reads like a request for current news.
pub fn is_news_query(query: &str) -> bool {
    const MARKERS: &[&str] = &[
        "news", "latest", "today", "this week", "breaking", "headlines", "recent", "update",
    ];
    let lower = query.to_lowercase();
    MARKERS.iter().any(|m| lower.contains(m))
}

/// Order providers for a query: news queries try Google News first.
pub fn prioritize(
    providers: &[Arc<dyn SearchProvider>],
    query: &str,
) -> Vec<Arc<dyn SearchProvider>> {
    let mut ordered: Vec<Arc<dyn SearchProvider>> = providers.to_vec();
    if is_news_query(query) {
        if let Some(pos) = ordered.iter().position(|p| p.name() == "google_news_discovery") {
            let news = ordered.remove(pos);
            ordered.insert(0, news);
        }
    }
    ordered
}

/// Format provider output the way the agent sees it.
pub fn format_results_for_agent(items: &[SearchItem]) -> Result<String> {
    Ok(format!(
        "for all results is_scraping_required: true, results: {}",
        serde_json::to_string_pretty(items)?
    ))
}

/// Agent-first search with a deterministic fallback.
pub struct SearchService {
    agent: Option<SearchAgent>,
    fallback: FallbackSearch,
    max_sources: usize,
}

impl SearchService {
    pub fn new(agent: Option<SearchAgent>, fallback: FallbackSearch, max_sources: usize) -> Self {
        Self {
            agent,
            fallback,
            max_sources,
        }
    }
}

#[async_trait]
impl SourceSearch for SearchService {
    async fn find_sources(&self, query: &str) -> Result<Vec<SearchItem>> {
        if let Some(agent) = &self.agent {
            match agent.run(query).await {
                Ok(items) if !items.is_empty() => {
                    let mut items = dedupe_by_url(items);
                    if items.len() > self.max_sources {
                        warn!(
                            "Got {} sources, trimming to {} (hard cap)",
                            items.len(),
                            self.max_sources
                        );
                        items.truncate(self.max_sources);
                    } else if items.len() < self.max_sources {
                        warn!(
                            "Only {} sources from the search agent (expected {})",
                            items.len(),
                            self.max_sources
                        );
                    }
                    return Ok(items);
                }
                Ok(_) => warn!("Search agent returned no sources, using fallback chain"),
                Err(e) => warn!("Search agent failed ({}), using fallback chain", e),
            }
        }

        self.fallback.collect(query).await
    }
}

/// Drop items whose URL was already seen, keeping the first occurrence.
pub fn dedupe_by_url(items: Vec<SearchItem>) -> Vec<SearchItem> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| !item.url.is_empty() && seen.insert(normalize_url(&item.url)))
        .collect()
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}


#[cfg(test)]
mod tests {
    use super::test_support::StaticProvider;
    use super::*;

    #[test]
    fn test_search_item_accepts_legacy_field_name() {
        let item: SearchItem = serde_json::from_str(
            r#"{"url": "https://a.example", "title": "A", "is_scrapping_required": false}"#,
        )
        .unwrap();
        assert!(!item.is_scraping_required);
        assert_eq!(item.source_name, "general");
        assert_eq!(item.tool_used, "unknown");
    }

    #[test]
    fn test_content_prefers_full_text() {
        let mut item = SearchItem::new("https://a.example", "A", "snippet", "duckduckgo");
        assert_eq!(item.content(), "snippet");
        item.full_text = Some("full article".to_string());
        assert_eq!(item.content(), "full article");
    }

    #[test]
    fn test_news_queries_put_google_news_first() {
        let providers = vec![
            StaticProvider::ok("tavily_search", &[]),
            StaticProvider::ok("google_news_discovery", &[]),
            StaticProvider::ok("duckduckgo", &[]),
        ];

        let ordered = prioritize(&providers, "latest news on fusion energy");
        assert_eq!(ordered[0].name(), "google_news_discovery");
        assert_eq!(ordered[1].name(), "tavily_search");

        let ordered = prioritize(&providers, "history of the printing press");
        assert_eq!(ordered[0].name(), "tavily_search");
    }

    #[test]
    fn test_dedupe_by_url() {
        let items = vec![
            SearchItem::new("https://a.example/x/", "A", "", "t"),
            SearchItem::new("https://A.example/x", "A again", "", "t"),
            SearchItem::new("https://b.example", "B", "", "t"),
            SearchItem::new("", "No url", "", "t"),
        ];
        let deduped = dedupe_by_url(items);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "A");
    }

    #[tokio::test]
    async fn test_service_without_agent_uses_fallback() {
        let fallback = FallbackSearch::new(
            vec![StaticProvider::ok("duckduckgo", &["https://1", "https://2"])],
            5,
            10,
        );
        let service = SearchService::new(None, fallback, 5);
        let items = service.find_sources("rust").await.unwrap();
        assert_eq!(items.len(), 2);
    }
}
