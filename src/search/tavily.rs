//! Tavily web search.

use super::{SearchItem, SearchProvider};
use crate::error::{NewscastError, Result};
use crate::text::truncate_chars;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const TAVILY_URL: &str = "https://api.tavily.com/search";
const DESCRIPTION_CHARS: usize = 500;

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
    topic: &'a str,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    published_date: Option<String>,
}

/// Search provider backed by the Tavily API.
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
}

impl TavilySearch {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    fn name(&self) -> &str {
        "tavily_search"
    }

    fn description(&self) -> &str {
        "Primary web search. Use first for any topic."
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchItem>> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results,
            search_depth: "advanced",
            topic: "general",
        };

        let response = self.client.post(TAVILY_URL).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NewscastError::Search(format!(
                "tavily returned {}: {}",
                status,
                crate::text::preview(&body, 200)
            )));
        }

        let parsed: TavilyResponse = response.json().await?;
        debug!("tavily returned {} results", parsed.results.len());

        Ok(parsed
            .results
            .into_iter()
            .take(max_results)
            .map(|r| {
                let description = truncate_chars(&r.content, DESCRIPTION_CHARS);
                SearchItem::new(&r.url, &r.title, &description, "tavily_search")
                    .with_published_date(r.published_date.as_deref().unwrap_or_default())
            })
            .collect())
    }
}
