//! Wikipedia full-text search via the MediaWiki API.

use super::{SearchItem, SearchProvider};
use crate::error::{NewscastError, Result};
use crate::text::strip_html;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

const WIKIPEDIA_API: &str = "https://en.wikipedia.org/w/api.php";

#[derive(Deserialize)]
struct ApiResponse {
    query: Option<QueryBlock>,
}

#[derive(Deserialize)]
struct QueryBlock {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    timestamp: Option<String>,
}

pub struct WikipediaSearch {
    client: reqwest::Client,
}

impl WikipediaSearch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Article URL for a page title.
pub fn article_url(title: &str) -> String {
    let slug = title.replace(' ', "_");
    let mut url = url::Url::parse("https://en.wikipedia.org/wiki/").expect("static url");
    url.path_segments_mut()
        .map(|mut segments| {
            segments.pop_if_empty().push(&slug);
        })
        .ok();
    url.to_string()
}

#[async_trait]
impl SearchProvider for WikipediaSearch {
    fn name(&self) -> &str {
        "wikipedia_search"
    }

    fn description(&self) -> &str {
        "Encyclopedic background on people, places, concepts and history."
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchItem>> {
        let limit = max_results.to_string();
        let response = self
            .client
            .get(WIKIPEDIA_API)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("format", "json"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NewscastError::Search(format!(
                "wikipedia returned {}",
                response.status()
            )));
        }

        let parsed: ApiResponse = response.json().await?;
        let hits = parsed.query.map(|q| q.search).unwrap_or_default();

        Ok(hits
            .into_iter()
            .take(max_results)
            .map(|hit| {
                SearchItem::new(
                    &article_url(&hit.title),
                    &hit.title,
                    &strip_html(&hit.snippet),
                    "wikipedia_search",
                )
                .with_source_name("wikipedia")
                .with_published_date(hit.timestamp.as_deref().unwrap_or_default())
            })
            .collect())
    }
}
