//! Google News discovery through the public RSS search endpoint.

use super::{SearchItem, SearchProvider};
use crate::error::{NewscastError, Result};
use crate::feed::parse_feed;
use crate::text::{collapse_whitespace, strip_html};
use async_trait::async_trait;
use tracing::{debug, instrument};

const GOOGLE_NEWS_RSS: &str = "https://news.google.com/rss/search";

pub struct GoogleNewsSearch {
    client: reqwest::Client,
    language: String,
    country: String,
}

impl GoogleNewsSearch {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            language: "en".to_string(),
            country: "US".to_string(),
        }
    }

    fn search_url(&self, query: &str) -> Result<url::Url> {
        url::Url::parse_with_params(
            GOOGLE_NEWS_RSS,
            &[
                ("q", query.to_string()),
                ("hl", format!("{}-{}", self.language, self.country)),
                ("gl", self.country.clone()),
                ("ceid", format!("{}:{}", self.country, self.language)),
            ],
        )
        .map_err(|e| NewscastError::Search(format!("Invalid Google News URL: {}", e)))
    }
}

#[async_trait]
impl SearchProvider for GoogleNewsSearch {
    fn name(&self) -> &str {
        "google_news_discovery"
    }

    fn description(&self) -> &str {
        "Recent news articles from Google News. Prefer for news and current events."
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchItem>> {
        let url = self.search_url(query)?;
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(NewscastError::Search(format!(
                "google news returned {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let feed = parse_feed(&body)?;
        debug!("google news returned {} entries", feed.entries.len());

        Ok(feed
            .entries
            .into_iter()
            .filter(|e| !e.link.is_empty())
            .take(max_results)
            .map(|e| {
                let description = collapse_whitespace(&strip_html(&e.description));
                SearchItem::new(&e.link, &e.title, &description, "google_news_discovery")
                    .with_source_name(e.source.as_deref().unwrap_or("google_news"))
                    .with_published_date(e.published.as_deref().unwrap_or_default())
            })
            .collect())
    }
}
