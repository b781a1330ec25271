//! HackerNews access: Firebase API for live data, Algolia for search.

use super::{SearchItem, SearchProvider};
use crate::error::{NewscastError, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

const FIREBASE_BASE: &str = "https://hacker-news.firebaseio.com/v0";
const ALGOLIA_SEARCH: &str = "https://hn.algolia.com/api/v1/search";
const ITEM_PAGE: &str = "https://news.ycombinator.com/item?id=";

/// A HackerNews story.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HnStory {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub by: String,
    /// Unix seconds.
    #[serde(default)]
    pub time: i64,
    /// Comment count.
    #[serde(default)]
    pub descendants: i64,
    /// Self-post text (HTML).
    #[serde(default)]
    pub text: Option<String>,
}

impl HnStory {
    /// Linked URL, or the discussion page for self posts.
    pub fn link(&self) -> String {
        match &self.url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("{}{}", ITEM_PAGE, self.id),
        }
    }

    pub fn published(&self) -> String {
        Utc.timestamp_opt(self.time, 0)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_default()
    }
}

/// A HackerNews user profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HnUser {
    pub id: String,
    #[serde(default)]
    pub karma: i64,
    /// Unix seconds.
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub submitted: Vec<u64>,
}

#[derive(Deserialize)]
struct AlgoliaResponse {
    #[serde(default)]
    hits: Vec<AlgoliaHit>,
}

#[derive(Deserialize)]
struct AlgoliaHit {
    #[serde(rename = "objectID")]
    object_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    points: Option<i64>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    created_at_i: Option<i64>,
    #[serde(default)]
    num_comments: Option<i64>,
    #[serde(default)]
    story_text: Option<String>,
}

impl From<AlgoliaHit> for HnStory {
    fn from(hit: AlgoliaHit) -> Self {
        Self {
            id: hit.object_id.parse().unwrap_or_default(),
            title: hit.title.unwrap_or_default(),
            url: hit.url,
            score: hit.points.unwrap_or_default(),
            by: hit.author.unwrap_or_default(),
            time: hit.created_at_i.unwrap_or_default(),
            descendants: hit.num_comments.unwrap_or_default(),
            text: hit.story_text,
        }
    }
}

/// Thin HackerNews API client.
#[derive(Clone)]
pub struct HackerNewsClient {
    client: reqwest::Client,
}

impl HackerNewsClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Current top stories, fetched concurrently and returned in rank order.
    #[instrument(skip(self))]
    pub async fn top_stories(&self, limit: usize) -> Result<Vec<HnStory>> {
        let ids: Vec<u64> = self
            .client
            .get(format!("{}/topstories.json", FIREBASE_BASE))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let stories: Vec<Option<HnStory>> = stream::iter(ids.into_iter().take(limit))
            .map(|id| async move {
                match self.item(id).await {
                    Ok(story) => story,
                    Err(e) => {
                        warn!("Failed to fetch HN item {}: {}", id, e);
                        None
                    }
                }
            })
            .buffered(8)
            .collect()
            .await;

        Ok(stories.into_iter().flatten().collect())
    }

    /// A single item; `None` for deleted items.
    pub async fn item(&self, id: u64) -> Result<Option<HnStory>> {
        let story: Option<HnStory> = self
            .client
            .get(format!("{}/item/{}.json", FIREBASE_BASE, id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(story)
    }

    /// Profile of a user.
    #[instrument(skip(self))]
    pub async fn user(&self, username: &str) -> Result<HnUser> {
        let user: Option<HnUser> = self
            .client
            .get(user_url(username))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        user.ok_or_else(|| NewscastError::NotFound(format!("HackerNews user '{}'", username)))
    }

    /// Full-text story search.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<HnStory>> {
        let hits = limit.to_string();
        let response: AlgoliaResponse = self
            .client
            .get(ALGOLIA_SEARCH)
            .query(&[("query", query), ("tags", "story"), ("hitsPerPage", hits.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("algolia returned {} hits", response.hits.len());
        Ok(response.hits.into_iter().map(HnStory::from).collect())
    }
}

/// Search provider over HackerNews stories.
pub struct HackerNewsSearch {
    client: HackerNewsClient,
}

impl HackerNewsSearch {
    pub fn new(client: HackerNewsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchProvider for HackerNewsSearch {
    fn name(&self) -> &str {
        "hackernews_search"
    }

    fn description(&self) -> &str {
        "Technology and startup stories discussed on HackerNews."
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchItem>> {
        let stories = self.client.search(query, max_results).await?;
        Ok(stories.iter().map(story_to_item).collect())
    }
}

fn story_to_item(story: &HnStory) -> SearchItem {
    let description = format!(
        "{} points by {} with {} comments",
        story.score, story.by, story.descendants
    );
    SearchItem::new(&story.link(), &story.title, &description, "hackernews_search")
        .with_source_name("hackernews")
        .with_published_date(&story.published())
}

/// Firebase URL for a user profile; the name is one encoded path segment.
fn user_url(username: &str) -> String {
    let mut url = url::Url::parse(FIREBASE_BASE).expect("static url");
    url.path_segments_mut()
        .map(|mut segments| {
            segments.push("user").push(&format!("{}.json", username));
        })
        .ok();
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_url_encodes_name() {
        assert_eq!(
            user_url("pg"),
            "https://hacker-news.firebaseio.com/v0/user/pg.json"
        );
        assert_eq!(
            user_url("../item/1?x=1"),
            "https://hacker-news.firebaseio.com/v0/user/..%2Fitem%2F1%3Fx=1.json"
        );
    }

    #[test]
    fn test_self_post_links_to_discussion() {
        let story = HnStory {
            id: 42,
            title: "Ask HN: Rust in production?".to_string(),
            url: None,
            score: 10,
            by: "pg".to_string(),
            time: 0,
            descendants: 3,
            text: Some("Curious".to_string()),
        };
        assert_eq!(story.link(), "https://news.ycombinator.com/item?id=42");

        let item = story_to_item(&story);
        assert_eq!(item.source_name, "hackernews");
        assert_eq!(item.description, "10 points by pg with 3 comments");
        assert!(item.published_date.starts_with("1970-01-01"));
    }

    #[test]
    fn test_algolia_hit_conversion() {
        let hit: AlgoliaHit = serde_json::from_str(
            r#"{"objectID": "123", "title": "Show HN", "url": "https://x.dev", "points": 5,
                "author": "a", "created_at_i": 1700000000, "num_comments": null}"#,
        )
        .unwrap();
        let story = HnStory::from(hit);
        assert_eq!(story.id, 123);
        assert_eq!(story.link(), "https://x.dev");
        assert_eq!(story.descendants, 0);
    }
}
