//! Tools for the research assistant: HackerNews, web search and an article reader.

use crate::agent::{function_tool, optional_u64, parse_arguments, required_str, ToolSet};
use crate::error::{NewscastError, Result};
use crate::scrape::ArticleScraper;
use crate::search::hackernews::{HackerNewsClient, HnStory, HnUser};
use crate::search::{format_results_for_agent, SearchProvider};
use crate::text::truncate_chars;
use async_openai::types::ChatCompletionTool;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const MAX_STORIES: usize = 30;
const ARTICLE_CHARS: usize = 6_000;

/// Where stories and users come from.
#[async_trait]
pub trait StorySource: Send + Sync {
    async fn top_stories(&self, limit: usize) -> Result<Vec<HnStory>>;
    async fn user(&self, username: &str) -> Result<HnUser>;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<HnStory>>;
}

#[async_trait]
impl StorySource for HackerNewsClient {
    async fn top_stories(&self, limit: usize) -> Result<Vec<HnStory>> {
        HackerNewsClient::top_stories(self, limit).await
    }

    async fn user(&self, username: &str) -> Result<HnUser> {
        HackerNewsClient::user(self, username).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<HnStory>> {
        HackerNewsClient::search(self, query, limit).await
    }
}

fn story_json(story: &HnStory) -> Value {
    json!({
        "id": story.id,
        "title": story.title,
        "url": story.link(),
        "score": story.score,
        "by": story.by,
        "comments": story.descendants,
        "published": story.published(),
    })
}

/// Accepts a single URL string or an array of them.
fn urls_argument(args: &Value) -> Result<Vec<String>> {
    let urls: Vec<String> = match (&args["urls"], &args["url"]) {
        (Value::Array(items), _) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        (Value::String(s), _) | (_, Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };
    let urls: Vec<String> = urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if urls.is_empty() {
        return Err(NewscastError::InvalidInput("No article URLs given".to_string()));
    }
    Ok(urls)
}

pub struct ResearchTools {
    stories: Arc<dyn StorySource>,
    web: Arc<dyn SearchProvider>,
    reader: Arc<dyn ArticleScraper>,
}

impl ResearchTools {
    pub fn new(
        stories: Arc<dyn StorySource>,
        web: Arc<dyn SearchProvider>,
        reader: Arc<dyn ArticleScraper>,
    ) -> Self {
        Self {
            stories,
            web,
            reader,
        }
    }

    async fn read_articles(&self, urls: &[String]) -> Result<String> {
        let results = self.reader.scrape_urls(urls).await;
        let blocks: Vec<String> = results
            .iter()
            .map(|r| {
                if r.success {
                    format!(
                        "URL: {}\nTitle: {}\n{}",
                        r.final_url,
                        r.title,
                        truncate_chars(&r.full_text, ARTICLE_CHARS)
                    )
                } else {
                    format!(
                        "URL: {}\nCould not read article: {}",
                        r.original_url,
                        r.error.as_deref().unwrap_or("unknown error")
                    )
                }
            })
            .collect();
        Ok(blocks.join("\n\n---\n\n"))
    }
}

#[async_trait]
impl ToolSet for ResearchTools {
    fn definitions(&self) -> Vec<ChatCompletionTool> {
        vec![
            function_tool(
                "get_top_hackernews_stories",
                "Get the current top stories on HackerNews.",
                json!({
                    "type": "object",
                    "properties": {"num_stories": {"type": "integer", "description": "How many stories (default 10)"}}
                }),
            ),
            function_tool(
                "search_hackernews",
                "Search HackerNews stories.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "num_stories": {"type": "integer"}
                    },
                    "required": ["query"]
                }),
            ),
            function_tool(
                "get_user_details",
                "Get a HackerNews user's profile.",
                json!({
                    "type": "object",
                    "properties": {"username": {"type": "string"}},
                    "required": ["username"]
                }),
            ),
            function_tool(
                "read_article",
                "Read the text of one or more articles.",
                json!({
                    "type": "object",
                    "properties": {
                        "urls": {"type": "array", "items": {"type": "string"}},
                        "url": {"type": "string"}
                    }
                }),
            ),
            function_tool(
                "web_search",
                "Search the web for more information about a story.",
                json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"]
                }),
            ),
        ]
    }

    async fn call(&self, name: &str, arguments: &str) -> Result<String> {
        let args = parse_arguments(arguments)?;
        let num = optional_u64(&args, "num_stories")
            .map(|n| n as usize)
            .unwrap_or(10)
            .clamp(1, MAX_STORIES);

        match name {
            "get_top_hackernews_stories" => {
                let stories = self.stories.top_stories(num).await?;
                let json: Vec<Value> = stories.iter().map(story_json).collect();
                Ok(serde_json::to_string_pretty(&json)?)
            }
            "search_hackernews" => {
                let query = required_str(&args, "query")?;
                let stories = self.stories.search(&query, num).await?;
                let json: Vec<Value> = stories.iter().map(story_json).collect();
                Ok(serde_json::to_string_pretty(&json)?)
            }
            "get_user_details" => {
                let username = required_str(&args, "username")?;
                let user = self.stories.user(&username).await?;
                Ok(serde_json::to_string_pretty(&json!({
                    "id": user.id,
                    "karma": user.karma,
                    "about": user.about,
                    "total_items_submitted": user.submitted.len(),
                }))?)
            }
            "read_article" => self.read_articles(&urls_argument(&args)?).await,
            "web_search" => {
                let query = required_str(&args, "query")?;
                let items = self.web.search(&query, 5).await?;
                format_results_for_agent(&items)
            }
            _ => Err(NewscastError::Agent(format!("Unknown tool: {}", name))),
        }
    }
}
