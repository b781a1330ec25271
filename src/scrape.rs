//! Article extraction from web pages.

use crate::config::ScrapeSettings;
use crate::error::{NewscastError, Result};
use crate::http::build_client;
use crate::text::{collapse_whitespace, truncate_chars};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{info, instrument, warn};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static OG_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[property="og:title"]"#));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static H1: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static AUTHOR: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[name="author"]"#));
static PUBLISHED: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"meta[property="article:published_time"]"#));
static ARTICLE: LazyLock<Selector> = LazyLock::new(|| selector("article"));
static MAIN: LazyLock<Selector> = LazyLock::new(|| selector("main"));
static BLOCKS: LazyLock<Selector> = LazyLock::new(|| selector("p, h2, h3, li, blockquote"));
static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| selector("p"));

/// Outcome of scraping one URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapeResult {
    pub original_url: String,
    pub final_url: String,
    pub title: String,
    pub authors: Vec<String>,
    pub published_date: Option<String>,
    pub full_text: String,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ScrapeResult {
    fn failed(url: &str, error: String) -> Self {
        Self {
            original_url: url.to_string(),
            final_url: url.to_string(),
            title: String::new(),
            authors: Vec::new(),
            published_date: None,
            full_text: String::new(),
            success: false,
            error: Some(error),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Fields pulled out of an HTML document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedArticle {
    pub title: String,
    pub authors: Vec<String>,
    pub published_date: Option<String>,
    pub text: String,
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .filter_map(|e| e.value().attr("content"))
        .map(collapse_whitespace)
        .find(|s| !s.is_empty())
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// True when `el` sits inside another text block below `container`.
fn inside_block(el: ElementRef<'_>, container: ElementRef<'_>) -> bool {
    el.ancestors()
        .take_while(|node| node.id() != container.id())
        .filter_map(ElementRef::wrap)
        .any(|ancestor| BLOCKS.matches(&ancestor))
}

fn container_text(container: ElementRef<'_>) -> String {
    let blocks: Vec<String> = container
        .select(&BLOCKS)
        .filter(|el| !inside_block(*el, container))
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    if blocks.is_empty() {
        element_text(container)
    } else {
        blocks.join("\n")
    }
}

/// Extract title, authors, date and body text from a page.
pub fn extract_article(html: &str, max_chars: usize) -> ExtractedArticle {
    let document = Html::parse_document(html);

    let title = meta_content(&document, &OG_TITLE)
        .or_else(|| {
            document
                .select(&TITLE)
                .map(element_text)
                .find(|t| !t.is_empty())
        })
        .or_else(|| document.select(&H1).map(element_text).find(|t| !t.is_empty()))
        .unwrap_or_default();

    let authors = document
        .select(&AUTHOR)
        .filter_map(|e| e.value().attr("content"))
        .flat_map(|s| s.split(','))
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
        .collect();

    let published_date = meta_content(&document, &PUBLISHED);

    let text = document
        .select(&ARTICLE)
        .next()
        .map(container_text)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            document
                .select(&MAIN)
                .next()
                .map(container_text)
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_else(|| {
            document
                .select(&PARAGRAPH)
                .map(element_text)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        });

    ExtractedArticle {
        title,
        authors,
        published_date,
        text: truncate_chars(&text, max_chars),
    }
}

/// Anything that can turn URLs into article text.
#[async_trait]
pub trait ArticleScraper: Send + Sync {
    /// One result per URL, in input order. Failures are reported per URL.
    async fn scrape_urls(&self, urls: &[String]) -> Vec<ScrapeResult>;
}

/// HTTP scraper with bounded concurrency.
pub struct Scraper {
    client: reqwest::Client,
    max_chars: usize,
    max_concurrent: usize,
}

impl Scraper {
    pub fn new(settings: &ScrapeSettings) -> Result<Self> {
        Ok(Self {
            client: build_client(
                Duration::from_secs(settings.timeout_seconds),
                &settings.user_agent,
            )?,
            max_chars: settings.max_chars,
            max_concurrent: settings.max_concurrent.max(1),
        })
    }

    #[instrument(skip(self))]
    async fn scrape_one(&self, url: &str) -> Result<ScrapeResult> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(NewscastError::Scrape(format!("{} returned {}", url, status)));
        }

        let body = response.text().await?;
        let article = extract_article(&body, self.max_chars);
        if article.text.is_empty() {
            return Err(NewscastError::Scrape(format!("No article text found at {}", url)));
        }

        Ok(ScrapeResult {
            original_url: url.to_string(),
            final_url,
            title: article.title,
            authors: article.authors,
            published_date: article.published_date,
            full_text: article.text,
            success: true,
            error: None,
            timestamp: Utc::now().to_rfc3339(),
        })
    }
}

#[async_trait]
impl ArticleScraper for Scraper {
    async fn scrape_urls(&self, urls: &[String]) -> Vec<ScrapeResult> {
        let futures: Vec<_> = urls
            .iter()
            .map(|url| async move {
                match self.scrape_one(url).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Failed to scrape {}: {}", url, e);
                        ScrapeResult::failed(url, e.to_string())
                    }
                }
            })
            .collect();
        let results: Vec<ScrapeResult> = stream::iter(futures)
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let ok = results.iter().filter(|r| r.success).count();
        info!("Scraped {}/{} URLs", ok, urls.len());
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <title>Fallback title</title>
        <meta property="og:title" content="Fusion reaches net gain">
        <meta name="author" content="Ada Lovelace, Alan Turing">
        <meta property="article:published_time" content="2024-03-01T08:00:00Z">
        <script>var ignored = 1;</script>
      </head><body>
        <nav><p>Home | About</p></nav>
        <article>
          <h1>Fusion reaches net gain</h1>
          <p>Scientists   announced a
             milestone.</p>
          <p>It could change energy.</p>
        </article>
      </body></html>"#;

    #[test]
    fn test_extract_prefers_article_and_og_title() {
        let article = extract_article(PAGE, 50_000);
        assert_eq!(article.title, "Fusion reaches net gain");
        assert_eq!(article.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(article.published_date.as_deref(), Some("2024-03-01T08:00:00Z"));
        assert_eq!(article.text, "Scientists announced a milestone.\nIt could change energy.");
    }

    #[test]
    fn test_extract_falls_back_to_paragraphs_and_h1() {
        let html = "<html><body><h1>Heading</h1><div><p>One.</p><p>Two.</p></div></body></html>";
        let article = extract_article(html, 50_000);
        assert_eq!(article.title, "Heading");
        assert!(article.authors.is_empty());
        assert_eq!(article.text, "One.\nTwo.");
    }

    #[test]
    fn test_extract_uses_main_before_paragraphs() {
        let html = "<html><head><title>T</title></head><body>\
                    <p>Cookie banner</p><main><p>Body text</p></main></body></html>";
        let article = extract_article(html, 50_000);
        assert_eq!(article.title, "T");
        assert_eq!(article.text, "Body text");
    }

    #[test]
    fn test_nested_blocks_are_read_once() {
        let html = "<article><ul><li><p>Alpha</p></li><li>Beta</li></ul>\
                    <blockquote><p>Quoted</p></blockquote><p>Tail</p></article>";
        assert_eq!(extract_article(html, 50_000).text, "Alpha\nBeta\nQuoted\nTail");
    }

    #[test]
    fn test_extract_truncates_on_char_boundary() {
        let html = "<article><p>ééééééééé</p></article>";
        assert_eq!(extract_article(html, 4).text, "éééé");
    }

    #[tokio::test]
    async fn test_invalid_urls_fail_individually() {
        let scraper = Scraper::new(&ScrapeSettings::default()).unwrap();
        let urls = vec!["not a url".to_string(), "also bad".to_string()];
        let results = scraper.scrape_urls(&urls).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.success && r.error.is_some()));
        assert_eq!(results[1].original_url, "also bad");
    }
}
