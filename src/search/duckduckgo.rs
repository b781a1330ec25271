//! DuckDuckGo HTML search.

use super::{SearchItem, SearchProvider};
use crate::error::{NewscastError, Result};
use crate::text::collapse_whitespace;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, instrument};

const DUCKDUCKGO_HTML: &str = "https://html.duckduckgo.com/html/";

static RESULT: LazyLock<Selector> = LazyLock::new(|| selector("div.result"));
static RESULT_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a.result__a"));
static RESULT_SNIPPET: LazyLock<Selector> = LazyLock::new(|| selector(".result__snippet"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

pub struct DuckDuckGoSearch {
    client: reqwest::Client,
}

impl DuckDuckGoSearch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    fn description(&self) -> &str {
        "General web search. Backup when the primary search is short on results."
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchItem>> {
        let response = self
            .client
            .post(DUCKDUCKGO_HTML)
            .form(&[("q", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NewscastError::Search(format!(
                "duckduckgo returned {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let mut items = parse_results(&body);
        debug!("duckduckgo returned {} results", items.len());
        items.truncate(max_results);
        Ok(items)
    }
}

/// Extract results from a DuckDuckGo HTML results page.
pub fn parse_results(html: &str) -> Vec<SearchItem> {
    let document = Html::parse_document(html);
    let mut items = Vec::new();

    for result in document.select(&RESULT) {
        let Some(link) = result.select(&RESULT_LINK).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(url) = resolve_link(href) else {
            continue;
        };

        let title = collapse_whitespace(&link.text().collect::<String>());
        let snippet = result
            .select(&RESULT_SNIPPET)
            .next()
            .map(|s| collapse_whitespace(&s.text().collect::<String>()))
            .unwrap_or_default();

        items.push(SearchItem::new(&url, &title, &snippet, "duckduckgo"));
    }

    items
}

/// Unwrap DuckDuckGo redirect links (`//duckduckgo.com/l/?uddg=...`).
fn resolve_link(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };

    let parsed = url::Url::parse(&absolute).ok()?;
    if parsed.domain().is_some_and(|d| d.ends_with("duckduckgo.com")) {
        if parsed.path().starts_with("/y.js") {
            // sponsored result
            return None;
        }
        return parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }

    match parsed.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
<div class="result results_links">
  <h2><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&amp;rut=abc">Rust
     Programming Language</a></h2>
  <a class="result__snippet">A language empowering everyone.</a>
</div>
<div class="result">
  <a class="result__a" href="https://duckduckgo.com/y.js?ad_provider=x">Sponsored</a>
</div>
<div class="result">
  <a class="result__a" href="https://blog.rust-lang.org/">Rust Blog</a>
</div>
</body></html>"#;

    #[test]
    fn test_parse_results_unwraps_redirects() {
        let items = parse_results(PAGE);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "https://www.rust-lang.org/");
        assert_eq!(items[0].title, "Rust Programming Language");
        assert_eq!(items[0].description, "A language empowering everyone.");
        assert_eq!(items[1].url, "https://blog.rust-lang.org/");
        assert!(items[1].description.is_empty());
    }

    #[test]
    fn test_resolve_link_rejects_non_http() {
        assert_eq!(resolve_link("javascript:void(0)"), None);
    }
}
