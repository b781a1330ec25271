//! Source discovery and article extraction commands.

use crate::cli::{content_preview, Output};
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::scrape::ArticleScraper;
use crate::search::SourceSearch;
use anyhow::Result;

/// Find sources for a topic.
pub async fn run_search(query: &str, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner("Searching...");
    let results = orchestrator.search().find_sources(query).await;
    spinner.finish_and_clear();

    match results {
        Ok(items) if items.is_empty() => {
            Output::warning("No sources found for that topic.");
        }
        Ok(items) => {
            Output::success(&format!("Found {} sources", items.len()));
            println!();
            for (i, item) in items.iter().enumerate() {
                Output::source(i + 1, &item.title, &item.url, Some(&item.description));
                println!(
                    "     {}",
                    console::style(format!("{} via {}", item.source_name, item.tool_used)).dim()
                );
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}

/// Extract article text from URLs.
pub async fn run_scrape(urls: &[String], full: bool, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner(&format!("Reading {} URLs...", urls.len()));
    let results = orchestrator.scraper().scrape_urls(urls).await;
    spinner.finish_and_clear();

    let ok = results.iter().filter(|r| r.success).count();
    for result in &results {
        if result.success {
            Output::header(if result.title.is_empty() {
                &result.final_url
            } else {
                &result.title
            });
            Output::kv("URL", &result.final_url);
            if !result.authors.is_empty() {
                Output::kv("Authors", &result.authors.join(", "));
            }
            if let Some(date) = &result.published_date {
                Output::kv("Published", date);
            }
            Output::kv("Characters", &result.full_text.chars().count().to_string());
            println!();
            if full {
                println!("{}", result.full_text);
            } else {
                println!("{}", content_preview(&result.full_text, 600));
            }
        } else {
            Output::error(&format!(
                "{}: {}",
                result.original_url,
                result.error.as_deref().unwrap_or("failed")
            ));
        }
    }

    println!();
    if ok == 0 {
        anyhow::bail!("No URL could be read");
    }
    Output::success(&format!("Read {} of {} URLs", ok, urls.len()));
    Ok(())
}
