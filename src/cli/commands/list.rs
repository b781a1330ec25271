//! Listing commands: podcasts, articles and costs.

use crate::cli::{content_preview, format_cost, Output};
use crate::config::Settings;
use crate::cost::CostFilter;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// List generated podcasts.
pub fn run_list(limit: usize, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let podcasts = orchestrator.podcasts().list(limit, 0)?;

    if podcasts.is_empty() {
        Output::info("No podcasts yet. Use 'newscast podcast <topic>' or 'newscast chat'.");
        return Ok(());
    }

    let total = orchestrator.podcasts().count()?;
    Output::header(&format!("Podcasts ({})", total));
    println!();
    for podcast in &podcasts {
        Output::podcast(
            &podcast.title,
            &podcast.id,
            &podcast.tts_engine,
            &podcast.created_at.format("%Y-%m-%d %H:%M").to_string(),
        );
        println!(
            "     {}",
            console::style(podcast.audio_path.display()).dim()
        );
    }
    if total > podcasts.len() {
        println!();
        Output::info(&format!(
            "Showing {} of {}. Use --limit to see more.",
            podcasts.len(),
            total
        ));
    }
    Ok(())
}

/// Refresh feeds, then list or search archived articles.
pub async fn run_articles(
    fetch: &[String],
    search: Option<&str>,
    limit: usize,
    settings: Settings,
) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    if !fetch.is_empty() {
        let spinner = Output::spinner(&format!("Fetching {} feeds...", fetch.len()));
        let report = orchestrator.fetch_feeds(fetch).await;
        spinner.finish_and_clear();

        let report = report?;
        Output::success(&format!(
            "{} feeds, {} entries, {} new",
            report.feeds, report.entries, report.inserted
        ));
        for error in &report.errors {
            Output::warning(error);
        }
    }

    let articles = match search {
        Some(q) => orchestrator.articles().search(q, limit)?,
        None => orchestrator.articles().list(limit, 0)?,
    };

    if articles.is_empty() {
        Output::info("No articles. Fetch some with 'newscast articles --fetch <feed-url>'.");
        return Ok(());
    }

    Output::header(&format!(
        "Articles ({} of {})",
        articles.len(),
        orchestrator.articles().count()?
    ));
    println!();
    for (i, article) in articles.iter().enumerate() {
        let detail = match (&article.source, &article.published) {
            (Some(source), Some(published)) => format!("{} | {}", source, published),
            (Some(source), None) => source.clone(),
            (None, Some(published)) => published.clone(),
            (None, None) => content_preview(&article.description, 120),
        };
        Output::source(i + 1, &article.title, &article.url, Some(&detail));
    }
    Ok(())
}

/// Show LLM usage costs.
pub fn run_costs(context: Option<String>, model: Option<String>, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let filter = CostFilter {
        model,
        context,
        ..Default::default()
    };
    let summary = orchestrator.costs().summary(&filter)?;

    Output::header("LLM Costs");
    Output::kv("Calls", &summary.total_calls.to_string());
    Output::kv("Input tokens", &summary.total_input_tokens.to_string());
    Output::kv("Output tokens", &summary.total_output_tokens.to_string());
    Output::kv("Input cost", &format_cost(summary.total_input_cost));
    Output::kv("Output cost", &format_cost(summary.total_output_cost));
    Output::kv("Total", &format_cost(summary.total_cost));

    let by_context = orchestrator.costs().by_context()?;
    if !by_context.is_empty() && filter.context.is_none() {
        Output::header("By agent");
        for (context, cost, calls) in by_context {
            Output::kv(&context, &format!("{} ({} calls)", format_cost(cost), calls));
        }
    }
    Ok(())
}
