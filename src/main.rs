//! Newscast CLI entry point.

use anyhow::Result;
use clap::Parser;
use newscast::cli::{commands, Cli, Commands};
use newscast::config::{load_env, Settings};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(log_level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("newscast={}", log_level)));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::File::create(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_ref()
        .map(|p| Settings::expand_path(p))
        .unwrap_or_else(Settings::default_config_path);
    let settings = Settings::load_from(Some(&config_path))?;

    let log_file: Option<PathBuf> = match &cli.command {
        Commands::Worker { log_file: true, .. } => Some(settings.log_dir().join(format!(
            "worker_{}.log",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ))),
        _ => None,
    };
    // Worker log files record at least info.
    let verbose = if log_file.is_some() {
        cli.verbose.max(1)
    } else {
        cli.verbose
    };
    init_tracing(settings.general.log_level_for(verbose), log_file.as_deref())?;
    if let Some(path) = &log_file {
        eprintln!("Logging to {}", path.display());
    }

    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.temp_dir())?;
    std::fs::create_dir_all(settings.audio_dir())?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            workers,
        } => {
            commands::run_serve(host, port, workers, settings).await?;
        }

        Commands::Worker { concurrency, .. } => {
            commands::run_worker(concurrency, settings).await?;
        }

        Commands::Scheduler => {
            commands::run_scheduler(settings).await?;
        }

        Commands::Chat { session } => {
            commands::run_chat(session, settings).await?;
        }

        Commands::Podcast { query, language } => {
            commands::run_podcast(&query, language, settings).await?;
        }

        Commands::Search { query } => {
            commands::run_search(&query, settings).await?;
        }

        Commands::Scrape { urls, full } => {
            commands::run_scrape(&urls, full, settings).await?;
        }

        Commands::Research { query } => {
            commands::run_research(&query, settings).await?;
        }

        Commands::List { limit } => {
            commands::run_list(limit, settings)?;
        }

        Commands::Articles {
            fetch,
            search,
            limit,
        } => {
            commands::run_articles(&fetch, search.as_deref(), limit, settings).await?;
        }

        Commands::Costs { context, model } => {
            commands::run_costs(context, model, settings)?;
        }

        Commands::Schedule { action } => {
            commands::run_schedule(&action, settings)?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings, &config_path)?;
        }

        Commands::Config { action } => {
            commands::run_config(&action, settings, &config_path)?;
        }
    }

    Ok(())
}
