//! CLI module for Newscast.

pub mod commands;
mod output;
pub mod preflight;

pub use output::{content_preview, format_cost, Output};

use clap::{Parser, Subcommand};

/// Newscast - turn any topic into a two-host news podcast
///
/// Chat with a producer agent that finds sources, reads them, writes a script
/// and records the episode. Also runs the API server, background workers and
/// a HackerNews research assistant.
#[derive(Parser, Debug)]
#[command(name = "newscast")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "NEWSCAST_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Also run this many in-process workers
        #[arg(short, long, default_value = "0")]
        workers: usize,
    },

    /// Run background workers that process queued jobs
    Worker {
        /// Number of concurrent workers (defaults to queue.concurrency)
        #[arg(short = 'n', long)]
        concurrency: Option<usize>,

        /// Also write logs to <data_dir>/logs/worker_<timestamp>.log
        #[arg(long)]
        log_file: bool,
    },

    /// Run the periodic task scheduler
    Scheduler,

    /// Chat with the podcast producer interactively
    Chat {
        /// Resume an existing session
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Produce a podcast about a topic in one go
    Podcast {
        /// What the episode should be about
        query: String,

        /// Episode language (code or name, e.g. "es" or "Spanish")
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Discover sources for a topic
    Search {
        /// Search query
        query: String,
    },

    /// Extract article text from URLs
    Scrape {
        /// URLs to read
        #[arg(required = true)]
        urls: Vec<String>,

        /// Print the full text instead of a preview
        #[arg(long)]
        full: bool,
    },

    /// Research a HackerNews topic and write a report
    Research {
        /// What to research
        query: String,
    },

    /// List generated podcasts
    List {
        /// Maximum number of podcasts
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Browse or refresh the article archive
    Articles {
        /// Fetch these RSS/Atom feeds into the archive first
        #[arg(short, long)]
        fetch: Vec<String>,

        /// Only show articles matching this text
        #[arg(short, long)]
        search: Option<String>,

        /// Maximum number of articles
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show LLM usage costs
    Costs {
        /// Only calls made by this agent (e.g. podcast_agent)
        #[arg(long)]
        context: Option<String>,

        /// Only calls to this model
        #[arg(long)]
        model: Option<String>,
    },

    /// Manage scheduled tasks
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// Check system requirements and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ScheduleAction {
    /// Add a periodic task
    Add {
        /// Task name
        name: String,

        /// Interval in seconds
        #[arg(long)]
        every: u64,

        /// Generate a podcast about this topic on every run
        #[arg(long, conflicts_with = "feed")]
        podcast: Option<String>,

        /// Language for --podcast
        #[arg(long, requires = "podcast")]
        language: Option<String>,

        /// Fetch this feed on every run (repeatable)
        #[arg(long)]
        feed: Vec<String>,
    },

    /// List scheduled tasks
    List,

    /// Remove a scheduled task
    Remove {
        /// Task id
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_schedule_add() {
        let cli = Cli::try_parse_from([
            "newscast", "schedule", "add", "tech", "--every", "3600", "--feed", "https://a/rss",
            "--feed", "https://b/rss",
        ])
        .unwrap();
        match cli.command {
            Commands::Schedule {
                action: ScheduleAction::Add { every, feed, podcast, .. },
            } => {
                assert_eq!(every, 3600);
                assert_eq!(feed.len(), 2);
                assert!(podcast.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_scrape_needs_urls() {
        assert!(Cli::try_parse_from(["newscast", "scrape"]).is_err());
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["newscast", "-vv", "doctor"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
