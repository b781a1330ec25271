//! Scheduled task management.

use crate::cli::{Output, ScheduleAction};
use crate::config::Settings;
use crate::db::Database;
use crate::queue::JobKind;
use crate::scheduler::{NewTask, ScheduleStore};
use anyhow::Result;
use std::sync::Arc;

/// Turn the `schedule add` flags into a job payload.
fn job_kind(podcast: Option<&str>, language: Option<&str>, feeds: &[String]) -> Result<JobKind> {
    match (podcast, feeds.is_empty()) {
        (Some(query), true) => Ok(JobKind::GeneratePodcast {
            query: query.to_string(),
            language: language.map(str::to_string),
        }),
        (None, false) => Ok(JobKind::FetchFeeds {
            urls: feeds.to_vec(),
        }),
        (Some(_), false) => anyhow::bail!("Use either --podcast or --feed, not both"),
        (None, true) => anyhow::bail!("Give --podcast <topic> or at least one --feed <url>"),
    }
}

pub fn run_schedule(action: &ScheduleAction, settings: Settings) -> Result<()> {
    let db = Arc::new(Database::open(&settings.database_path())?);
    let store = ScheduleStore::new(db);

    match action {
        ScheduleAction::Add {
            name,
            every,
            podcast,
            language,
            feed,
        } => {
            let kind = job_kind(podcast.as_deref(), language.as_deref(), feed)?;
            let task = store.add(NewTask {
                name: name.clone(),
                kind,
                interval_secs: *every,
                start_at: None,
            })?;
            Output::success(&format!("Scheduled '{}' every {}s", task.name, task.interval_secs));
            Output::kv("Id", &task.id);
            Output::info("Run 'newscast scheduler' and 'newscast worker' to execute it.");
        }

        ScheduleAction::List => {
            let tasks = store.list()?;
            if tasks.is_empty() {
                Output::info("No scheduled tasks.");
                return Ok(());
            }
            Output::header(&format!("Scheduled tasks ({})", tasks.len()));
            for task in tasks {
                let state = if task.enabled { "enabled" } else { "disabled" };
                Output::list_item(&format!(
                    "{} ({}) {} every {}s, next {}, {}",
                    task.name,
                    task.id,
                    task.kind.name(),
                    task.interval_secs,
                    task.next_run.format("%Y-%m-%d %H:%M"),
                    state
                ));
            }
        }

        ScheduleAction::Remove { id } => {
            store.remove(id)?;
            Output::success(&format!("Removed task {}", id));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_from_flags() {
        let kind = job_kind(Some("AI news"), Some("es"), &[]).unwrap();
        assert_eq!(
            kind,
            JobKind::GeneratePodcast {
                query: "AI news".to_string(),
                language: Some("es".to_string()),
            }
        );

        let feeds = vec!["https://a/rss".to_string()];
        assert_eq!(job_kind(None, None, &feeds).unwrap().name(), "fetch_feeds");
        assert!(job_kind(None, None, &[]).is_err());
        assert!(job_kind(Some("x"), None, &feeds).is_err());
    }
}
