//! Background worker and scheduler processes.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::queue::WorkerPool;
use crate::scheduler::Scheduler;
use std::sync::Arc;

/// Run workers until Ctrl-C.
pub async fn run_worker(concurrency: Option<usize>, settings: Settings) -> anyhow::Result<()> {
    let concurrency = concurrency.unwrap_or(settings.queue.concurrency).max(1);
    let orchestrator = Arc::new(Orchestrator::new(settings)?);

    let pool = Arc::new(WorkerPool::new(
        orchestrator.queue().clone(),
        orchestrator.locks().clone(),
        orchestrator.clone(),
        orchestrator.settings().queue.clone(),
    ));

    Output::header("Newscast Worker");
    Output::kv("Concurrency", &concurrency.to_string());
    Output::kv(
        "Database",
        &orchestrator.settings().database_path().display().to_string(),
    );
    Output::info("Press Ctrl+C to stop after running jobs finish.");

    pool.run(concurrency).await?;
    Output::success("Workers stopped.");
    Ok(())
}

/// Run the scheduler until Ctrl-C.
pub async fn run_scheduler(settings: Settings) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let scheduler = Scheduler::new(
        orchestrator.schedules().clone(),
        orchestrator.settings().scheduler.poll_seconds,
    );

    let tasks = orchestrator.schedules().list()?;
    Output::header("Newscast Scheduler");
    Output::kv("Tasks", &tasks.len().to_string());
    Output::kv("Poll", &format!("{:?}", scheduler.poll_interval()));
    if tasks.is_empty() {
        Output::warning("No tasks yet. Add one with 'newscast schedule add'.");
    }

    scheduler.run().await?;
    Ok(())
}
