//! HTTP API server, optionally with in-process workers.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::queue::WorkerPool;
use crate::server::{self, AppState};
use std::sync::Arc;
use tracing::error;

/// Run the HTTP API server.
pub async fn run_serve(
    host: Option<String>,
    port: Option<u16>,
    workers: usize,
    settings: Settings,
) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);

    let orchestrator = Arc::new(Orchestrator::new(settings)?);
    let state = Arc::new(AppState::from_orchestrator(&orchestrator));

    Output::header("Newscast API Server");
    println!();
    Output::success(&format!("Listening on http://{}:{}", host, port));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("New session", "POST /api/podcast-agent/session");
    Output::kv("Session", "GET  /api/podcast-agent/session/{id}");
    Output::kv("Chat", "POST /api/podcast-agent/chat");
    Output::kv("Task status", "GET  /api/podcast-agent/status/{task_id}");
    Output::kv("Podcasts", "GET  /api/podcasts");
    Output::kv("Generate", "POST /api/podcasts/generate");
    Output::kv("Articles", "GET  /api/articles");
    Output::kv("Research", "POST /api/research");
    Output::kv("Costs", "GET  /api/costs");
    Output::kv("Tasks", "GET  /api/tasks");
    println!();

    if workers > 0 {
        Output::info(&format!("Running {} in-process workers.", workers));
        let pool = Arc::new(WorkerPool::new(
            orchestrator.queue().clone(),
            orchestrator.locks().clone(),
            orchestrator.clone(),
            orchestrator.settings().queue.clone(),
        ));
        tokio::spawn(async move {
            if let Err(e) = pool.run(workers).await {
                error!("Worker pool stopped: {}", e);
            }
        });
    } else {
        Output::info("Chat jobs are queued; start 'newscast worker' to process them.");
    }
    Output::info("Press Ctrl+C to stop the server.");

    server::serve(state, &host, port).await?;
    Ok(())
}
