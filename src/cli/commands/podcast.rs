//! One-shot podcast generation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;

/// Search, scrape, script and record an episode about `query`.
pub async fn run_podcast(
    query: &str,
    language: Option<String>,
    settings: Settings,
) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Podcast) {
        Output::error(&e.to_string());
        Output::info("Run 'newscast doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner(&format!("Producing a podcast about '{}'...", query));
    let result = orchestrator
        .studio()
        .generate_podcast(query, language.as_deref())
        .await;
    spinner.finish_and_clear();

    match result {
        Ok(generated) => {
            Output::success(&format!("Recorded '{}'", generated.title));
            Output::kv("Podcast", &generated.podcast_id);
            Output::kv("Session", &generated.session_id);
            Output::kv("Audio", &generated.audio_path.display().to_string());
            Ok(())
        }
        Err(e) => {
            Output::error(&format!("Podcast generation failed: {}", e));
            Err(e.into())
        }
    }
}
