//! Interactive chat with the podcast producer.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::session::SessionState;
use console::style;
use std::io::{self, BufRead, Write};
use std::time::Duration;

/// Run the interactive chat command.
pub async fn run_chat(session: Option<String>, settings: Settings) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Agent) {
        Output::error(&e.to_string());
        Output::info("Run 'newscast doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let lock_ttl = Duration::from_secs(settings.queue.session_lock_seconds);
    let owner = format!("cli-{}", uuid::Uuid::new_v4());
    let orchestrator = Orchestrator::new(settings)?;
    let sessions = orchestrator.sessions();

    let mut session_id = match session {
        Some(id) => {
            let session = sessions.get(&id)?;
            Output::info(&format!(
                "Resuming session {} ({})",
                session.id, session.state.stage
            ));
            for message in sessions.history(&id, 10)? {
                println!(
                    "{} {}",
                    style(format!("{}:", message.role.as_str())).dim(),
                    crate::cli::content_preview(&message.content, 160)
                );
            }
            id
        }
        None => sessions.create()?.id,
    };

    println!("\n{}", style("Newscast Producer").bold().cyan());
    println!(
        "{}\n",
        style("Tell me what your podcast should be about. Commands: 'state', 'new', 'exit'.").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info(&format!("Session saved as {}", session_id));
            break;
        }

        if input.eq_ignore_ascii_case("new") {
            session_id = sessions.create()?.id;
            Output::info(&format!("Started session {}", session_id));
            continue;
        }

        if input.eq_ignore_ascii_case("state") {
            print_state(&sessions.get(&session_id)?.state);
            continue;
        }

        let spinner = Output::spinner("Working on it...");
        let outcome = orchestrator
            .locks()
            .with_lock(
                &session_id,
                &owner,
                lock_ttl,
                orchestrator.agent().chat(&session_id, input),
            )
            .await;
        spinner.finish_and_clear();

        let outcome = match outcome? {
            Some(outcome) => outcome,
            None => {
                Output::warning("A worker is processing this session. Try again shortly.");
                continue;
            }
        };

        Output::assistant(&outcome.response);
        let podcast = sessions
            .get(&session_id)
            .ok()
            .and_then(|s| s.state.podcast_id)
            .and_then(|id| orchestrator.podcasts().get(&id).ok());
        if let Some(podcast) = podcast {
            Output::kv("Audio", &podcast.audio_path.display().to_string());
        }
    }

    Ok(())
}

fn print_state(state: &SessionState) {
    Output::header("Session");
    Output::kv("Stage", state.stage.as_str());
    Output::kv(
        "Language",
        &format!("{} ({})", state.selected_language.name, state.selected_language.code),
    );
    if let Some(title) = &state.title {
        Output::kv("Title", title);
    }
    for (i, source) in state.search_results.iter().enumerate() {
        let mark = if source.confirmed { "confirmed" } else { "found" };
        Output::source(i + 1, &source.title, &source.url, Some(mark));
    }
    if let Some(script) = &state.generated_script {
        Output::kv(
            "Script",
            &format!("{} ({} sections)", script.title, script.sections.len()),
        );
    }
    println!();
}
