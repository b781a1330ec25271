//! HackerNews research command.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;

pub async fn run_research(query: &str, settings: Settings) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Agent) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner("Researching on HackerNews and the web...");
    let report = orchestrator.research().run(query).await;
    spinner.finish_and_clear();

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            Output::error(&format!("Research failed: {}", e));
            return Err(e.into());
        }
    };

    println!("\n{}\n", report.content);

    if !report.tool_calls.is_empty() {
        Output::header(&format!("Tool calls ({})", report.tool_calls.len()));
        for call in &report.tool_calls {
            Output::list_item(&crate::cli::content_preview(call, 120));
        }
    }

    Ok(())
}
