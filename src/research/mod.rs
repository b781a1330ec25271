//! HackerNews research assistant.
//!
//! A single agent plays the research team: it looks at HackerNews, reads the
//! linked articles, searches the web for context and writes a Markdown report.

mod tools;

pub use tools::{ResearchTools, StorySource};

use crate::agent::{Agent, Llm};
use crate::error::{NewscastError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Clone, Serialize)]
pub struct ResearchReport {
    pub query: String,
    pub content: String,
    /// Tools called, in order, as `name(arguments)`.
    pub tool_calls: Vec<String>,
}

pub struct ResearchAssistant {
    llm: Llm,
    model: String,
    system_prompt: String,
    tools: Arc<ResearchTools>,
    max_iterations: usize,
}

impl ResearchAssistant {
    pub fn new(llm: Llm, model: &str, system_prompt: &str, tools: Arc<ResearchTools>) -> Self {
        Self {
            llm,
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            tools,
            max_iterations: 15,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    #[instrument(skip(self))]
    pub async fn run(&self, query: &str) -> Result<ResearchReport> {
        let query = query.trim();
        if query.is_empty() {
            return Err(NewscastError::InvalidInput("Research query is empty".to_string()));
        }

        let agent = Agent::new(self.llm.clone(), self.tools.clone(), &self.model)
            .with_system_prompt(&self.system_prompt)
            .with_max_iterations(self.max_iterations)
            .with_label("research_team");

        let response = agent.run(query, None).await?;
        info!(
            "Research finished in {} iterations ({} tool calls)",
            response.iterations,
            response.tool_calls.len()
        );

        Ok(ResearchReport {
            query: query.to_string(),
            content: response.content,
            tool_calls: response.tool_calls.iter().map(|c| c.to_string()).collect(),
        })
    }
}
