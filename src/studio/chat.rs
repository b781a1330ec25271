//! The conversational coordinator.

use super::{PodcastTools, Studio};
use crate::agent::{Agent, HistoryMessage, Llm, MessageRole};
use crate::error::Result;
use crate::session::SessionState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Reply to one chat message, as returned to the frontend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatOutcome {
    pub session_id: String,
    pub response: String,
    pub stage: String,
    pub session_state: serde_json::Value,
    pub is_processing: bool,
    pub process_type: Option<String>,
}

impl ChatOutcome {
    pub fn failed(session_id: &str, error: &dyn std::fmt::Display) -> Self {
        Self {
            session_id: session_id.to_string(),
            response: format!(
                "I'm sorry, I encountered an error: {}. Please try again.",
                error
            ),
            stage: "error".to_string(),
            session_state: serde_json::json!({}),
            is_processing: false,
            process_type: None,
        }
    }
}

/// Summary of the session handed to the model with every message.
pub fn session_context(state: &SessionState) -> String {
    let mut lines = vec![
        format!("stage: {}", state.stage),
        format!(
            "language: {} ({})",
            state.selected_language.name, state.selected_language.code
        ),
        format!(
            "sources: {} found, {} confirmed, {} with full text",
            state.search_results.len(),
            state.confirmed_count(),
            state
                .search_results
                .iter()
                .filter(|s| s.full_text.is_some())
                .count()
        ),
    ];
    if let Some(title) = &state.title {
        lines.push(format!("title: {}", title));
    }
    if let Some(script) = &state.generated_script {
        lines.push(format!("script: '{}' ready", script.title));
    }
    if let Some(url) = &state.audio_url {
        lines.push(format!("audio: {}", url));
    }
    if state.finished {
        lines.push("session finished".to_string());
    }
    lines.join("\n")
}

pub struct PodcastAgent {
    studio: Arc<Studio>,
    llm: Llm,
    model: String,
    system_prompt: String,
    history_messages: usize,
    max_iterations: usize,
}

impl PodcastAgent {
    pub fn new(studio: Arc<Studio>, llm: Llm, model: &str, system_prompt: &str) -> Self {
        Self {
            studio,
            llm,
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            history_messages: 30,
            max_iterations: 15,
        }
    }

    pub fn with_history_messages(mut self, n: usize) -> Self {
        self.history_messages = n;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn studio(&self) -> &Arc<Studio> {
        &self.studio
    }

    /// Handle one user message. Failures become an apologetic reply.
    #[instrument(skip(self, message))]
    pub async fn chat(&self, session_id: &str, message: &str) -> ChatOutcome {
        match self.try_chat(session_id, message).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Chat in session {} failed: {}", session_id, e);
                self.studio.mark_error(session_id);
                ChatOutcome::failed(session_id, &e)
            }
        }
    }

    async fn try_chat(&self, session_id: &str, message: &str) -> Result<ChatOutcome> {
        let sessions = self.studio.sessions();
        let session = sessions.get(session_id)?;

        let history: Vec<HistoryMessage> = sessions
            .history(session_id, self.history_messages)?
            .into_iter()
            .map(HistoryMessage::from)
            .collect();
        sessions.append_message(session_id, MessageRole::User, message)?;

        let tools = Arc::new(PodcastTools::new(self.studio.clone(), session_id));
        let agent = Agent::new(self.llm.clone(), tools, &self.model)
            .with_system_prompt(&self.system_prompt)
            .with_max_iterations(self.max_iterations)
            .with_label("podcast_agent");

        let context = session_context(&session.state);
        let response = agent
            .run_with_history(&history, message, Some(&context))
            .await?;

        sessions.append_message(session_id, MessageRole::Assistant, &response.content)?;
        info!(
            "Session {} answered after {} tool calls",
            session_id,
            response.tool_calls.len()
        );

        let state = sessions.get(session_id)?.state;
        Ok(ChatOutcome {
            session_id: session_id.to_string(),
            response: response.content,
            stage: state.stage.to_string(),
            session_state: serde_json::to_value(&state)?,
            is_processing: false,
            process_type: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchItem;
    use crate::session::Stage;

    #[test]
    fn test_failed_outcome_shape() {
        let outcome = ChatOutcome::failed("abc", &"boom");
        assert_eq!(outcome.stage, "error");
        assert_eq!(
            outcome.response,
            "I'm sorry, I encountered an error: boom. Please try again."
        );
        assert_eq!(outcome.session_state, serde_json::json!({}));
        assert!(!outcome.is_processing);
    }

    #[test]
    fn test_session_context() {
        let mut state = SessionState {
            stage: Stage::Scrape,
            title: Some("Fusion".to_string()),
            ..Default::default()
        };
        let mut item = SearchItem::new("https://a", "A", "", "t");
        item.confirmed = true;
        item.full_text = Some("text".to_string());
        state.search_results = vec![item, SearchItem::new("https://b", "B", "", "t")];

        let context = session_context(&state);
        assert!(context.contains("stage: scrape"));
        assert!(context.contains("language: English (en)"));
        assert!(context.contains("sources: 2 found, 1 confirmed, 1 with full text"));
        assert!(context.contains("title: Fusion"));
        assert!(!context.contains("audio:"));
    }

    #[tokio::test]
    async fn test_unknown_session_gives_apology() {
        let dir = tempfile::tempdir().unwrap();
        let studio = super::super::test_support::studio(dir.path());
        let client = async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new().with_api_key("test"),
        );
        let agent = PodcastAgent::new(studio, Llm::new(client, None), "gpt-4o-mini", "system");

        let outcome = agent.chat("missing", "hello").await;
        assert_eq!(outcome.stage, "error");
        assert!(outcome.response.contains("Not found: session missing"));
    }
}
