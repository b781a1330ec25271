//! Coordinator tools bound to one session.

use super::Studio;
use crate::agent::{function_tool, optional_str, parse_arguments, required_str, ToolSet};
use crate::error::{NewscastError, Result};
use async_openai::types::ChatCompletionTool;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct PodcastTools {
    studio: Arc<Studio>,
    session_id: String,
}

impl PodcastTools {
    pub fn new(studio: Arc<Studio>, session_id: &str) -> Self {
        Self {
            studio,
            session_id: session_id.to_string(),
        }
    }
}

/// Accepts `[1, 3]`, `["1", "3"]` or `"1, 3"`.
fn parse_selection(value: &Value) -> Result<Vec<usize>> {
    let invalid = || NewscastError::InvalidInput(format!("Invalid source selection: {}", value));
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Number(n) => n.as_u64().map(|n| n as usize).ok_or_else(invalid),
                Value::String(s) => s.trim().parse().map_err(|_| invalid()),
                _ => Err(invalid()),
            })
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().map_err(|_| invalid()))
            .collect(),
        _ => Err(invalid()),
    }
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn no_args() -> Value {
    json!({"type": "object", "properties": {}})
}

#[async_trait]
impl ToolSet for PodcastTools {
    fn definitions(&self) -> Vec<ChatCompletionTool> {
        vec![
            function_tool(
                "search_agent_run",
                "Search the web and news for sources about a topic. Replaces earlier results.",
                json!({
                    "type": "object",
                    "properties": {"query": {"type": "string", "description": "Topic to search for"}},
                    "required": ["query"]
                }),
            ),
            function_tool(
                "user_source_selection_run",
                "Confirm sources by their 1-based numbers. Omit selected_sources to confirm all.",
                json!({
                    "type": "object",
                    "properties": {
                        "selected_sources": {"type": "array", "items": {"type": "integer"}}
                    }
                }),
            ),
            function_tool(
                "scrape_agent_run",
                "Read the full text of the found sources.",
                no_args(),
            ),
            function_tool(
                "ui_manager_run",
                "Show or hide a frontend panel. Only one panel is visible at a time.",
                json!({
                    "type": "object",
                    "properties": {
                        "state_type": {
                            "type": "string",
                            "enum": [
                                "show_sources_for_selection",
                                "show_script_for_confirmation",
                                "show_audio_for_confirmation",
                                "show_recording_player"
                            ]
                        },
                        "active": {"type": "boolean"}
                    },
                    "required": ["state_type", "active"]
                }),
            ),
            function_tool(
                "update_language",
                "Set the language the podcast will be written and spoken in.",
                json!({
                    "type": "object",
                    "properties": {
                        "code": {"type": "string", "description": "ISO 639-1 code, e.g. 'es'"},
                        "name": {"type": "string", "description": "English name, e.g. 'Spanish'"}
                    },
                    "required": ["code"]
                }),
            ),
            function_tool(
                "podcast_script_agent_run",
                "Write the two-host podcast script from the confirmed sources.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Topic of the episode"},
                        "language_name": {"type": "string", "description": "Language to write in"}
                    },
                    "required": ["query"]
                }),
            ),
            function_tool(
                "audio_generate_agent_run",
                "Generate the episode audio from the current script.",
                no_args(),
            ),
            function_tool(
                "update_chat_title",
                "Give the conversation a short title.",
                json!({
                    "type": "object",
                    "properties": {"title": {"type": "string"}},
                    "required": ["title"]
                }),
            ),
            function_tool(
                "mark_session_finished",
                "Mark the session as finished once the user is happy with the episode.",
                no_args(),
            ),
        ]
    }

    async fn call(&self, name: &str, arguments: &str) -> Result<String> {
        let args = parse_arguments(arguments)?;
        let id = self.session_id.as_str();

        match name {
            "search_agent_run" => self.studio.search(id, &required_str(&args, "query")?).await,
            "user_source_selection_run" => {
                let selected = parse_selection(&args["selected_sources"])?;
                self.studio.select_sources(id, &selected)
            }
            "scrape_agent_run" => self.studio.scrape(id).await,
            "ui_manager_run" => {
                let state_type = required_str(&args, "state_type")?;
                let active = parse_bool(&args["active"]).ok_or_else(|| {
                    NewscastError::InvalidInput("'active' must be true or false".to_string())
                })?;
                self.studio.set_ui(id, &state_type, active)
            }
            "update_language" => {
                let code = required_str(&args, "code")?;
                let name = optional_str(&args, "name").unwrap_or_default();
                self.studio.update_language(id, &code, &name)
            }
            "podcast_script_agent_run" => {
                let query = required_str(&args, "query")?;
                let language = optional_str(&args, "language_name");
                self.studio
                    .write_script(id, &query, language.as_deref())
                    .await
            }
            "audio_generate_agent_run" => self.studio.generate_audio(id).await,
            "update_chat_title" => self.studio.update_title(id, &required_str(&args, "title")?),
            "mark_session_finished" => self.studio.mark_finished(id),
            _ => Err(NewscastError::Agent(format!("Unknown tool: {}", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::studio;
    use super::*;
    use crate::session::Stage;

    #[test]
    fn test_parse_selection_shapes() {
        assert_eq!(parse_selection(&json!([1, 3])).unwrap(), vec![1, 3]);
        assert_eq!(parse_selection(&json!(["2"])).unwrap(), vec![2]);
        assert_eq!(parse_selection(&json!("1, 4")).unwrap(), vec![1, 4]);
        assert!(parse_selection(&Value::Null).unwrap().is_empty());
        assert!(parse_selection(&json!("one")).is_err());
        assert!(parse_selection(&json!({"a": 1})).is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool(&json!(true)), Some(true));
        assert_eq!(parse_bool(&json!("False")), Some(false));
        assert_eq!(parse_bool(&json!(3)), None);
    }

    #[test]
    fn test_all_tools_defined() {
        let dir = tempfile::tempdir().unwrap();
        let tools = PodcastTools::new(studio(dir.path()), "s");
        assert_eq!(tools.definitions().len(), 9);
    }

    #[tokio::test]
    async fn test_tools_drive_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let studio = studio(dir.path());
        let id = studio.sessions().create().unwrap().id;
        let tools = PodcastTools::new(studio.clone(), &id);

        tools.call("search_agent_run", r#"{"query": "fusion"}"#).await.unwrap();
        tools.call("user_source_selection_run", "").await.unwrap();
        tools.call("scrape_agent_run", "{}").await.unwrap();
        tools
            .call("update_language", r#"{"code": "fr", "name": "French"}"#)
            .await
            .unwrap();
        tools
            .call("podcast_script_agent_run", r#"{"query": "fusion"}"#)
            .await
            .unwrap();
        let message = tools.call("audio_generate_agent_run", "{}").await.unwrap();
        assert!(message.contains("/api/podcasts/"));

        let state = studio.sessions().get(&id).unwrap().state;
        assert_eq!(state.stage, Stage::Audio);
        assert!(state.show_audio_for_confirmation);
        assert_eq!(state.generated_script.unwrap().title, "fusion (French)");
        assert_eq!(state.selected_language.code, "fr");
    }

    #[tokio::test]
    async fn test_bad_calls_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let studio = studio(dir.path());
        let id = studio.sessions().create().unwrap().id;
        let tools = PodcastTools::new(studio, &id);

        assert!(tools.call("launch_rocket", "{}").await.is_err());
        assert!(tools.call("search_agent_run", "{}").await.is_err());
        assert!(tools
            .call("ui_manager_run", r#"{"state_type": "show_recording_player", "active": "maybe"}"#)
            .await
            .is_err());

        let refused = tools
            .call("ui_manager_run", r#"{"state_type": "show_sources_for_selection", "active": true}"#)
            .await
            .unwrap();
        assert!(refused.contains("auto-selected"));
    }
}
