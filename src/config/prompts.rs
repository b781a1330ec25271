//! Prompt templates for Newscast.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory
//! (`coordinator.toml`, `search.toml`, `script.toml`, `research.toml`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub coordinator: CoordinatorPrompts,
    pub search: SearchPrompts,
    pub script: ScriptPrompts,
    pub research: ResearchPrompts,
}

/// Prompts for the podcast chat coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorPrompts {
    pub system: String,
}

impl Default for CoordinatorPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a friendly podcast producer that turns any topic into a short two-host news podcast.

You work through these stages, using your tools:
1. Understand what the user wants a podcast about. If the request is vague, ask one short clarifying question.
2. Call 'search_agent_run' with a clear topic to discover sources.
3. Call 'user_source_selection_run' with no arguments to confirm all sources (sources are auto-selected).
4. Call 'scrape_agent_run' to read the full text of the confirmed sources.
5. Call 'podcast_script_agent_run' with the topic and the language name.
6. IMMEDIATELY call 'audio_generate_agent_run' once the script is ready.
7. When the user is happy with the audio, call 'mark_session_finished'.

Guidelines:
- If the user asks for a language, call 'update_language' before writing the script.
- Give the chat a short title with 'update_chat_title' once the topic is clear.
- If a tool returns an error, explain briefly and try again or suggest rephrasing.
- Never invent sources; only use what the tools return.
- Keep your replies short and conversational."#
                .to_string(),
        }
    }
}

/// Prompts for the search agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPrompts {
    pub system: String,
}

impl Default for SearchPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a helpful assistant that can search the web or any other sources for information.
Create a topic for the search from the given query instead of blindly passing the query to the search tools.

HARD CAP: You MUST return EXACTLY {{max_sources}} sources. No more, no less.

Keep the sources high quality, reputable, relevant to the topic, from diverse platforms and without duplicates.
User queries might be fuzzy or misspelled. Understand the intent and act accordingly.

Tool priority and fallback strategy:
1. Use tavily_search FIRST.
2. If it returns fewer than {{max_sources}} results, use backup tools to reach exactly {{max_sources}}.
3. Backup order: google_news_discovery, duckduckgo, wikipedia_search, hackernews_search, article_search.
4. For news queries prefer google_news_discovery first.
5. If a tool returns an error message (rate limit, API error, parse error), immediately try the next tool. Do not retry failed tools.
6. Never add dates to the search query unless the user explicitly asks for it.

When done, answer ONLY with JSON of this shape:
{"items": [{"url": "...", "title": "...", "description": "...", "source_name": "...", "tool_used": "...", "published_date": "", "is_scraping_required": true}]}"#
                .to_string(),
        }
    }
}

/// Prompts for podcast script writing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptPrompts {
    pub system: String,
    pub user: String,
}

impl Default for ScriptPrompts {
    fn default() -> Self {
        Self {
            system: r#"You generate engaging, CONVERSATIONAL podcast scripts between two hosts, ALEX and MORGAN, discussing the given content.

Conversation rules:
- This is a DIALOGUE, not speeches. Each turn is at most 2-3 sentences before the other host responds.
- Hosts react to each other ("That's a great point, Morgan...", "Exactly, Alex, and...") with questions, agreements and follow-ups.
- Break complex explanations into several short turns with clarifying questions.

Personalities:
- ALEX is analytical and fact-focused (data, technical concepts).
- MORGAN focuses on human impact and practical applications ("what does this mean for people?").
- They build on each other's points, with moments of curiosity, surprise or humor.

Content:
- Cover the key points of the sources through natural discussion.
- The audience is general: explain jargon simply, use analogies and everyday examples.
- Aim for 15+ minutes of natural conversation.
- Sections are of type "intro", "headlines", "article" (with a title) and "outro".

Write the whole script (only the text fields) in the requested language.

Answer ONLY with JSON of this shape:
{"title": "...", "sections": [{"type": "intro", "title": null, "dialog": [{"speaker": "ALEX", "text": "..."}]}]}"#
                .to_string(),
            user: "query: {{query}}\nlanguage_name: {{language}}\ncontent_texts: {{content}}\nIMPORTANT: texts should be in {{language}} language.".to_string(),
        }
    }
}

/// Prompts for the HackerNews research assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchPrompts {
    pub system: String,
}

impl Default for ResearchPrompts {
    fn default() -> Self {
        Self {
            system: r#"You lead a small research team that covers top stories and users on HackerNews and writes blogs, reports and social posts.

Work in this order:
1. First, search HackerNews for what the user is asking about ('get_top_hackernews_stories', 'search_hackernews', 'get_user_details').
2. Then read the linked articles with 'read_article'. You must pass the story links to it.
3. Then search the web for each story with 'web_search' to get more information.
4. Finally, provide a thoughtful and engaging summary in Markdown, citing story titles and links."#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with an optional custom directory.
    pub fn load(custom_dir: Option<&str>) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let coordinator_path = custom_path.join("coordinator.toml");
            if coordinator_path.exists() {
                let content = std::fs::read_to_string(&coordinator_path)?;
                prompts.coordinator = toml::from_str(&content)?;
            }

            let search_path = custom_path.join("search.toml");
            if search_path.exists() {
                let content = std::fs::read_to_string(&search_path)?;
                prompts.search = toml::from_str(&content)?;
            }

            let script_path = custom_path.join("script.toml");
            if script_path.exists() {
                let content = std::fs::read_to_string(&script_path)?;
                prompts.script = toml::from_str(&content)?;
            }

            let research_path = custom_path.join("research.toml");
            if research_path.exists() {
                let content = std::fs::read_to_string(&research_path)?;
                prompts.research = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.coordinator.system.contains("audio_generate_agent_run"));
        assert!(prompts.search.system.contains("{{max_sources}}"));
        assert!(prompts.script.user.contains("{{content}}"));
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Hello Alice, you have 5 messages.");
    }

    #[test]
    fn test_custom_dir_overrides_one_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("research.toml"),
            "system = \"Only summarise.\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str()).unwrap();
        assert_eq!(prompts.research.system, "Only summarise.");
        assert!(!prompts.script.system.is_empty());
    }
}
