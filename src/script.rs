//! Two-host podcast scripts.

use crate::agent::Llm;
use crate::config::{Prompts, ScriptPrompts};
use crate::error::{NewscastError, Result};
use crate::search::SearchItem;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument};

pub const SPEAKER_ALEX: &str = "ALEX";
pub const SPEAKER_MORGAN: &str = "MORGAN";

/// One spoken turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dialog {
    pub speaker: String,
    pub text: String,
}

/// A script section: `intro`, `headlines`, `article` or `outro`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub dialog: Vec<Dialog>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PodcastScript {
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
    /// URLs of the sources the script was written from.
    #[serde(default)]
    pub sources: Vec<String>,
}

/// A dialog turn ready for speech synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogEntry {
    /// 1 for ALEX, 2 for MORGAN.
    pub speaker: u8,
    pub text: String,
}

/// Numeric voice slot for a host name.
pub fn speaker_id(name: &str) -> Option<u8> {
    match name.trim().to_uppercase().as_str() {
        SPEAKER_ALEX => Some(1),
        SPEAKER_MORGAN => Some(2),
        _ => None,
    }
}

impl PodcastScript {
    /// Flatten sections into speakable turns, skipping empty text and unknown speakers.
    pub fn dialog_entries(&self) -> Vec<DialogEntry> {
        self.sections
            .iter()
            .flat_map(|section| section.dialog.iter())
            .filter_map(|turn| {
                let text = turn.text.trim();
                if text.is_empty() {
                    return None;
                }
                speaker_id(&turn.speaker).map(|speaker| DialogEntry {
                    speaker,
                    text: text.to_string(),
                })
            })
            .collect()
    }

    pub fn has_dialog(&self) -> bool {
        self.sections.iter().any(|s| !s.dialog.is_empty())
    }
}

/// Render confirmed sources as numbered blocks for the script prompt.
///
/// Returns the text and the URLs used, or `None` when nothing is confirmed.
/// Numbering follows the position in `results`, so it matches what the user saw.
pub fn format_sources_for_script(
    results: &[SearchItem],
    created_at: &str,
) -> Option<(String, Vec<String>)> {
    let mut blocks = vec![format!("PODCAST CREATION: {}\n", created_at)];
    let mut sources = Vec::new();

    for (idx, item) in results.iter().enumerate() {
        if !item.confirmed {
            continue;
        }
        let n = idx + 1;
        sources.push(item.url.clone());
        blocks.push(format!(
            "SOURCE {n}:\nTitle: {}\nURL: {}\nContent: {}\n---END OF SOURCE {n}---",
            item.title,
            item.url,
            item.content()
        ));
    }

    if sources.is_empty() {
        return None;
    }
    Some((blocks.join("\n\n"), sources))
}

/// Anything that can write a script from formatted sources.
#[async_trait]
pub trait ScriptAuthor: Send + Sync {
    async fn write(&self, query: &str, language_name: &str, content: &str) -> Result<PodcastScript>;
}

/// LLM-backed script writer.
pub struct ScriptWriter {
    llm: Llm,
    model: String,
    prompts: ScriptPrompts,
}

impl ScriptWriter {
    pub fn new(llm: Llm, model: &str, prompts: ScriptPrompts) -> Self {
        Self {
            llm,
            model: model.to_string(),
            prompts,
        }
    }
}

#[async_trait]
impl ScriptAuthor for ScriptWriter {
    #[instrument(skip(self, content))]
    async fn write(&self, query: &str, language_name: &str, content: &str) -> Result<PodcastScript> {
        let mut vars = HashMap::new();
        vars.insert("query".to_string(), query.to_string());
        vars.insert("language".to_string(), language_name.to_string());
        vars.insert("content".to_string(), content.to_string());
        let user = Prompts::render(&self.prompts.user, &vars);

        let script: PodcastScript = self
            .llm
            .complete_json(&self.model, &self.prompts.system, &user, "script_writer")
            .await?;

        if !script.has_dialog() {
            return Err(NewscastError::Script(
                "Model returned a script without dialog".to_string(),
            ));
        }

        info!(
            "Wrote script '{}' with {} sections",
            script.title,
            script.sections.len()
        );
        Ok(script)
    }
}
