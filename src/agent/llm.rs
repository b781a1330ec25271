//! Shared LLM access with cost accounting.

use crate::cost::{CostTracker, TokenUsage};
use crate::error::{NewscastError, Result};
use crate::openai::LlmClient;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs, CompletionUsage,
    CreateChatCompletionRequestArgs, ResponseFormat,
};
use serde::de::{DeserializeOwned, IgnoredAny};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Client plus optional cost tracker, cheap to clone.
#[derive(Clone)]
pub struct Llm {
    client: LlmClient,
    costs: Option<Arc<CostTracker>>,
}

impl Llm {
    pub fn new(client: LlmClient, costs: Option<Arc<CostTracker>>) -> Self {
        Self { client, costs }
    }

    pub fn client(&self) -> &LlmClient {
        &self.client
    }

    /// Record token usage of one completion. Tracking failures are only logged.
    pub fn record_usage(&self, model: &str, usage: Option<&CompletionUsage>, context: &str) {
        let (Some(costs), Some(usage)) = (&self.costs, usage) else {
            return;
        };
        let usage = TokenUsage {
            input_tokens: usage.prompt_tokens as u64,
            output_tokens: usage.completion_tokens as u64,
        };
        if let Err(e) = costs.record(model, usage, Some(context)) {
            warn!("Failed to record LLM cost: {}", e);
        }
    }

    /// One JSON-mode completion deserialized into `T`.
    #[instrument(skip(self, system, user))]
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        model: &str,
        system: &str,
        user: &str,
        context: &str,
    ) -> Result<T> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(|e| NewscastError::Agent(e.to_string()))?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()
                    .map_err(|e| NewscastError::Agent(e.to_string()))?
                    .into(),
            ])
            .response_format(ResponseFormat::JsonObject)
            .build()
            .map_err(|e| NewscastError::Agent(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| NewscastError::OpenAI(format!("Completion failed: {}", e)))?;

        self.record_usage(model, response.usage.as_ref(), context);

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| NewscastError::Agent("Empty response from model".to_string()))?;

        debug!("{} returned {} chars of JSON", context, content.len());

        let json = extract_json(&content)
            .ok_or_else(|| NewscastError::Agent("Model response contained no JSON".to_string()))?;
        serde_json::from_str(json)
            .map_err(|e| NewscastError::Agent(format!("Model returned invalid JSON: {}", e)))
    }
}

/// Body of the first fenced code block, if any.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let rest = &text[open + 3..];
    let body = &rest[rest.find('\n')? + 1..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// Byte length of the JSON value at the start of `text`.
fn json_value_len(text: &str) -> Option<usize> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<IgnoredAny>();
    match stream.next() {
        Some(Ok(_)) => Some(stream.byte_offset()),
        _ => None,
    }
}

/// Locate the JSON in a model reply, tolerating code fences and chatter.
///
/// A fenced block wins; otherwise the longest object or array in the text.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(block) = fenced_block(text) {
        if !block.is_empty() && json_value_len(block) == Some(block.len()) {
            return Some(block);
        }
    }

    let mut best: Option<&str> = None;
    let mut pos = 0;
    while let Some(offset) = text[pos..].find(['{', '[']) {
        let start = pos + offset;
        match json_value_len(&text[start..]) {
            Some(len) => {
                let candidate = &text[start..start + len];
                if best.map_or(true, |b| candidate.len() > b.len()) {
                    best = Some(candidate);
                }
                pos = start + len;
            }
            None => pos = start + 1,
        }
    }
    best
}
