//! LLM-driven source discovery.
//!
//! The model sees every provider as a tool and decides which to call. Provider
//! failures come back to it as text naming the next tool to try, and only URLs
//! a tool actually returned are accepted from its final answer.

use super::{dedupe_by_url, format_results_for_agent, SearchItem, SearchProvider};
use crate::agent::{
    extract_json, function_tool, optional_u64, parse_arguments, required_str, Agent, Llm, ToolSet,
};
use crate::config::Prompts;
use crate::error::{NewscastError, Result};
use async_openai::types::ChatCompletionTool;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

/// Providers exposed as agent tools for one search run.
pub struct SearchTools {
    providers: Vec<Arc<dyn SearchProvider>>,
    results_per_provider: usize,
    seen: Mutex<Vec<SearchItem>>,
}

impl SearchTools {
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>, results_per_provider: usize) -> Self {
        Self {
            providers,
            results_per_provider,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every item returned by a tool so far.
    pub fn seen(&self) -> Vec<SearchItem> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn next_after(&self, name: &str) -> Option<&str> {
        let pos = self.providers.iter().position(|p| p.name() == name)?;
        self.providers.get(pos + 1).map(|p| p.name())
    }
}

#[async_trait]
impl ToolSet for SearchTools {
    fn definitions(&self) -> Vec<ChatCompletionTool> {
        self.providers
            .iter()
            .map(|provider| {
                function_tool(
                    provider.name(),
                    provider.description(),
                    json!({
                        "type": "object",
                        "properties": {
                            "query": {"type": "string", "description": "Search topic"},
                            "max_results": {"type": "integer", "description": "Maximum results to return"}
                        },
                        "required": ["query"]
                    }),
                )
            })
            .collect()
    }

    async fn call(&self, name: &str, arguments: &str) -> Result<String> {
        let provider = self
            .providers
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| NewscastError::Agent(format!("Unknown tool: {}", name)))?;

        let args = parse_arguments(arguments)?;
        let query = required_str(&args, "query")?;
        let max_results = optional_u64(&args, "max_results")
            .map(|n| n as usize)
            .unwrap_or(self.results_per_provider)
            .clamp(1, self.results_per_provider.max(1));

        match provider.search(&query, max_results).await {
            Ok(items) => {
                if let Ok(mut seen) = self.seen.lock() {
                    seen.extend(items.iter().cloned());
                }
                format_results_for_agent(&items)
            }
            Err(e) => {
                let hint = match self.next_after(name) {
                    Some(next) => format!(" Try {} next.", next),
                    None => " No more tools left to try.".to_string(),
                };
                Err(NewscastError::Search(format!("{} failed: {}.{}", name, e, hint)))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AgentAnswer {
    Wrapped { items: Vec<SearchItem> },
    Bare(Vec<SearchItem>),
}

/// Parse the agent's final answer into items.
pub(crate) fn parse_answer(content: &str) -> Result<Vec<SearchItem>> {
    let json = extract_json(content)
        .ok_or_else(|| NewscastError::Search("Search agent answered without JSON".to_string()))?;
    let answer: AgentAnswer = serde_json::from_str(json)
        .map_err(|e| NewscastError::Search(format!("Search agent returned invalid JSON: {}", e)))?;
    Ok(match answer {
        AgentAnswer::Wrapped { items } | AgentAnswer::Bare(items) => items,
    })
}

/// Keep only items whose URL some tool returned, filling gaps from the tool's copy.
pub(crate) fn ground_items(answer: Vec<SearchItem>, seen: &[SearchItem]) -> Vec<SearchItem> {
    let known: HashMap<&str, &SearchItem> = seen.iter().map(|i| (i.url.as_str(), i)).collect();
    let mut dropped = HashSet::new();

    let grounded: Vec<SearchItem> = answer
        .into_iter()
        .filter_map(|mut item| match known.get(item.url.as_str()) {
            Some(original) => {
                if item.title.trim().is_empty() {
                    item.title = original.title.clone();
                }
                if item.description.trim().is_empty() {
                    item.description = original.description.clone();
                }
                if item.tool_used == "unknown" {
                    item.tool_used = original.tool_used.clone();
                }
                item.confirmed = false;
                item.full_text = None;
                Some(item)
            }
            None => {
                dropped.insert(item.url);
                None
            }
        })
        .collect();

    if !dropped.is_empty() {
        warn!("Dropped {} sources no tool returned", dropped.len());
    }
    dedupe_by_url(grounded)
}

/// Runs a tool-calling agent over the search providers.
pub struct SearchAgent {
    llm: Llm,
    model: String,
    system_prompt: String,
    providers: Vec<Arc<dyn SearchProvider>>,
    results_per_provider: usize,
    max_iterations: usize,
}

impl SearchAgent {
    pub fn new(
        llm: Llm,
        model: &str,
        prompt_template: &str,
        providers: Vec<Arc<dyn SearchProvider>>,
        max_sources: usize,
        results_per_provider: usize,
    ) -> Self {
        let mut vars = HashMap::new();
        vars.insert("max_sources".to_string(), max_sources.to_string());

        Self {
            llm,
            model: model.to_string(),
            system_prompt: Prompts::render(prompt_template, &vars),
            providers,
            results_per_provider,
            max_iterations: 15,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    #[instrument(skip(self))]
    pub async fn run(&self, query: &str) -> Result<Vec<SearchItem>> {
        let tools = Arc::new(SearchTools::new(
            self.providers.clone(),
            self.results_per_provider,
        ));
        let agent = Agent::new(self.llm.clone(), tools.clone(), &self.model)
            .with_system_prompt(&self.system_prompt)
            .with_max_iterations(self.max_iterations)
            .with_label("search_agent");

        let response = agent.run(query, None).await?;
        info!(
            "Search agent finished after {} iterations and {} tool calls",
            response.iterations,
            response.tool_calls.len()
        );

        let items = parse_answer(&response.content)?;
        Ok(ground_items(items, &tools.seen()))
    }
}
