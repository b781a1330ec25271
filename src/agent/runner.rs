//! Agent runner with tool calling loop.

use super::llm::Llm;
use super::tools::ToolSet;
use crate::error::{NewscastError, Result};
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Author of a stored chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// A prior conversation turn replayed before the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Agent that answers a task by calling tools from a [`ToolSet`].
pub struct Agent {
    llm: Llm,
    model: String,
    tools: Arc<dyn ToolSet>,
    max_iterations: usize,
    system_prompt: String,
    label: String,
}

impl Agent {
    /// Create a new agent over the given tools and model.
    pub fn new(llm: Llm, tools: Arc<dyn ToolSet>, model: &str) -> Self {
        Self {
            llm,
            model: model.to_string(),
            tools,
            max_iterations: 15,
            system_prompt: "You are a helpful assistant.".to_string(),
            label: "agent".to_string(),
        }
    }

    /// Set a custom system prompt.
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// Set maximum iterations for the agent loop.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Label under which token costs are recorded.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Run the agent with a user task.
    pub async fn run(&self, task: &str, context: Option<&str>) -> Result<AgentResponse> {
        self.run_with_history(&[], task, context).await
    }

    /// Run the agent after replaying earlier turns of the conversation.
    #[instrument(skip_all, fields(agent = %self.label))]
    pub async fn run_with_history(
        &self,
        history: &[HistoryMessage],
        task: &str,
        context: Option<&str>,
    ) -> Result<AgentResponse> {
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.system_prompt.clone())
                .build()
                .map_err(|e| NewscastError::Agent(e.to_string()))?
                .into(),
        ];

        for turn in history {
            messages.push(history_message(turn)?);
        }

        let user_message = match context {
            Some(ctx) => format!("Context: {}\n\nTask: {}", ctx, task),
            None => task.to_string(),
        };

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()
                .map_err(|e| NewscastError::Agent(e.to_string()))?
                .into(),
        );

        let definitions = self.tools.definitions();
        let mut iterations = 0;
        let mut tool_calls_made = Vec::new();

        loop {
            iterations += 1;
            if iterations > self.max_iterations {
                return Err(NewscastError::Agent(format!(
                    "Agent exceeded maximum iterations ({})",
                    self.max_iterations
                )));
            }

            debug!("Agent iteration {}", iterations);

            let mut request = CreateChatCompletionRequestArgs::default();
            request.model(&self.model).messages(messages.clone());
            if !definitions.is_empty() {
                request.tools(definitions.clone());
            }
            let request = request
                .build()
                .map_err(|e| NewscastError::Agent(e.to_string()))?;

            let response = self
                .llm
                .client()
                .chat()
                .create(request)
                .await
                .map_err(|e| NewscastError::OpenAI(format!("Agent API error: {}", e)))?;

            self.llm
                .record_usage(&self.model, response.usage.as_ref(), &self.label);

            let choice = response
                .choices
                .first()
                .ok_or_else(|| NewscastError::Agent("No response from model".to_string()))?;

            match &choice.message.tool_calls {
                Some(tool_calls) if !tool_calls.is_empty() => {
                    let mut assistant_msg = ChatCompletionRequestAssistantMessageArgs::default();
                    assistant_msg.tool_calls(tool_calls.clone());
                    if let Some(content) = &choice.message.content {
                        assistant_msg.content(content.clone());
                    }
                    messages.push(
                        assistant_msg
                            .build()
                            .map_err(|e| NewscastError::Agent(e.to_string()))?
                            .into(),
                    );

                    for tool_call in tool_calls {
                        let record = self.execute_tool_call(tool_call).await;

                        let tool_msg = ChatCompletionRequestToolMessageArgs::default()
                            .tool_call_id(&tool_call.id)
                            .content(record.result.clone())
                            .build()
                            .map_err(|e| NewscastError::Agent(e.to_string()))?;
                        messages.push(tool_msg.into());

                        tool_calls_made.push(record);
                    }
                }
                _ => {
                    return Ok(AgentResponse {
                        content: choice.message.content.clone().unwrap_or_default(),
                        tool_calls: tool_calls_made,
                        iterations,
                    });
                }
            }
        }
    }

    /// Execute a single tool call. Failures become the tool's text result.
    async fn execute_tool_call(&self, tool_call: &ChatCompletionMessageToolCall) -> ToolCallRecord {
        let name = &tool_call.function.name;
        let arguments = &tool_call.function.arguments;

        info!("Agent calling tool: {} with args: {}", name, arguments);

        let result = match self.tools.call(name, arguments).await {
            Ok(output) => output,
            Err(e) => format!("Tool error: {}", e),
        };

        ToolCallRecord {
            name: name.clone(),
            arguments: arguments.clone(),
            result,
        }
    }
}

fn history_message(turn: &HistoryMessage) -> Result<ChatCompletionRequestMessage> {
    let message = match turn.role {
        MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(turn.content.clone())
            .build()
            .map_err(|e| NewscastError::Agent(e.to_string()))?
            .into(),
        MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(turn.content.clone())
            .build()
            .map_err(|e| NewscastError::Agent(e.to_string()))?
            .into(),
    };
    Ok(message)
}

/// Response from an agent run.
#[derive(Debug)]
pub struct AgentResponse {
    /// The final response content from the agent.
    pub content: String,
    /// Record of all tool calls made during execution.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Number of iterations (LLM calls) used.
    pub iterations: usize,
}

/// Record of a tool call made by the agent.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: String,
    pub result: String,
}

impl std::fmt::Display for ToolCallRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::types::{ChatCompletionTool, ChatCompletionToolType, FunctionCall};
    use async_trait::async_trait;

    struct EchoTools;

    #[async_trait]
    impl ToolSet for EchoTools {
        fn definitions(&self) -> Vec<ChatCompletionTool> {
            Vec::new()
        }

        async fn call(&self, name: &str, arguments: &str) -> Result<String> {
            match name {
                "echo" => Ok(arguments.to_string()),
                _ => Err(NewscastError::Agent(format!("Unknown tool: {}", name))),
            }
        }
    }

    fn agent() -> Agent {
        let client = async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new().with_api_key("test"),
        );
        Agent::new(Llm::new(client, None), Arc::new(EchoTools), "gpt-4o-mini")
    }

    fn call(name: &str, arguments: &str) -> ChatCompletionMessageToolCall {
        ChatCompletionMessageToolCall {
            id: "call_1".to_string(),
            r#type: ChatCompletionToolType::Function,
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_tool_errors_become_text() {
        let agent = agent();

        let ok = agent.execute_tool_call(&call("echo", "{\"a\":1}")).await;
        assert_eq!(ok.result, "{\"a\":1}");

        let failed = agent.execute_tool_call(&call("nope", "{}")).await;
        assert_eq!(failed.result, "Tool error: Agent error: Unknown tool: nope");
    }

    #[test]
    fn test_tool_call_record_display() {
        let record = ToolCallRecord {
            name: "search_agent_run".to_string(),
            arguments: r#"{"query": "test"}"#.to_string(),
            result: "Found results".to_string(),
        };
        assert_eq!(format!("{}", record), r#"search_agent_run({"query": "test"})"#);
    }

    #[test]
    fn test_message_role_round_trip() {
        assert_eq!(MessageRole::parse("assistant"), Some(MessageRole::Assistant));
        assert_eq!(MessageRole::User.as_str(), "user");
        assert_eq!(MessageRole::parse("system"), None);
    }
}
