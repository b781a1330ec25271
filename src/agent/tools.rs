//! The tool seam between agents and the rest of the crate.

use crate::error::{NewscastError, Result};
use async_openai::types::{ChatCompletionTool, ChatCompletionToolType, FunctionObject};
use async_trait::async_trait;
use serde_json::Value;

/// A set of tools an [`super::Agent`] may call.
#[async_trait]
pub trait ToolSet: Send + Sync {
    /// OpenAI function definitions for every tool in the set.
    fn definitions(&self) -> Vec<ChatCompletionTool>;

    /// Execute a tool. `arguments` is the raw JSON the model produced.
    ///
    /// Errors are reported back to the model as text by the runner.
    async fn call(&self, name: &str, arguments: &str) -> Result<String>;
}

/// Build a function tool definition.
pub fn function_tool(name: &str, description: &str, parameters: Value) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: name.to_string(),
            description: Some(description.to_string()),
            parameters: Some(parameters),
            strict: None,
        },
    }
}

/// Parse tool arguments; an empty string means no arguments.
pub fn parse_arguments(arguments: &str) -> Result<Value> {
    if arguments.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(arguments)
        .map_err(|e| NewscastError::Agent(format!("Invalid tool arguments: {}", e)))
}

pub fn required_str(args: &Value, key: &str) -> Result<String> {
    args[key]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| NewscastError::Agent(format!("Missing '{}' argument", key)))
}

pub fn optional_str(args: &Value, key: &str) -> Option<String> {
    args[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn optional_u64(args: &Value, key: &str) -> Option<u64> {
    match &args[key] {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_tool_shape() {
        let tool = function_tool(
            "update_chat_title",
            "Set the title",
            serde_json::json!({"type": "object", "properties": {}}),
        );
        assert_eq!(tool.function.name, "update_chat_title");
        assert_eq!(tool.function.description.as_deref(), Some("Set the title"));
    }

    #[test]
    fn test_parse_arguments() {
        assert!(parse_arguments("").unwrap().as_object().unwrap().is_empty());
        let args = parse_arguments(r#"{"query": "rust", "num": "7"}"#).unwrap();
        assert_eq!(required_str(&args, "query").unwrap(), "rust");
        assert_eq!(optional_u64(&args, "num"), Some(7));
        assert!(required_str(&args, "missing").is_err());
        assert!(parse_arguments("{not json").is_err());
    }

    #[test]
    fn test_optional_str_ignores_blank() {
        let args = serde_json::json!({"a": "  ", "b": " x "});
        assert_eq!(optional_str(&args, "a"), None);
        assert_eq!(optional_str(&args, "b").as_deref(), Some("x"));
    }
}
