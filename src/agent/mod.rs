//! LLM agents with tool calling.
//!
//! [`Agent`] drives the chat-completion loop; anything exposing tools to it
//! implements [`ToolSet`]. [`Llm`] wraps the client together with the cost
//! tracker so every completion is priced.

mod llm;
mod runner;
mod tools;

pub use llm::{extract_json, Llm};
pub use runner::{Agent, AgentResponse, HistoryMessage, MessageRole, ToolCallRecord};
pub use tools::{function_tool, optional_str, optional_u64, parse_arguments, required_str, ToolSet};
