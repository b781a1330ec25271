//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and keys are available before starting
//! work that would otherwise fail midway.

use crate::config::api_key;
use crate::error::{NewscastError, Result};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Chatting and research need the LLM key.
    Agent,
    /// Producing audio also needs ffmpeg.
    Podcast,
    /// Searching and scraping need nothing external.
    Search,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation) -> Result<()> {
    match operation {
        Operation::Agent => {
            check_api_key()?;
        }
        Operation::Podcast => {
            check_api_key()?;
            check_tool("ffmpeg")?;
            check_tool("ffprobe")?;
        }
        Operation::Search => {}
    }
    Ok(())
}

fn check_api_key() -> Result<()> {
    match api_key("OPENAI_API_KEY") {
        Some(_) => Ok(()),
        None => Err(NewscastError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...' or add it to .env"
                .to_string(),
        )),
    }
}

/// Version flag a tool understands.
pub fn version_arg(name: &str) -> &'static str {
    match name {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    }
}

/// Check if an external tool is available.
pub fn check_tool(name: &str) -> Result<()> {
    match Command::new(name).arg(version_arg(name)).output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(NewscastError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(NewscastError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(NewscastError::ToolNotFound(format!("{}: {}", name, e))),
    }
}
