//! Microsoft Edge voices through the `edge-tts` command line tool.

use super::{voice_for, Synthesizer, TtsEngine};
use crate::error::{NewscastError, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Whether `edge-tts` is installed and runs.
pub async fn edge_available() -> bool {
    Command::new("edge-tts")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

pub struct EdgeTts {
    voices: [String; 2],
}

impl EdgeTts {
    pub fn new(voices: [String; 2]) -> Self {
        Self { voices }
    }
}

/// `edge-tts` arguments. The text is attached with `=` so a line starting
/// with `-` is not read as an option.
fn edge_args(voice: &str, text: &str, output: &Path) -> Vec<OsString> {
    let mut media = OsString::from("--write-media=");
    media.push(output);
    vec![
        format!("--voice={}", voice).into(),
        format!("--text={}", text).into(),
        media,
    ]
}

#[async_trait]
impl Synthesizer for EdgeTts {
    fn engine(&self) -> TtsEngine {
        TtsEngine::Edge
    }

    async fn synthesize(&self, text: &str, speaker: u8, output: &Path) -> Result<()> {
        let result = Command::new("edge-tts")
            .args(edge_args(voice_for(&self.voices, speaker), text, output))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        match result {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => {
                let err = String::from_utf8_lossy(&out.stderr);
                Err(NewscastError::Tts(format!("edge-tts failed: {err}")))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(NewscastError::ToolNotFound("edge-tts".into()))
            }
            Err(e) => Err(NewscastError::Tts(format!("edge-tts error: {e}"))),
        }
    }
}
