//! OpenAI speech API.

use super::{voice_for, Synthesizer, TtsEngine};
use crate::error::{NewscastError, Result};
use crate::openai::LlmClient;
use async_openai::types::{CreateSpeechRequestArgs, SpeechModel, SpeechResponseFormat, Voice};
use async_trait::async_trait;
use std::path::Path;

const VOICES: [&str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

fn to_voice(name: &str) -> Voice {
    match name.trim().to_lowercase().as_str() {
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        "shimmer" => Voice::Shimmer,
        _ => Voice::Alloy,
    }
}

/// Resolve the voice for a speaker. Slots beyond the configured two index
/// the built-in voice list.
pub(crate) fn openai_voice(voices: &[String; 2], speaker: u8) -> String {
    match speaker {
        1 | 2 => voice_for(voices, speaker).to_string(),
        n => VOICES
            .get(usize::from(n).wrapping_sub(1))
            .map(|v| v.to_string())
            .unwrap_or_else(|| voices[0].clone()),
    }
}

/// English gets the higher quality variant of the legacy model.
pub(crate) fn effective_model(model: &str, english: bool) -> String {
    if english && model == "tts-1" {
        "tts-1-hd".to_string()
    } else {
        model.to_string()
    }
}

pub struct OpenAiTts {
    client: LlmClient,
    model: String,
    voices: [String; 2],
}

impl OpenAiTts {
    pub fn new(client: LlmClient, model: &str, voices: [String; 2], english: bool) -> Self {
        Self {
            client,
            model: effective_model(model, english),
            voices,
        }
    }
}

#[async_trait]
impl Synthesizer for OpenAiTts {
    fn engine(&self) -> TtsEngine {
        TtsEngine::OpenAi
    }

    async fn synthesize(&self, text: &str, speaker: u8, output: &Path) -> Result<()> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .voice(to_voice(&openai_voice(&self.voices, speaker)))
            .model(SpeechModel::Other(self.model.clone()))
            .response_format(SpeechResponseFormat::Mp3)
            .build()
            .map_err(|e| NewscastError::Tts(e.to_string()))?;

        let response = self
            .client
            .audio()
            .speech(request)
            .await
            .map_err(|e| NewscastError::OpenAI(format!("Speech request failed: {e}")))?;

        tokio::fs::write(output, &response.bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_upgrade_only_for_english_tts1() {
        assert_eq!(effective_model("tts-1", true), "tts-1-hd");
        assert_eq!(effective_model("tts-1", false), "tts-1");
        assert_eq!(effective_model("gpt-4o-mini-tts", true), "gpt-4o-mini-tts");
    }

    #[test]
    fn test_voice_fallbacks() {
        let voices = ["alloy".to_string(), "nova".to_string()];
        assert_eq!(openai_voice(&voices, 1), "alloy");
        assert_eq!(openai_voice(&voices, 2), "nova");
        assert_eq!(openai_voice(&voices, 4), "onyx");
        assert_eq!(openai_voice(&voices, 0), "alloy");
        assert_eq!(openai_voice(&voices, 42), "alloy");
    }
}
