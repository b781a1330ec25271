//! ElevenLabs text-to-speech REST API.

use super::{voice_for, Synthesizer, TtsEngine};
use crate::error::{NewscastError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::path::Path;

const API_BASE: &str = "https://api.elevenlabs.io/v1/text-to-speech";

pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_key: String,
    model: String,
    voices: [String; 2],
}

impl ElevenLabsTts {
    pub fn new(client: reqwest::Client, api_key: String, model: &str, voices: [String; 2]) -> Self {
        Self {
            client,
            api_key,
            model: model.to_string(),
            voices,
        }
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsTts {
    fn engine(&self) -> TtsEngine {
        TtsEngine::ElevenLabs
    }

    async fn synthesize(&self, text: &str, speaker: u8, output: &Path) -> Result<()> {
        let voice_id = voice_for(&self.voices, speaker);
        let response = self
            .client
            .post(format!("{API_BASE}/{voice_id}"))
            .query(&[("output_format", "mp3_44100_128")])
            .header("xi-api-key", &self.api_key)
            .json(&json!({ "text": text, "model_id": self.model }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NewscastError::Tts(format!("ElevenLabs returned {status}: {body}")));
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(output, &bytes).await?;
        Ok(())
    }
}
