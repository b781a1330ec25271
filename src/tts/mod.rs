//! Speech synthesis for two-host episodes.
//!
//! Three engines are supported: the free `edge-tts` CLI, ElevenLabs and the
//! OpenAI speech API. All of them write MP3 segments that
//! [`AudioProducer`] stitches together with ffmpeg.

mod edge;
mod elevenlabs;
mod openai;
mod producer;

pub use edge::{edge_available, EdgeTts};
pub use elevenlabs::ElevenLabsTts;
pub use openai::OpenAiTts;
pub use producer::{synthesize_segments, AudioProducer};

use crate::error::Result;
use crate::script::DialogEntry;
use crate::session::Language;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsEngine {
    Edge,
    ElevenLabs,
    OpenAi,
}

impl TtsEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            TtsEngine::Edge => "edge",
            TtsEngine::ElevenLabs => "elevenlabs",
            TtsEngine::OpenAi => "openai",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "edge" | "edge-tts" => Some(TtsEngine::Edge),
            "elevenlabs" | "eleven" => Some(TtsEngine::ElevenLabs),
            "openai" => Some(TtsEngine::OpenAi),
            _ => None,
        }
    }
}

impl fmt::Display for TtsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the engine for one episode.
///
/// A preferred engine wins when it can run. Otherwise edge is tried first,
/// then ElevenLabs, then OpenAI; with nothing usable edge is returned and
/// fails loudly at synthesis time.
pub fn select_engine(
    preferred: Option<TtsEngine>,
    edge_available: bool,
    elevenlabs_key: bool,
    openai_key: bool,
) -> TtsEngine {
    match preferred {
        Some(TtsEngine::Edge) => return TtsEngine::Edge,
        Some(TtsEngine::ElevenLabs) if elevenlabs_key => return TtsEngine::ElevenLabs,
        Some(TtsEngine::OpenAi) if openai_key => return TtsEngine::OpenAi,
        Some(_) => return TtsEngine::Edge,
        None => {}
    }

    if edge_available {
        TtsEngine::Edge
    } else if elevenlabs_key {
        TtsEngine::ElevenLabs
    } else if openai_key {
        TtsEngine::OpenAi
    } else {
        TtsEngine::Edge
    }
}

/// Voice for a speaker slot; unknown slots use the first voice.
pub fn voice_for(voices: &[String; 2], speaker: u8) -> &str {
    match speaker {
        2 => &voices[1],
        _ => &voices[0],
    }
}

/// Synthesizes a single dialog turn into an audio file.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn engine(&self) -> TtsEngine;

    async fn synthesize(&self, text: &str, speaker: u8, output: &Path) -> Result<()>;
}

/// A finished episode on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEpisode {
    pub path: PathBuf,
    pub engine: TtsEngine,
    pub duration_secs: Option<f64>,
}

/// Turns dialog into a single audio file.
#[async_trait]
pub trait EpisodeRenderer: Send + Sync {
    async fn render(
        &self,
        entries: &[DialogEntry],
        output: &Path,
        preferred: Option<TtsEngine>,
        language: &Language,
    ) -> Result<RenderedEpisode>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_engine_wins_when_usable() {
        assert_eq!(
            select_engine(Some(TtsEngine::OpenAi), true, true, true),
            TtsEngine::OpenAi
        );
        assert_eq!(
            select_engine(Some(TtsEngine::ElevenLabs), false, true, false),
            TtsEngine::ElevenLabs
        );
        assert_eq!(select_engine(Some(TtsEngine::Edge), false, true, true), TtsEngine::Edge);
    }

    #[test]
    fn test_preferred_without_key_falls_back_to_edge() {
        assert_eq!(
            select_engine(Some(TtsEngine::OpenAi), false, true, false),
            TtsEngine::Edge
        );
        assert_eq!(
            select_engine(Some(TtsEngine::ElevenLabs), true, false, true),
            TtsEngine::Edge
        );
    }

    #[test]
    fn test_automatic_order() {
        assert_eq!(select_engine(None, true, true, true), TtsEngine::Edge);
        assert_eq!(select_engine(None, false, true, true), TtsEngine::ElevenLabs);
        assert_eq!(select_engine(None, false, false, true), TtsEngine::OpenAi);
        assert_eq!(select_engine(None, false, false, false), TtsEngine::Edge);
    }

    #[test]
    fn test_engine_names() {
        assert_eq!(TtsEngine::parse("ElevenLabs"), Some(TtsEngine::ElevenLabs));
        assert_eq!(TtsEngine::parse("edge-tts"), Some(TtsEngine::Edge));
        assert_eq!(TtsEngine::parse("google"), None);
        assert_eq!(serde_json::to_string(&TtsEngine::OpenAi).unwrap(), "\"openai\"");
    }

    #[test]
    fn test_voice_for_slots() {
        let voices = ["a".to_string(), "b".to_string()];
        assert_eq!(voice_for(&voices, 1), "a");
        assert_eq!(voice_for(&voices, 2), "b");
        assert_eq!(voice_for(&voices, 7), "a");
    }
}
