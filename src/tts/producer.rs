//! Episode production: parallel segment synthesis followed by ffmpeg assembly.

use super::{
    edge_available, select_engine, EdgeTts, ElevenLabsTts, EpisodeRenderer, OpenAiTts,
    RenderedEpisode, Synthesizer, TtsEngine,
};
use crate::audio::{self, plan_parts};
use crate::config::{api_key, Settings, TtsSettings};
use crate::error::{NewscastError, Result};
use crate::openai::LlmClient;
use crate::script::DialogEntry;
use crate::session::Language;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Synthesize every non-empty entry into `dir`, keeping dialog order.
///
/// Failed segments are skipped; it is an error only when none succeeded.
pub async fn synthesize_segments(
    synth: &dyn Synthesizer,
    entries: &[DialogEntry],
    dir: &Path,
    max_concurrent: usize,
) -> Result<Vec<PathBuf>> {
    let jobs: Vec<(usize, &DialogEntry)> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.text.trim().is_empty())
        .collect();

    if jobs.is_empty() {
        return Err(NewscastError::Tts("No dialog to synthesize".to_string()));
    }

    let total = jobs.len();
    let futures: Vec<_> = jobs
        .into_iter()
        .map(|(i, entry)| async move {
            let path = dir.join(format!("segment_{i:04}.mp3"));
            match synth.synthesize(entry.text.trim(), entry.speaker, &path).await {
                Ok(()) => Some(path),
                Err(e) => {
                    warn!("Segment {} ({}) failed: {}", i, synth.engine(), e);
                    None
                }
            }
        })
        .collect();
    let results: Vec<Option<PathBuf>> = stream::iter(futures)
        .buffered(max_concurrent.max(1))
        .collect()
        .await;

    let segments: Vec<PathBuf> = results.into_iter().flatten().collect();
    if segments.is_empty() {
        return Err(NewscastError::Tts(format!(
            "All {} segments failed with {}",
            total,
            synth.engine()
        )));
    }

    info!("Synthesized {}/{} segments with {}", segments.len(), total, synth.engine());
    Ok(segments)
}

/// Renders episodes with whichever engine is usable.
pub struct AudioProducer {
    tts: TtsSettings,
    temp_dir: PathBuf,
    http: reqwest::Client,
    llm: Option<LlmClient>,
}

impl AudioProducer {
    pub fn new(settings: &Settings, http: reqwest::Client, llm: Option<LlmClient>) -> Self {
        Self {
            tts: settings.tts.clone(),
            temp_dir: settings.temp_dir(),
            http,
            llm,
        }
    }

    fn configured_engine(&self) -> Option<TtsEngine> {
        self.tts.engine.as_deref().and_then(TtsEngine::parse)
    }

    async fn choose(&self, preferred: Option<TtsEngine>) -> TtsEngine {
        select_engine(
            preferred.or_else(|| self.configured_engine()),
            edge_available().await,
            api_key("ELEVENLABS_API_KEY").is_some(),
            self.llm.is_some() && api_key("OPENAI_API_KEY").is_some(),
        )
    }

    fn synthesizer(&self, engine: TtsEngine, language: &Language) -> Result<Box<dyn Synthesizer>> {
        Ok(match engine {
            TtsEngine::Edge => Box::new(EdgeTts::new(self.tts.edge_voices.clone())),
            TtsEngine::ElevenLabs => {
                let key = api_key("ELEVENLABS_API_KEY").ok_or_else(|| {
                    NewscastError::Config("ELEVENLABS_API_KEY is not set".to_string())
                })?;
                Box::new(ElevenLabsTts::new(
                    self.http.clone(),
                    key,
                    &self.tts.elevenlabs_model,
                    self.tts.elevenlabs_voices.clone(),
                ))
            }
            TtsEngine::OpenAi => {
                let client = self.llm.clone().ok_or_else(|| {
                    NewscastError::Config("OpenAI client is not configured".to_string())
                })?;
                Box::new(OpenAiTts::new(
                    client,
                    &self.tts.openai_model,
                    self.tts.openai_voices.clone(),
                    language.is_english(),
                ))
            }
        })
    }

    fn music(path: &Option<String>) -> Option<PathBuf> {
        path.as_deref()
            .map(Settings::expand_path)
            .filter(|p| p.exists())
    }

    /// Synthesize and assemble an episode into `output`.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn produce(
        &self,
        entries: &[DialogEntry],
        output: &Path,
        preferred: Option<TtsEngine>,
        language: &Language,
    ) -> Result<RenderedEpisode> {
        let engine = self.choose(preferred).await;
        let synth = self.synthesizer(engine, language)?;
        info!("Rendering {} dialog turns with {}", entries.len(), engine);

        std::fs::create_dir_all(&self.temp_dir)?;
        let workdir = tempfile::Builder::new()
            .prefix("newscast_tts_")
            .tempdir_in(&self.temp_dir)?;

        let segments =
            synthesize_segments(synth.as_ref(), entries, workdir.path(), self.tts.max_concurrent)
                .await?;

        let intro = Self::music(&self.tts.intro_music);
        let outro = Self::music(&self.tts.outro_music);
        let parts = plan_parts(intro.as_deref(), &segments, outro.as_deref(), self.tts.silence_ms);
        audio::concat(&parts, output).await?;

        let duration_secs = match audio::media_duration(output).await {
            Ok(secs) => Some(secs),
            Err(e) => {
                warn!("Could not measure {:?}: {}", output, e);
                None
            }
        };

        info!("Episode written to {:?}", output);
        Ok(RenderedEpisode {
            path: output.to_path_buf(),
            engine,
            duration_secs,
        })
    }
}

#[async_trait]
impl EpisodeRenderer for AudioProducer {
    async fn render(
        &self,
        entries: &[DialogEntry],
        output: &Path,
        preferred: Option<TtsEngine>,
        language: &Language,
    ) -> Result<RenderedEpisode> {
        self.produce(entries, output, preferred, language).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes the text to the output file; fails for one speaker.
    struct FakeSynth {
        fail_speaker: Option<u8>,
    }

    #[async_trait]
    impl Synthesizer for FakeSynth {
        fn engine(&self) -> TtsEngine {
            TtsEngine::Edge
        }

        async fn synthesize(&self, text: &str, speaker: u8, output: &Path) -> Result<()> {
            if Some(speaker) == self.fail_speaker {
                return Err(NewscastError::Tts("voice unavailable".to_string()));
            }
            tokio::fs::write(output, text).await?;
            Ok(())
        }
    }

    fn entry(speaker: u8, text: &str) -> DialogEntry {
        DialogEntry {
            speaker,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_segments_keep_order_and_skip_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![entry(1, "one"), entry(2, "  "), entry(2, "two"), entry(1, "three")];

        let segments = synthesize_segments(&FakeSynth { fail_speaker: None }, &entries, dir.path(), 2)
            .await
            .unwrap();

        assert_eq!(segments.len(), 3);
        let texts: Vec<String> = segments
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_failed_segments_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![entry(1, "one"), entry(2, "two"), entry(1, "three")];

        let segments =
            synthesize_segments(&FakeSynth { fail_speaker: Some(2) }, &entries, dir.path(), 4)
                .await
                .unwrap();
        assert_eq!(segments.len(), 2);
    }

    #[tokio::test]
    async fn test_all_segments_failing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![entry(2, "two")];
        let err = synthesize_segments(&FakeSynth { fail_speaker: Some(2) }, &entries, dir.path(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, NewscastError::Tts(_)));

        let err = synthesize_segments(&FakeSynth { fail_speaker: None }, &[], dir.path(), 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No dialog"));
    }
}
