//! Audio assembly with ffmpeg.
//!
//! Speech segments, silences and optional music are joined in a single ffmpeg
//! run. Every input is resampled to a common format first, so segments from
//! different engines (or music files) can be mixed freely.

use crate::error::{NewscastError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

const SAMPLE_RATE: u32 = 44_100;

/// One piece of the final episode.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioPart {
    File(PathBuf),
    Silence { millis: u64 },
}

/// Lay out an episode: intro, segments separated by silence, outro.
pub fn plan_parts(
    intro: Option<&Path>,
    segments: &[PathBuf],
    outro: Option<&Path>,
    silence_ms: u64,
) -> Vec<AudioPart> {
    let mut parts = Vec::with_capacity(segments.len() * 2 + 2);

    if let Some(intro) = intro {
        parts.push(AudioPart::File(intro.to_path_buf()));
    }

    for (i, segment) in segments.iter().enumerate() {
        if i > 0 && silence_ms > 0 {
            parts.push(AudioPart::Silence { millis: silence_ms });
        }
        parts.push(AudioPart::File(segment.clone()));
    }

    if let Some(outro) = outro {
        parts.push(AudioPart::File(outro.to_path_buf()));
    }

    parts
}

/// ffmpeg arguments that concatenate `parts` into an MP3 at `output`.
pub fn concat_args(parts: &[AudioPart], output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-loglevel".into(), "error".into()];

    for part in parts {
        match part {
            AudioPart::File(path) => {
                args.push("-i".into());
                args.push(path.to_string_lossy().into_owned());
            }
            AudioPart::Silence { millis } => {
                args.push("-f".into());
                args.push("lavfi".into());
                args.push("-t".into());
                args.push(format!("{:.3}", *millis as f64 / 1000.0));
                args.push("-i".into());
                args.push(format!("anullsrc=r={}:cl=stereo", SAMPLE_RATE));
            }
        }
    }

    let mut filter = String::new();
    for i in 0..parts.len() {
        filter.push_str(&format!(
            "[{i}:a]aresample={SAMPLE_RATE},aformat=sample_fmts=fltp:channel_layouts=stereo[a{i}];"
        ));
    }
    for i in 0..parts.len() {
        filter.push_str(&format!("[a{i}]"));
    }
    filter.push_str(&format!("concat=n={}:v=0:a=1[out]", parts.len()));

    args.extend([
        "-filter_complex".into(),
        filter,
        "-map".into(),
        "[out]".into(),
        "-c:a".into(),
        "libmp3lame".into(),
        "-q:a".into(),
        "2".into(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}

/// Concatenate parts into an MP3 file.
#[instrument(skip(parts), fields(parts = parts.len()))]
pub async fn concat(parts: &[AudioPart], output: &Path) -> Result<()> {
    if parts.is_empty() {
        return Err(NewscastError::Audio("Nothing to concatenate".to_string()));
    }
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    debug!("Assembling {} parts into {:?}", parts.len(), output);

    let result = Command::new("ffmpeg")
        .args(concat_args(parts, output))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;

    match result {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => {
            let err = String::from_utf8_lossy(&out.stderr);
            Err(NewscastError::Audio(format!("ffmpeg concat failed: {err}")))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(NewscastError::ToolNotFound("ffmpeg".into()))
        }
        Err(e) => Err(NewscastError::Audio(format!("ffmpeg error: {e}"))),
    }
}

/// Duration of an audio file in seconds (via ffprobe).
pub async fn media_duration(path: &Path) -> Result<f64> {
    let result = Command::new("ffprobe")
        .arg("-v").arg("error")
        .arg("-show_entries").arg("format=duration")
        .arg("-of").arg("default=noprint_wrappers=1:nokey=1")
        .arg(path)
        .output()
        .await;

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(NewscastError::ToolNotFound("ffprobe".into()));
        }
        Err(e) => return Err(NewscastError::Audio(format!("ffprobe error: {e}"))),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(NewscastError::Audio(format!("ffprobe failed: {stderr}")));
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .map_err(|e| NewscastError::Audio(format!("Cannot parse duration: {e}")))
}
