//! `newscast doctor`: check external tools, API keys and storage.

use crate::cli::preflight::version_arg;
use crate::cli::{content_preview, Output};
use crate::config::{api_key, Settings};
use console::style;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug)]
struct Check {
    level: Level,
    label: String,
    detail: String,
    fix: Option<String>,
}

impl Check {
    fn new(level: Level, label: &str, detail: impl Into<String>) -> Self {
        Self {
            level,
            label: label.to_string(),
            detail: detail.into(),
            fix: None,
        }
    }

    fn pass(label: &str, detail: impl Into<String>) -> Self {
        Self::new(Level::Pass, label, detail)
    }

    fn with_fix(mut self, fix: &str) -> Self {
        self.fix = Some(fix.to_string());
        self
    }

    /// Missing optional requirements are only warnings.
    fn optional(mut self) -> Self {
        self.level = self.level.min(Level::Warn);
        self
    }

    fn print(&self) {
        let marker = match self.level {
            Level::Pass => style("✓").green(),
            Level::Warn => style("!").yellow(),
            Level::Fail => style("✗").red(),
        };
        println!("  {} {}: {}", marker, style(&self.label).bold(), self.detail);
        if let Some(fix) = &self.fix {
            println!("      {}", style(fix).dim());
        }
    }
}

pub fn run_doctor(settings: &Settings, config_path: &Path) -> anyhow::Result<()> {
    Output::header("Newscast Doctor");
    println!();

    let sections = [
        ("Audio tools", audio_tools()),
        ("API keys", api_keys(settings)),
        ("Storage", storage(settings, config_path)),
    ];

    for (title, checks) in &sections {
        println!("{}", style(title).bold());
        checks.iter().for_each(Check::print);
        println!();
    }

    let all = || sections.iter().flat_map(|(_, checks)| checks.iter());
    let failed = all().filter(|c| c.level == Level::Fail).count();
    let warned = all().filter(|c| c.level == Level::Warn).count();

    match (failed, warned) {
        (0, 0) => Output::success("Everything looks good."),
        (0, w) => Output::warning(&format!("Ready, with {} warning(s).", w)),
        (f, _) => {
            Output::error(&format!("{} problem(s) need fixing first.", f));
            std::process::exit(1);
        }
    }

    Ok(())
}

fn audio_tools() -> Vec<Check> {
    let ffmpeg_fix = if cfg!(target_os = "macos") {
        "brew install ffmpeg"
    } else {
        "install ffmpeg with your package manager"
    };
    vec![
        check_tool("ffmpeg").with_fix(ffmpeg_fix),
        check_tool("ffprobe").with_fix(ffmpeg_fix),
        check_tool("edge-tts")
            .with_fix("pip install edge-tts (free voices)")
            .optional(),
    ]
}

/// Run `<tool> --version` (or its equivalent) and report the first line.
fn check_tool(name: &str) -> Check {
    match Command::new(name).arg(version_arg(name)).output() {
        Ok(out) if out.status.success() => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            let first = stdout.lines().next().unwrap_or_default().trim();
            Check::pass(name, content_preview(if first.is_empty() { "found" } else { first }, 50))
        }
        Ok(out) => Check::new(Level::Fail, name, format!("exited with {}", out.status)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Check::new(Level::Fail, name, "not on PATH")
        }
        Err(e) => Check::new(Level::Fail, name, e.to_string()),
    }
}

fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

fn api_keys(settings: &Settings) -> Vec<Check> {
    let key = |name: &str, level: Level, fix: &str| match api_key(name) {
        Some(value) => Check::pass(name, format!("set ({})", mask(&value))),
        None => Check::new(level, name, "not set").with_fix(fix),
    };
    let endpoint = settings
        .llm
        .api_base
        .clone()
        .or_else(|| api_key("OPENAI_API_BASE"))
        .unwrap_or_else(|| "api.openai.com (default)".to_string());

    vec![
        key("OPENAI_API_KEY", Level::Fail, "export OPENAI_API_KEY=... (used by every agent)"),
        key("TAVILY_API_KEY", Level::Warn, "enables the tavily_search provider"),
        key("ELEVENLABS_API_KEY", Level::Warn, "enables ElevenLabs voices"),
        Check::pass("LLM endpoint", endpoint),
    ]
}

fn storage(settings: &Settings, config_path: &Path) -> Vec<Check> {
    let mut checks = Vec::new();

    checks.push(if config_path.exists() {
        Check::pass("Config", config_path.display().to_string())
    } else {
        Check::new(Level::Warn, "Config", "defaults in use").with_fix("newscast config edit")
    });

    let db = settings.database_path();
    checks.push(match std::fs::metadata(&db) {
        Ok(meta) => Check::pass(
            "Database",
            format!("{} ({} KB)", db.display(), meta.len().div_ceil(1024)),
        ),
        Err(_) => Check::new(
            Level::Warn,
            "Database",
            format!("{} does not exist yet", db.display()),
        ),
    });

    let audio_dir = settings.audio_dir();
    checks.push(if audio_dir.is_dir() {
        Check::pass("Episodes", audio_dir.display().to_string())
    } else {
        Check::new(
            Level::Warn,
            "Episodes",
            format!("{} is created on first run", audio_dir.display()),
        )
    });

    let music = [
        ("Intro music", &settings.tts.intro_music),
        ("Outro music", &settings.tts.outro_music),
    ];
    for (label, path) in music {
        let Some(path) = path else { continue };
        let path = Settings::expand_path(path);
        checks.push(if path.is_file() {
            Check::pass(label, path.display().to_string())
        } else {
            Check::new(Level::Warn, label, format!("{} missing, skipped", path.display()))
        });
    }

    checks
}
