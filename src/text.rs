//! Small text helpers shared by feeds, search providers and the scraper.

use regex::Regex;
use scraper::Html;
use std::sync::LazyLock;

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex is valid")
}

static WS_RE: LazyLock<Regex> = LazyLock::new(|| regex(r"\s+"));

/// Remove HTML tags and decode entities (named and numeric).
pub fn strip_html(input: &str) -> String {
    let fragment = Html::parse_fragment(input);
    let text: Vec<&str> = fragment.root_element().text().collect();
    collapse_whitespace(&text.join(" "))
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(input: &str) -> String {
    WS_RE.replace_all(input, " ").trim().to_string()
}

/// Truncate to at most `max_chars` characters, never splitting a char.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => input[..idx].to_string(),
        None => input.to_string(),
    }
}

/// Truncate for display, appending an ellipsis when shortened.
pub fn preview(input: &str, max_chars: usize) -> String {
    let flat = input.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        format!("{}...", truncate_chars(&flat, max_chars.saturating_sub(3)))
    }
}
