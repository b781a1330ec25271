//! RSS 2.0 and Atom feed parsing, fetching and the local article archive.

mod store;

pub use store::{Article, ArticleStore};

use crate::error::{NewscastError, Result};
use crate::text::strip_html;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// A single feed entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// Plain-text description (HTML removed).
    pub description: String,
    pub published: Option<String>,
    /// Publisher name when the feed carries one (`<source>`).
    pub source: Option<String>,
}

/// A parsed feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Feed {
    pub title: String,
    pub entries: Vec<FeedEntry>,
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Title,
    Link,
    Description,
    Published,
    Source,
}

fn field_for(name: &[u8]) -> Option<Field> {
    match name {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"description" | b"summary" | b"content" | b"encoded" => Some(Field::Description),
        b"pubDate" | b"published" | b"updated" | b"date" => Some(Field::Published),
        b"source" => Some(Field::Source),
        _ => None,
    }
}

/// Parse an RSS 2.0 or Atom document.
pub fn parse_feed(xml: &str) -> Result<Feed> {
    let mut reader = Reader::from_str(xml);

    let mut feed = Feed::default();
    let mut entry: Option<FeedEntry> = None;
    let mut field: Option<Field> = None;
    let mut buffer = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| NewscastError::Feed(format!("Malformed XML: {}", e)))?;

        match event {
            Event::Start(ref e) => {
                let local = e.local_name();
                let name = local.as_ref();
                if name == b"item" || name == b"entry" {
                    entry = Some(FeedEntry::default());
                    field = None;
                } else if let Some(f) = field_for(name) {
                    if f == Field::Link {
                        // Atom links may be written as start/end pairs too.
                        if let (Some(current), Some(href)) = (entry.as_mut(), link_href(e)) {
                            if current.link.is_empty() {
                                current.link = href;
                            }
                        }
                    }
                    field = Some(f);
                    buffer.clear();
                }
            }
            Event::Empty(ref e) => {
                if e.local_name().as_ref() == b"link" {
                    if let (Some(current), Some(href)) = (entry.as_mut(), link_href(e)) {
                        if current.link.is_empty() {
                            current.link = href;
                        }
                    }
                }
            }
            Event::Text(ref t) => {
                if field.is_some() {
                    buffer.push_str(&decode_text(t));
                }
            }
            Event::CData(ref c) => {
                if field.is_some() {
                    buffer.push_str(&String::from_utf8_lossy(c));
                }
            }
            Event::GeneralRef(ref r) => {
                if field.is_some() {
                    let reference = format!("&{};", String::from_utf8_lossy(r));
                    buffer.push_str(&unescape(&reference).unwrap_or_default());
                }
            }
            Event::End(ref e) => {
                let local = e.local_name();
                let name = local.as_ref();
                if name == b"item" || name == b"entry" {
                    if let Some(done) = entry.take() {
                        feed.entries.push(done);
                    }
                    field = None;
                } else if let Some(f) = field.filter(|f| field_for(name) == Some(*f)) {
                    let value = std::mem::take(&mut buffer);
                    match entry.as_mut() {
                        Some(current) => assign(current, f, value),
                        None if f == Field::Title && feed.title.is_empty() => {
                            feed.title = value.trim().to_string();
                        }
                        None => {}
                    }
                    field = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    debug!("Parsed feed '{}' with {} entries", feed.title, feed.entries.len());
    Ok(feed)
}

fn decode_text(text: &[u8]) -> String {
    let raw = String::from_utf8_lossy(text);
    match unescape(&raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.into_owned(),
    }
}

fn link_href(element: &BytesStart) -> Option<String> {
    let mut href = None;
    let mut rel_alternate = true;
    for attr in element.attributes().flatten() {
        match attr.key.as_ref() {
            b"href" => href = Some(decode_text(&attr.value)),
            b"rel" => rel_alternate = attr.value.as_ref() == b"alternate",
            _ => {}
        }
    }
    href.filter(|_| rel_alternate)
}

fn assign(entry: &mut FeedEntry, field: Field, value: String) {
    let value = value.trim().to_string();
    if value.is_empty() {
        return;
    }
    match field {
        Field::Title => {
            if entry.title.is_empty() {
                entry.title = strip_html(&value);
            }
        }
        Field::Link => {
            if entry.link.is_empty() {
                entry.link = value;
            }
        }
        Field::Description => {
            if entry.description.is_empty() {
                entry.description = strip_html(&value);
            }
        }
        Field::Published => {
            if entry.published.is_none() {
                entry.published = Some(value);
            }
        }
        Field::Source => entry.source = Some(value),
    }
}

/// Downloads feeds over HTTP.
pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch and parse a feed.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<Feed> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(NewscastError::Feed(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        let body = response.text().await?;
        parse_feed(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Tech &amp; Science</title>
    <link>https://news.example</link>
    <item>
      <title>Fusion breakthrough</title>
      <link>https://news.example/fusion</link>
      <description><![CDATA[<p>Scientists report <b>net gain</b>.</p>]]></description>
      <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate>
      <source url="https://wire.example">Wire Service</source>
    </item>
    <item>
      <title>Rust 2024 edition &amp; more</title>
      <link>https://news.example/rust</link>
      <description>Plain text</description>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <entry>
    <title>Atom entry</title>
    <link rel="edit" href="https://atom.example/edit/1"/>
    <link rel="alternate" href="https://atom.example/1"/>
    <updated>2024-02-01T00:00:00Z</updated>
    <summary>Short summary</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss() {
        let feed = parse_feed(RSS).unwrap();
        assert_eq!(feed.title, "Tech & Science");
        assert_eq!(feed.entries.len(), 2);

        let first = &feed.entries[0];
        assert_eq!(first.title, "Fusion breakthrough");
        assert_eq!(first.link, "https://news.example/fusion");
        assert_eq!(first.description, "Scientists report net gain .");
        assert_eq!(first.published.as_deref(), Some("Mon, 01 Jan 2024 10:00:00 GMT"));
        assert_eq!(first.source.as_deref(), Some("Wire Service"));

        assert_eq!(feed.entries[1].title, "Rust 2024 edition & more");
        assert_eq!(feed.entries[1].published, None);
    }

    #[test]
    fn test_parse_atom_prefers_alternate_link() {
        let feed = parse_feed(ATOM).unwrap();
        assert_eq!(feed.title, "Example Atom");
        assert_eq!(feed.entries.len(), 1);
        let entry = &feed.entries[0];
        assert_eq!(entry.link, "https://atom.example/1");
        assert_eq!(entry.description, "Short summary");
        assert_eq!(entry.published.as_deref(), Some("2024-02-01T00:00:00Z"));
    }

    #[test]
    fn test_malformed_feed_is_an_error() {
        assert!(parse_feed("<rss><channel><item></channel></rss>").is_err());
    }
}
