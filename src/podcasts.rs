//! Generated episodes in the `podcasts` table.

use crate::db::{format_ts, parse_ts, Database};
use crate::error::{NewscastError, Result};
use crate::script::PodcastScript;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

/// A stored episode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Podcast {
    pub id: String,
    pub title: String,
    pub query: Option<String>,
    pub session_id: Option<String>,
    pub language_code: String,
    pub tts_engine: String,
    pub audio_path: PathBuf,
    pub duration_secs: Option<f64>,
    pub script: PodcastScript,
    pub sources: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when an episode is created.
#[derive(Debug, Clone)]
pub struct NewPodcast {
    pub title: String,
    pub query: Option<String>,
    pub session_id: Option<String>,
    pub language_code: String,
    pub tts_engine: String,
    pub audio_path: PathBuf,
    pub duration_secs: Option<f64>,
    pub script: PodcastScript,
}

const COLUMNS: &str = "id, title, query, session_id, language_code, tts_engine, audio_path, \
                       script_json, sources_json, created_at, duration_secs";

fn read_row(row: &Row<'_>) -> rusqlite::Result<(Podcast, String, String)> {
    let podcast = Podcast {
        id: row.get(0)?,
        title: row.get(1)?,
        query: row.get(2)?,
        session_id: row.get(3)?,
        language_code: row.get(4)?,
        tts_engine: row.get(5)?,
        audio_path: PathBuf::from(row.get::<_, String>(6)?),
        duration_secs: row.get(10)?,
        script: PodcastScript::default(),
        sources: Vec::new(),
        created_at: parse_ts(&row.get::<_, String>(9)?),
    };
    Ok((podcast, row.get(7)?, row.get(8)?))
}

fn finish((mut podcast, script_json, sources_json): (Podcast, String, String)) -> Result<Podcast> {
    podcast.script = serde_json::from_str(&script_json)?;
    podcast.sources = serde_json::from_str(&sources_json)?;
    Ok(podcast)
}

pub struct PodcastStore {
    db: Arc<Database>,
}

impl PodcastStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, new), fields(title = %new.title))]
    pub fn insert(&self, new: NewPodcast) -> Result<Podcast> {
        let podcast = Podcast {
            id: uuid::Uuid::new_v4().to_string(),
            sources: new.script.sources.clone(),
            title: new.title,
            query: new.query,
            session_id: new.session_id,
            language_code: new.language_code,
            tts_engine: new.tts_engine,
            audio_path: new.audio_path,
            duration_secs: new.duration_secs,
            script: new.script,
            created_at: Utc::now(),
        };

        let conn = self.db.conn()?;
        conn.execute(
            &format!("INSERT INTO podcasts ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            params![
                podcast.id,
                podcast.title,
                podcast.query,
                podcast.session_id,
                podcast.language_code,
                podcast.tts_engine,
                podcast.audio_path.to_string_lossy(),
                serde_json::to_string(&podcast.script)?,
                serde_json::to_string(&podcast.sources)?,
                format_ts(podcast.created_at),
                podcast.duration_secs,
            ],
        )?;

        info!("Stored podcast {} ({})", podcast.id, podcast.title);
        Ok(podcast)
    }

    pub fn get(&self, id: &str) -> Result<Podcast> {
        let conn = self.db.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM podcasts WHERE id = ?1"),
                params![id],
                read_row,
            )
            .optional()?;
        match row {
            Some(row) => finish(row),
            None => Err(NewscastError::NotFound(format!("podcast {}", id))),
        }
    }

    /// Newest first.
    pub fn list(&self, limit: usize, offset: usize) -> Result<Vec<Podcast>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM podcasts ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], read_row)?;
        rows.map(|row| finish(row?)).collect()
    }

    /// Delete the row. The audio file is left for the caller to remove.
    pub fn delete(&self, id: &str) -> Result<Podcast> {
        let podcast = self.get(id)?;
        let conn = self.db.conn()?;
        conn.execute("DELETE FROM podcasts WHERE id = ?1", params![id])?;
        Ok(podcast)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.db.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM podcasts", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Dialog, Section};

    fn store() -> PodcastStore {
        PodcastStore::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    fn new_podcast(title: &str) -> NewPodcast {
        NewPodcast {
            title: title.to_string(),
            query: Some("fusion".to_string()),
            session_id: None,
            language_code: "en".to_string(),
            tts_engine: "edge".to_string(),
            audio_path: PathBuf::from("/tmp/podcast.mp3"),
            duration_secs: Some(93.5),
            script: PodcastScript {
                title: title.to_string(),
                sections: vec![Section {
                    kind: "intro".to_string(),
                    title: None,
                    dialog: vec![Dialog {
                        speaker: "ALEX".to_string(),
                        text: "Hello".to_string(),
                    }],
                }],
                sources: vec!["https://a.example".to_string()],
            },
        }
    }

    #[test]
    fn test_insert_and_get() {
        let store = store();
        let created = store.insert(new_podcast("Fusion Weekly")).unwrap();
        let loaded = store.get(&created.id).unwrap();
        assert_eq!(loaded.id, created.id);
        assert_eq!(loaded.title, "Fusion Weekly");
        assert_eq!(loaded.audio_path, PathBuf::from("/tmp/podcast.mp3"));
        assert_eq!(loaded.sources, vec!["https://a.example"]);
        assert_eq!(loaded.duration_secs, Some(93.5));
        assert_eq!(loaded.script.sections[0].dialog[0].text, "Hello");
    }

    #[test]
    fn test_list_newest_first_with_offset() {
        let store = store();
        store.insert(new_podcast("first")).unwrap();
        store.insert(new_podcast("second")).unwrap();
        store.insert(new_podcast("third")).unwrap();

        let page = store.list(2, 0).unwrap();
        assert_eq!(page[0].title, "third");
        assert_eq!(page[1].title, "second");
        assert_eq!(store.list(10, 2).unwrap()[0].title, "first");
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_delete_and_missing() {
        let store = store();
        let created = store.insert(new_podcast("gone")).unwrap();
        store.delete(&created.id).unwrap();
        assert!(matches!(store.get(&created.id), Err(NewscastError::NotFound(_))));
        assert!(matches!(store.delete("nope"), Err(NewscastError::NotFound(_))));
    }
}
