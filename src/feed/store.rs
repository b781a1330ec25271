//! Archive of feed articles in the `articles` table.

use super::FeedEntry;
use crate::db::{format_ts, parse_ts, Database};
use crate::error::{NewscastError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// A stored article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub description: String,
    pub source: Option<String>,
    pub feed_url: Option<String>,
    pub published: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl Article {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let fetched_at: String = row.get(7)?;
        Ok(Self {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            source: row.get(4)?,
            feed_url: row.get(5)?,
            published: row.get(6)?,
            fetched_at: parse_ts(&fetched_at),
        })
    }
}

const COLUMNS: &str = "id, url, title, description, source, feed_url, published, fetched_at";

pub struct ArticleStore {
    db: Arc<Database>,
}

impl ArticleStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store entries, ignoring URLs already archived. Returns the number inserted.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub fn insert_entries(&self, feed_url: Option<&str>, entries: &[FeedEntry]) -> Result<usize> {
        let conn = self.db.conn()?;
        let tx = conn.unchecked_transaction()?;
        let now = format_ts(Utc::now());
        let mut inserted = 0;

        for entry in entries.iter().filter(|e| !e.link.is_empty()) {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO articles
                 (url, title, description, source, feed_url, published, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.link,
                    entry.title,
                    entry.description,
                    entry.source,
                    feed_url,
                    entry.published,
                    now,
                ],
            )?;
        }

        tx.commit()?;
        info!("Archived {} new articles", inserted);
        Ok(inserted)
    }

    /// Most recently fetched articles first.
    pub fn list(&self, limit: usize, offset: usize) -> Result<Vec<Article>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM articles ORDER BY fetched_at DESC, id DESC LIMIT ?1 OFFSET ?2",
            COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], Article::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get(&self, id: i64) -> Result<Article> {
        let conn = self.db.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM articles WHERE id = ?1", COLUMNS),
            params![id],
            Article::from_row,
        )
        .optional()?
        .ok_or_else(|| NewscastError::NotFound(format!("article {}", id)))
    }

    /// Case-insensitive substring match on title and description.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Article>> {
        let pattern = format!("%{}%", escape_like(query.trim()));
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM articles
             WHERE title LIKE ?1 ESCAPE '\\' OR description LIKE ?1 ESCAPE '\\'
             ORDER BY fetched_at DESC, id DESC LIMIT ?2",
            COLUMNS
        ))?;
        let rows = stmt.query_map(params![pattern, limit as i64], Article::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.db.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
