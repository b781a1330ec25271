//! Session persistence in the `sessions` and `session_messages` tables.

use super::{SessionState, Stage};
use crate::agent::{HistoryMessage, MessageRole};
use crate::db::{format_ts, parse_ts, Database};
use crate::error::{NewscastError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: Option<String>,
    pub stage: Stage,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for HistoryMessage {
    fn from(message: ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content,
        }
    }
}

pub struct SessionStore {
    db: Arc<Database>,
}

impl SessionStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Start a session in the initial state.
    #[instrument(skip(self))]
    pub fn create(&self) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            state: SessionState::default(),
            created_at: now,
            updated_at: now,
        };

        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO sessions (id, title, state_json, created_at, updated_at)
             VALUES (?1, NULL, ?2, ?3, ?3)",
            params![
                session.id,
                serde_json::to_string(&session.state)?,
                format_ts(now)
            ],
        )?;

        debug!("Created session {}", session.id);
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Result<Session> {
        let conn = self.db.conn()?;
        let row = conn
            .query_row(
                "SELECT state_json, created_at, updated_at FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let (state_json, created_at, updated_at) =
            row.ok_or_else(|| NewscastError::NotFound(format!("session {}", id)))?;

        Ok(Session {
            id: id.to_string(),
            state: serde_json::from_str(&state_json)?,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        })
    }

    pub fn save_state(&self, id: &str, state: &SessionState) -> Result<()> {
        let conn = self.db.conn()?;
        let updated = conn.execute(
            "UPDATE sessions SET state_json = ?2, title = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id,
                serde_json::to_string(state)?,
                state.title,
                format_ts(Utc::now())
            ],
        )?;
        if updated == 0 {
            return Err(NewscastError::NotFound(format!("session {}", id)));
        }
        Ok(())
    }

    /// Load, mutate and save a session's state.
    pub fn update<T>(&self, id: &str, f: impl FnOnce(&mut SessionState) -> T) -> Result<T> {
        let mut state = self.get(id)?.state;
        let out = f(&mut state);
        self.save_state(id, &state)?;
        Ok(out)
    }

    /// Most recently updated sessions first.
    pub fn list(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, state_json, updated_at FROM sessions ORDER BY updated_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, state_json, updated_at) = row?;
            let state: SessionState = serde_json::from_str(&state_json)?;
            sessions.push(SessionSummary {
                id,
                title: state.title,
                stage: state.stage,
                updated_at: parse_ts(&updated_at),
            });
        }
        Ok(sessions)
    }

    /// Delete a session and its messages.
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.db.conn()?;
        let deleted = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(NewscastError::NotFound(format!("session {}", id)));
        }
        Ok(())
    }

    pub fn append_message(&self, id: &str, role: MessageRole, content: &str) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO session_messages (session_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, role.as_str(), content, format_ts(Utc::now())],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                NewscastError::NotFound(format!("session {}", id))
            }
            other => other.into(),
        })?;
        Ok(())
    }

    /// The last `limit` messages, oldest first.
    pub fn history(&self, id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT role, content, created_at FROM (
                 SELECT id, role, content, created_at FROM session_messages
                 WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
             ) ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (role, content, created_at) = row?;
            let Some(role) = MessageRole::parse(&role) else {
                continue;
            };
            messages.push(ChatMessage {
                role,
                content,
                created_at: parse_ts(&created_at),
            });
        }
        Ok(messages)
    }
}
