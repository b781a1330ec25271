//! Background jobs in the `jobs` table.
//!
//! The web server enqueues, workers claim. Claiming is a single immediate
//! transaction, so several worker processes can share one database file.
//! Jobs of one session run strictly one at a time and in submission order.

mod worker;

pub use worker::{JobHandler, Tick, WorkerPool};

use crate::db::{format_ts, parse_ts, Database};
use crate::error::{NewscastError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// What a job does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    AgentChat {
        session_id: String,
        message: String,
    },
    GeneratePodcast {
        query: String,
        #[serde(default)]
        language: Option<String>,
    },
    FetchFeeds {
        urls: Vec<String>,
    },
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::AgentChat { .. } => "agent_chat",
            JobKind::GeneratePodcast { .. } => "generate_podcast",
            JobKind::FetchFeeds { .. } => "fetch_feeds",
        }
    }

    /// Session the job belongs to, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            JobKind::AgentChat { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub attempts: u32,
    pub max_retries: u32,
    pub worker: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

const COLUMNS: &str = "id, payload, status, result, error, attempts, max_retries, worker, \
                       created_at, started_at, finished_at";

struct JobRow {
    id: String,
    payload: String,
    status: String,
    result: Option<String>,
    error: Option<String>,
    attempts: i64,
    max_retries: i64,
    worker: Option<String>,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<JobRow> {
    Ok(JobRow {
        id: row.get(0)?,
        payload: row.get(1)?,
        status: row.get(2)?,
        result: row.get(3)?,
        error: row.get(4)?,
        attempts: row.get(5)?,
        max_retries: row.get(6)?,
        worker: row.get(7)?,
        created_at: row.get(8)?,
        started_at: row.get(9)?,
        finished_at: row.get(10)?,
    })
}

impl TryFrom<JobRow> for Job {
    type Error = NewscastError;

    fn try_from(row: JobRow) -> Result<Self> {
        let status = JobStatus::parse(&row.status)
            .ok_or_else(|| NewscastError::Queue(format!("Unknown job status '{}'", row.status)))?;
        let result = row
            .result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Job {
            id: row.id,
            kind: serde_json::from_str(&row.payload)?,
            status,
            result,
            error: row.error,
            attempts: row.attempts as u32,
            max_retries: row.max_retries as u32,
            worker: row.worker,
            created_at: parse_ts(&row.created_at),
            started_at: row.started_at.as_deref().map(parse_ts),
            finished_at: row.finished_at.as_deref().map(parse_ts),
        })
    }
}

/// Insert a queued job on `conn`, which may be inside a caller's transaction.
pub(crate) fn insert_job(conn: &Connection, kind: &JobKind, max_retries: u32) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO jobs (id, kind, session_id, payload, status, attempts, max_retries,
                           run_after_ms, created_at)
         VALUES (?1, ?2, ?3, ?4, 'queued', 0, ?5, ?6, ?7)",
        params![
            id,
            kind.name(),
            kind.session_id(),
            serde_json::to_string(kind)?,
            max_retries as i64,
            now.timestamp_millis(),
            format_ts(now),
        ],
    )?;

    debug!("Enqueued job {}", id);
    Ok(id)
}

pub struct JobQueue {
    db: Arc<Database>,
}

impl JobQueue {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Add a job; it becomes claimable immediately.
    #[instrument(skip(self, kind), fields(kind = kind.name()))]
    pub fn enqueue(&self, kind: &JobKind, max_retries: u32) -> Result<String> {
        let conn = self.db.conn()?;
        insert_job(&conn, kind, max_retries)
    }

    /// Claim the oldest runnable job for `worker`.
    pub fn claim(&self, worker: &str) -> Result<Option<Job>> {
        self.claim_at(worker, Utc::now().timestamp_millis())
    }

    pub(crate) fn claim_at(&self, worker: &str, now_ms: i64) -> Result<Option<Job>> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let id: Option<String> = tx
            .query_row(
                "SELECT j.id FROM jobs j
                 WHERE j.status = 'queued' AND j.run_after_ms <= ?1
                   AND (j.session_id IS NULL OR (
                        NOT EXISTS (SELECT 1 FROM jobs r
                                    WHERE r.session_id = j.session_id AND r.status = 'running')
                    AND NOT EXISTS (SELECT 1 FROM jobs o
                                    WHERE o.session_id = j.session_id AND o.status = 'queued'
                                      AND o.seq < j.seq)
                    AND NOT EXISTS (SELECT 1 FROM session_locks l
                                    WHERE l.session_id = j.session_id AND l.expires_at_ms > ?1)))
                 ORDER BY j.seq LIMIT 1",
                params![now_ms],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = id else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE jobs SET status = 'running', attempts = attempts + 1, worker = ?2,
                             started_at = ?3, finished_at = NULL
             WHERE id = ?1",
            params![id, worker, format_ts(Utc::now())],
        )?;

        let row = tx.query_row(
            &format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1"),
            params![id],
            read_row,
        )?;
        tx.commit()?;

        let job = Job::try_from(row)?;
        debug!("{} claimed job {} ({})", worker, job.id, job.kind.name());
        Ok(Some(job))
    }

    pub fn complete(&self, id: &str, result: &serde_json::Value) -> Result<()> {
        let conn = self.db.conn()?;
        let updated = conn.execute(
            "UPDATE jobs SET status = 'completed', result = ?2, error = NULL, finished_at = ?3
             WHERE id = ?1",
            params![id, serde_json::to_string(result)?, format_ts(Utc::now())],
        )?;
        if updated == 0 {
            return Err(NewscastError::NotFound(format!("job {}", id)));
        }
        Ok(())
    }

    /// Record a failure. The job is queued again while retries remain.
    pub fn fail(&self, id: &str, error: &str) -> Result<JobStatus> {
        let conn = self.db.conn()?;
        let (attempts, max_retries): (i64, i64) = conn
            .query_row(
                "SELECT attempts, max_retries FROM jobs WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| NewscastError::NotFound(format!("job {}", id)))?;

        let status = if attempts <= max_retries {
            JobStatus::Queued
        } else {
            JobStatus::Failed
        };
        let finished_at = status.is_finished().then(|| format_ts(Utc::now()));

        conn.execute(
            "UPDATE jobs SET status = ?2, error = ?3, worker = NULL, finished_at = ?4 WHERE id = ?1",
            params![id, status.as_str(), error, finished_at],
        )?;

        if status == JobStatus::Queued {
            info!("Job {} failed (attempt {}), retrying: {}", id, attempts, error);
        } else {
            warn!("Job {} failed: {}", id, error);
        }
        Ok(status)
    }

    /// Put a claimed job back without counting the attempt.
    pub fn defer(&self, id: &str, delay: Duration) -> Result<()> {
        let run_after = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let conn = self.db.conn()?;
        let updated = conn.execute(
            "UPDATE jobs SET status = 'queued', attempts = MAX(attempts - 1, 0), worker = NULL,
                             started_at = NULL, run_after_ms = ?2
             WHERE id = ?1",
            params![id, run_after],
        )?;
        if updated == 0 {
            return Err(NewscastError::NotFound(format!("job {}", id)));
        }
        debug!("Deferred job {} by {:?}", id, delay);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Job> {
        let conn = self.db.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1"),
                params![id],
                read_row,
            )
            .optional()?
            .ok_or_else(|| NewscastError::NotFound(format!("job {}", id)))?;
        Job::try_from(row)
    }

    /// Newest first, optionally filtered by status.
    pub fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM jobs WHERE ?1 IS NULL OR status = ?1 ORDER BY seq DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(
            params![status.map(|s| s.as_str()), limit as i64],
            read_row,
        )?;
        rows.map(|row| Job::try_from(row?)).collect()
    }

    /// Whether a session has a job waiting or running.
    pub fn session_busy(&self, session_id: &str) -> Result<bool> {
        let conn = self.db.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE session_id = ?1 AND status IN ('queued', 'running')",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    /// Re-queue running jobs whose worker vanished. Returns how many were reset.
    pub fn requeue_stale(&self, older_than: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| NewscastError::Queue(e.to_string()))?;
        let conn = self.db.conn()?;
        let reset = conn.execute(
            "UPDATE jobs SET status = 'queued', worker = NULL, started_at = NULL
             WHERE status = 'running' AND started_at < ?1",
            params![format_ts(cutoff)],
        )?;
        if reset > 0 {
            warn!("Re-queued {} stale jobs", reset);
        }
        Ok(reset)
    }
}
