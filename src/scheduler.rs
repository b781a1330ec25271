//! Periodic tasks that enqueue jobs.
//!
//! Tasks live in `scheduled_tasks`; the scheduler process polls for due tasks,
//! enqueues their job and pushes `next_run` forward by the interval.

use crate::db::{format_ts, from_millis, Database};
use crate::error::{NewscastError, Result};
use crate::queue::{insert_job, JobKind};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

const MIN_POLL_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    pub kind: JobKind,
    pub interval_secs: u64,
    pub enabled: bool,
    pub next_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
}

/// Request body for creating a task.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub kind: JobKind,
    pub interval_secs: u64,
    /// First run; defaults to now.
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
}

const COLUMNS: &str = "id, name, job_json, interval_secs, enabled, next_run_ms, last_run_ms";

fn read_row(row: &Row<'_>) -> rusqlite::Result<(ScheduledTask, String)> {
    let task = ScheduledTask {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: JobKind::FetchFeeds { urls: Vec::new() },
        interval_secs: row.get::<_, i64>(3)? as u64,
        enabled: row.get(4)?,
        next_run: from_millis(row.get(5)?),
        last_run: row.get::<_, Option<i64>>(6)?.map(from_millis),
    };
    Ok((task, row.get(2)?))
}

fn finish((mut task, job_json): (ScheduledTask, String)) -> Result<ScheduledTask> {
    task.kind = serde_json::from_str(&job_json)?;
    Ok(task)
}

pub struct ScheduleStore {
    db: Arc<Database>,
}

impl ScheduleStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn add(&self, new: NewTask) -> Result<ScheduledTask> {
        if new.interval_secs == 0 {
            return Err(NewscastError::InvalidInput(
                "interval_secs must be positive".to_string(),
            ));
        }
        if new.name.trim().is_empty() {
            return Err(NewscastError::InvalidInput("Task name is empty".to_string()));
        }

        let task = ScheduledTask {
            id: uuid::Uuid::new_v4().to_string(),
            name: new.name.trim().to_string(),
            kind: new.kind,
            interval_secs: new.interval_secs,
            enabled: true,
            next_run: new.start_at.unwrap_or_else(Utc::now),
            last_run: None,
        };

        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO scheduled_tasks
             (id, name, job_json, interval_secs, enabled, next_run_ms, last_run_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, NULL, ?6)",
            params![
                task.id,
                task.name,
                serde_json::to_string(&task.kind)?,
                task.interval_secs as i64,
                task.next_run.timestamp_millis(),
                format_ts(Utc::now()),
            ],
        )?;

        info!("Scheduled '{}' every {}s", task.name, task.interval_secs);
        Ok(task)
    }

    pub fn list(&self) -> Result<Vec<ScheduledTask>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM scheduled_tasks ORDER BY next_run_ms"
        ))?;
        let rows = stmt.query_map([], read_row)?;
        rows.map(|row| finish(row?)).collect()
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        let conn = self.db.conn()?;
        let deleted = conn.execute("DELETE FROM scheduled_tasks WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(NewscastError::NotFound(format!("scheduled task {}", id)));
        }
        Ok(())
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let conn = self.db.conn()?;
        let updated = conn.execute(
            "UPDATE scheduled_tasks SET enabled = ?2 WHERE id = ?1",
            params![id, enabled],
        )?;
        if updated == 0 {
            return Err(NewscastError::NotFound(format!("scheduled task {}", id)));
        }
        Ok(())
    }

    /// Enabled tasks whose next run is at or before `now`.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>> {
        due_on(&*self.db.conn()?, now)
    }

    /// Record a run at `now`; the next run is `now + interval`.
    pub fn mark_run(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        mark_run_on(&*self.db.conn()?, id, now)
    }

    /// Enqueue a job for every due task and reschedule it, atomically.
    ///
    /// The immediate transaction serializes concurrent schedulers, so a task
    /// fires once per interval however many of them poll.
    pub fn fire_due(&self, now: DateTime<Utc>) -> Result<Vec<(ScheduledTask, String)>> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut fired = Vec::new();
        for task in due_on(&tx, now)? {
            let job_id = insert_job(&tx, &task.kind, 0)?;
            mark_run_on(&tx, &task.id, now)?;
            fired.push((task, job_id));
        }
        tx.commit()?;
        Ok(fired)
    }
}

fn due_on(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM scheduled_tasks
         WHERE enabled = 1 AND next_run_ms <= ?1 ORDER BY next_run_ms"
    ))?;
    let rows = stmt.query_map(params![now.timestamp_millis()], read_row)?;
    rows.map(|row| finish(row?)).collect()
}

fn mark_run_on(conn: &Connection, id: &str, now: DateTime<Utc>) -> Result<()> {
    let updated = conn.execute(
        "UPDATE scheduled_tasks
         SET last_run_ms = ?2, next_run_ms = ?2 + interval_secs * 1000
         WHERE id = ?1",
        params![id, now.timestamp_millis()],
    )?;
    if updated == 0 {
        return Err(NewscastError::NotFound(format!("scheduled task {}", id)));
    }
    Ok(())
}

pub struct Scheduler {
    store: Arc<ScheduleStore>,
    poll: Duration,
}

impl Scheduler {
    pub fn new(store: Arc<ScheduleStore>, poll_secs: u64) -> Self {
        Self {
            store,
            poll: Duration::from_secs(poll_secs.max(MIN_POLL_SECS)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll
    }

    /// Enqueue every due task. Returns the enqueued job ids.
    #[instrument(skip(self))]
    pub fn tick(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let fired = self.store.fire_due(now)?;
        for (task, job_id) in &fired {
            info!("Task '{}' enqueued job {}", task.name, job_id);
        }
        Ok(fired.into_iter().map(|(_, job_id)| job_id).collect())
    }

    /// Tick until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        info!("Scheduler polling every {:?}", self.poll);
        let mut interval = tokio::time::interval(self.poll);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()) {
                        error!("Scheduler tick failed: {}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Scheduler stopped");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{JobQueue, JobStatus};

    fn setup() -> (Scheduler, Arc<ScheduleStore>, Arc<JobQueue>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = Arc::new(ScheduleStore::new(db.clone()));
        let queue = Arc::new(JobQueue::new(db));
        (Scheduler::new(store.clone(), 1), store, queue)
    }

    fn feeds_task(start: DateTime<Utc>) -> NewTask {
        NewTask {
            name: "morning feeds".to_string(),
            kind: JobKind::FetchFeeds {
                urls: vec!["https://example.com/rss".to_string()],
            },
            interval_secs: 3600,
            start_at: Some(start),
        }
    }

    #[test]
    fn test_poll_interval_has_minimum() {
        let (scheduler, _, _) = setup();
        assert_eq!(scheduler.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_tick_enqueues_due_tasks_and_reschedules() {
        let (scheduler, store, queue) = setup();
        let now = Utc::now();
        let task = store.add(feeds_task(now)).unwrap();
        store
            .add(feeds_task(now + chrono::Duration::hours(2)))
            .unwrap();

        let jobs = scheduler.tick(now).unwrap();
        assert_eq!(jobs.len(), 1);
        let job = queue.get(&jobs[0]).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.kind.name(), "fetch_feeds");

        let reloaded = store
            .list()
            .unwrap()
            .into_iter()
            .find(|t| t.id == task.id)
            .unwrap();
        assert_eq!(
            reloaded.next_run.timestamp_millis(),
            now.timestamp_millis() + 3_600_000
        );
        assert_eq!(
            reloaded.last_run.map(|t| t.timestamp_millis()),
            Some(now.timestamp_millis())
        );

        assert!(scheduler.tick(now).unwrap().is_empty());
    }

    #[test]
    fn test_two_schedulers_fire_a_task_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("newscast.db");
        let first_db = Arc::new(Database::open(&path).unwrap());
        let second_db = Arc::new(Database::open(&path).unwrap());
        let store = Arc::new(ScheduleStore::new(first_db.clone()));
        let first = Scheduler::new(store.clone(), 5);
        let second = Scheduler::new(Arc::new(ScheduleStore::new(second_db)), 5);

        let now = Utc::now();
        store.add(feeds_task(now)).unwrap();

        let (a, b) = std::thread::scope(|s| {
            let a = s.spawn(|| first.tick(now).unwrap());
            let b = s.spawn(|| second.tick(now).unwrap());
            (a.join().unwrap(), b.join().unwrap())
        });
        assert_eq!(a.len() + b.len(), 1);
        assert_eq!(JobQueue::new(first_db).list(None, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_disabled_tasks_are_not_due() {
        let (scheduler, store, _) = setup();
        let now = Utc::now();
        let task = store.add(feeds_task(now)).unwrap();
        store.set_enabled(&task.id, false).unwrap();
        assert!(scheduler.tick(now).unwrap().is_empty());
    }

    #[test]
    fn test_validation_and_remove() {
        let (_, store, _) = setup();
        let mut bad = feeds_task(Utc::now());
        bad.interval_secs = 0;
        assert!(matches!(store.add(bad), Err(NewscastError::InvalidInput(_))));

        let task = store.add(feeds_task(Utc::now())).unwrap();
        store.remove(&task.id).unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(matches!(store.remove(&task.id), Err(NewscastError::NotFound(_))));
    }

    #[test]
    fn test_new_task_json() {
        let new: NewTask = serde_json::from_str(
            r#"{"name": "daily", "interval_secs": 86400,
                "kind": {"kind": "generate_podcast", "query": "AI news"}}"#,
        )
        .unwrap();
        assert!(new.start_at.is_none());
        assert_eq!(new.kind.name(), "generate_podcast");
    }
}
