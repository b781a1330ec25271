//! Worker pool that drains the job queue.

use super::{Job, JobQueue};
use crate::config::QueueSettings;
use crate::error::Result;
use crate::session::SessionLocks;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Executes one job and returns its JSON result.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<serde_json::Value>;
}

/// What one poll of the queue did.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    Idle,
    Ran { job_id: String, ok: bool },
    Deferred { job_id: String },
}

pub struct WorkerPool {
    queue: Arc<JobQueue>,
    locks: Arc<SessionLocks>,
    handler: Arc<dyn JobHandler>,
    settings: QueueSettings,
    name: String,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<JobQueue>,
        locks: Arc<SessionLocks>,
        handler: Arc<dyn JobHandler>,
        settings: QueueSettings,
    ) -> Self {
        let name = format!("worker-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        Self {
            queue,
            locks,
            handler,
            settings,
            name,
        }
    }

    /// Claim and run at most one job as `worker`.
    pub async fn run_once(&self, worker: &str) -> Result<Tick> {
        let Some(job) = self.queue.claim(worker)? else {
            return Ok(Tick::Idle);
        };

        let session = job.kind.session_id().map(str::to_string);
        if let Some(session) = &session {
            let ttl = Duration::from_secs(self.settings.session_lock_seconds);
            if !self.locks.try_acquire(session, worker, ttl)? {
                info!("Session {} is locked, deferring job {}", session, job.id);
                self.queue
                    .defer(&job.id, Duration::from_millis(self.settings.locked_retry_ms))?;
                return Ok(Tick::Deferred { job_id: job.id });
            }
        }

        info!("{} running {} job {}", worker, job.kind.name(), job.id);
        let outcome = self.handler.handle(&job).await;

        let (ok, recorded) = match outcome {
            Ok(value) => (true, self.queue.complete(&job.id, &value)),
            Err(e) => (false, self.queue.fail(&job.id, &e.to_string()).map(|_| ())),
        };

        // The lock goes back even when the result could not be stored.
        if let Some(session) = &session {
            if let Err(e) = self.locks.release(session, worker) {
                warn!("Failed to release lock on session {}: {}", session, e);
            }
        }
        recorded?;

        Ok(Tick::Ran { job_id: job.id, ok })
    }

    async fn worker_loop(self: Arc<Self>, index: usize, mut shutdown: watch::Receiver<bool>) {
        let worker = format!("{}-{}", self.name, index);
        let idle = Duration::from_millis(self.settings.poll_interval_ms.max(10));
        info!("{} started", worker);

        while !*shutdown.borrow() {
            let tick = self.run_once(&worker).await;
            let sleep_for = match tick {
                Ok(Tick::Idle) | Ok(Tick::Deferred { .. }) => Some(idle),
                Ok(Tick::Ran { .. }) => None,
                Err(e) => {
                    error!("{} queue error: {}", worker, e);
                    Some(idle)
                }
            };

            if let Some(duration) = sleep_for {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }

        info!("{} stopped", worker);
    }

    /// Run `concurrency` workers until Ctrl-C. Running jobs finish first.
    pub async fn run(self: Arc<Self>, concurrency: usize) -> Result<()> {
        let stale = Duration::from_secs(self.settings.stale_after_seconds);
        self.queue.requeue_stale(stale)?;

        let (tx, rx) = watch::channel(false);
        let mut workers = JoinSet::new();
        for index in 0..concurrency.max(1) {
            workers.spawn(self.clone().worker_loop(index, rx.clone()));
        }
        info!("{} workers polling for jobs", concurrency.max(1));

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down, waiting for running jobs");
                let _ = tx.send(true);
            }
            _ = async { while workers.join_next().await.is_some() {} } => {
                return Ok(());
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::NewscastError;
    use crate::queue::{JobKind, JobStatus};

    struct EchoHandler;

    #[async_trait]
    impl JobHandler for EchoHandler {
        async fn handle(&self, job: &Job) -> Result<serde_json::Value> {
            match &job.kind {
                JobKind::AgentChat { message, .. } if message == "fail" => {
                    Err(NewscastError::Agent("handler failed".to_string()))
                }
                JobKind::AgentChat { message, .. } => Ok(serde_json::json!({ "echo": message })),
                other => Ok(serde_json::json!({ "kind": other.name() })),
            }
        }
    }

    fn pool() -> (WorkerPool, Arc<JobQueue>, Arc<SessionLocks>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let queue = Arc::new(JobQueue::new(db.clone()));
        let locks = Arc::new(SessionLocks::new(db));
        let pool = WorkerPool::new(
            queue.clone(),
            locks.clone(),
            Arc::new(EchoHandler),
            QueueSettings::default(),
        );
        (pool, queue, locks)
    }

    fn chat(session: &str, message: &str) -> JobKind {
        JobKind::AgentChat {
            session_id: session.to_string(),
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_run_once_completes_and_releases_lock() {
        let (pool, queue, locks) = pool();
        let id = queue.enqueue(&chat("s1", "hello"), 0).unwrap();

        let tick = pool.run_once("w1").await.unwrap();
        assert_eq!(tick, Tick::Ran { job_id: id.clone(), ok: true });

        let job = queue.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.unwrap()["echo"], "hello");
        assert!(!locks.is_locked("s1").unwrap());

        assert_eq!(pool.run_once("w1").await.unwrap(), Tick::Idle);
    }

    #[tokio::test]
    async fn test_handler_error_fails_job() {
        let (pool, queue, _) = pool();
        let id = queue.enqueue(&chat("s1", "fail"), 0).unwrap();

        let tick = pool.run_once("w1").await.unwrap();
        assert_eq!(tick, Tick::Ran { job_id: id.clone(), ok: false });
        let job = queue.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("handler failed"));
    }

    /// Deletes its own job row, so storing the result fails afterwards.
    struct VanishingHandler {
        db: Arc<Database>,
    }

    #[async_trait]
    impl JobHandler for VanishingHandler {
        async fn handle(&self, job: &Job) -> Result<serde_json::Value> {
            self.db
                .conn()?
                .execute("DELETE FROM jobs WHERE id = ?1", [&job.id])?;
            Ok(serde_json::json!({}))
        }
    }

    #[tokio::test]
    async fn test_lock_released_when_result_cannot_be_stored() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let queue = Arc::new(JobQueue::new(db.clone()));
        let locks = Arc::new(SessionLocks::new(db.clone()));
        let pool = WorkerPool::new(
            queue.clone(),
            locks.clone(),
            Arc::new(VanishingHandler { db }),
            QueueSettings::default(),
        );
        queue.enqueue(&chat("s1", "hello"), 0).unwrap();

        let err = pool.run_once("w1").await.unwrap_err();
        assert!(matches!(err, NewscastError::NotFound(_)));
        assert!(!locks.is_locked("s1").unwrap());
    }

    #[tokio::test]
    async fn test_jobs_without_session_need_no_lock() {
        let (pool, queue, _) = pool();
        let id = queue
            .enqueue(&JobKind::FetchFeeds { urls: Vec::new() }, 0)
            .unwrap();
        pool.run_once("w1").await.unwrap();
        assert_eq!(queue.get(&id).unwrap().result.unwrap()["kind"], "fetch_feeds");
    }
}
