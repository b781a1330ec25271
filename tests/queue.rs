//! Integration tests for the job queue, session locks and worker pool.

use async_trait::async_trait;
use newscast::config::QueueSettings;
use newscast::db::Database;
use newscast::error::{NewscastError, Result};
use newscast::queue::{Job, JobHandler, JobKind, JobQueue, JobStatus, Tick, WorkerPool};
use newscast::scheduler::{NewTask, ScheduleStore, Scheduler};
use newscast::session::SessionLocks;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

fn chat(session: &str, message: &str) -> JobKind {
    JobKind::AgentChat {
        session_id: session.to_string(),
        message: message.to_string(),
    }
}

fn stores() -> (Arc<Database>, Arc<JobQueue>, Arc<SessionLocks>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let queue = Arc::new(JobQueue::new(db.clone()));
    let locks = Arc::new(SessionLocks::new(db.clone()));
    (db, queue, locks)
}

/// Records the order messages were handled in; "flaky" fails on the first try.
#[derive(Default)]
struct RecordingHandler {
    seen: std::sync::Mutex<Vec<String>>,
    flaky_calls: AtomicUsize,
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn handle(&self, job: &Job) -> Result<Value> {
        let JobKind::AgentChat { message, .. } = &job.kind else {
            return Ok(json!({ "kind": job.kind.name() }));
        };
        if message == "flaky" && self.flaky_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(NewscastError::Agent("temporary failure".to_string()));
        }
        self.seen.lock().unwrap().push(message.clone());
        Ok(json!({ "response": format!("done: {}", message) }))
    }
}

#[test]
fn test_session_jobs_run_one_at_a_time_in_order() {
    let (_, queue, _) = stores();
    let first = queue.enqueue(&chat("s1", "one"), 0).unwrap();
    let second = queue.enqueue(&chat("s1", "two"), 0).unwrap();
    let other = queue.enqueue(&chat("s2", "other"), 0).unwrap();

    let a = queue.claim("w1").unwrap().unwrap();
    assert_eq!(a.id, first);

    // s1 is busy, so the next claim skips ahead to s2.
    let b = queue.claim("w2").unwrap().unwrap();
    assert_eq!(b.id, other);
    assert!(queue.claim("w3").unwrap().is_none());

    queue.complete(&first, &json!({})).unwrap();
    let c = queue.claim("w3").unwrap().unwrap();
    assert_eq!(c.id, second);
}

#[test]
fn test_locked_session_is_not_claimed() {
    let (_, queue, locks) = stores();
    assert!(locks
        .try_acquire("s1", "someone-else", Duration::from_secs(60))
        .unwrap());

    queue.enqueue(&chat("s1", "hello"), 0).unwrap();
    assert!(queue.claim("w1").unwrap().is_none());

    assert!(locks.release("s1", "someone-else").unwrap());
    assert!(queue.claim("w1").unwrap().is_some());
}

#[test]
fn test_lock_ownership() {
    let (_, _, locks) = stores();
    let ttl = Duration::from_secs(60);

    assert!(assert_ok!(locks.try_acquire("s1", "a", ttl)));
    assert!(!assert_ok!(locks.try_acquire("s1", "b", ttl)));
    assert!(locks.try_acquire("s1", "a", ttl).unwrap());
    assert_eq!(locks.holder("s1").unwrap().as_deref(), Some("a"));

    assert!(!locks.release("s1", "b").unwrap());
    assert!(locks.release("s1", "a").unwrap());
    assert!(!locks.is_locked("s1").unwrap());
}

#[tokio::test]
async fn test_worker_drains_queue_in_session_order() {
    let (_, queue, locks) = stores();
    let handler = Arc::new(RecordingHandler::default());
    let pool = WorkerPool::new(
        queue.clone(),
        locks.clone(),
        handler.clone(),
        QueueSettings::default(),
    );

    let ids: Vec<String> = ["one", "two", "three"]
        .iter()
        .map(|m| queue.enqueue(&chat("s1", m), 0).unwrap())
        .collect();

    for id in &ids {
        let tick = pool.run_once("w1").await.unwrap();
        assert_eq!(
            tick,
            Tick::Ran {
                job_id: id.clone(),
                ok: true
            }
        );
    }
    assert_eq!(pool.run_once("w1").await.unwrap(), Tick::Idle);

    assert_eq!(*handler.seen.lock().unwrap(), vec!["one", "two", "three"]);
    for id in &ids {
        assert_eq!(queue.get(id).unwrap().status, JobStatus::Completed);
    }
    assert!(!locks.is_locked("s1").unwrap());
}

#[tokio::test]
async fn test_failed_job_is_retried_when_allowed() {
    let (_, queue, locks) = stores();
    let handler = Arc::new(RecordingHandler::default());
    let pool = WorkerPool::new(queue.clone(), locks, handler, QueueSettings::default());

    let id = queue.enqueue(&chat("s1", "flaky"), 1).unwrap();

    let tick = pool.run_once("w1").await.unwrap();
    assert_eq!(
        tick,
        Tick::Ran {
            job_id: id.clone(),
            ok: false
        }
    );
    assert_eq!(queue.get(&id).unwrap().status, JobStatus::Queued);

    pool.run_once("w1").await.unwrap();
    let job = queue.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 2);
    assert_eq!(job.result.unwrap()["response"], "done: flaky");
}

#[tokio::test]
async fn test_scheduled_task_flows_to_worker() {
    let (db, queue, locks) = stores();
    let store = Arc::new(ScheduleStore::new(db));
    let scheduler = Scheduler::new(store.clone(), 60);
    let pool = WorkerPool::new(
        queue.clone(),
        locks,
        Arc::new(RecordingHandler::default()),
        QueueSettings::default(),
    );

    store
        .add(NewTask {
            name: "feeds".to_string(),
            kind: JobKind::FetchFeeds {
                urls: vec!["https://news.example/rss".to_string()],
            },
            interval_secs: 600,
            start_at: None,
        })
        .unwrap();

    let enqueued = scheduler.tick(chrono::Utc::now()).unwrap();
    assert_eq!(enqueued.len(), 1);

    pool.run_once("w1").await.unwrap();
    let job = queue.get(&enqueued[0]).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result.unwrap()["kind"], "fetch_feeds");
}
