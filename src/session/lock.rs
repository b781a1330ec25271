//! Advisory per-session lock with expiry.
//!
//! Workers take the lock before running a session's job so two workers never
//! process the same conversation at once. A lock left behind by a crashed
//! worker expires and can then be taken over.

use crate::db::Database;
use crate::error::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct SessionLocks {
    db: Arc<Database>,
}

impl SessionLocks {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Take or refresh the lock. Returns false when another owner holds an unexpired lock.
    pub fn try_acquire(&self, session_id: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.try_acquire_at(session_id, owner, ttl, Utc::now().timestamp_millis())
    }

    pub(crate) fn try_acquire_at(
        &self,
        session_id: &str,
        owner: &str,
        ttl: Duration,
        now_ms: i64,
    ) -> Result<bool> {
        let expires_at = now_ms + ttl.as_millis() as i64;
        let conn = self.db.conn()?;
        let changed = conn.execute(
            "INSERT INTO session_locks (session_id, owner, expires_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE
                SET owner = excluded.owner, expires_at_ms = excluded.expires_at_ms
                WHERE session_locks.expires_at_ms <= ?4 OR session_locks.owner = excluded.owner",
            params![session_id, owner, expires_at, now_ms],
        )?;

        let acquired = changed == 1;
        debug!(
            "Lock for session {} {} by {}",
            session_id,
            if acquired { "taken" } else { "refused" },
            owner
        );
        Ok(acquired)
    }

    /// Release the lock if `owner` holds it; otherwise a no-op.
    pub fn release(&self, session_id: &str, owner: &str) -> Result<bool> {
        let conn = self.db.conn()?;
        let deleted = conn.execute(
            "DELETE FROM session_locks WHERE session_id = ?1 AND owner = ?2",
            params![session_id, owner],
        )?;
        Ok(deleted == 1)
    }

    /// Run `work` while holding the session lock.
    ///
    /// Returns `None` without running it when another owner holds the lock.
    pub async fn with_lock<F, T>(
        &self,
        session_id: &str,
        owner: &str,
        ttl: Duration,
        work: F,
    ) -> Result<Option<T>>
    where
        F: Future<Output = T>,
    {
        if !self.try_acquire(session_id, owner, ttl)? {
            return Ok(None);
        }
        let value = work.await;
        if let Err(e) = self.release(session_id, owner) {
            warn!("Failed to release lock for session {}: {}", session_id, e);
        }
        Ok(Some(value))
    }

    pub fn is_locked(&self, session_id: &str) -> Result<bool> {
        Ok(self.holder(session_id)?.is_some())
    }

    /// Current owner of an unexpired lock.
    pub fn holder(&self, session_id: &str) -> Result<Option<String>> {
        let conn = self.db.conn()?;
        let owner = conn
            .query_row(
                "SELECT owner FROM session_locks WHERE session_id = ?1 AND expires_at_ms > ?2",
                params![session_id, Utc::now().timestamp_millis()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    fn locks() -> SessionLocks {
        SessionLocks::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    #[test]
    fn test_second_owner_refused_until_release() {
        let locks = locks();
        assert!(locks.try_acquire("s1", "worker-1", TTL).unwrap());
        assert!(!locks.try_acquire("s1", "worker-2", TTL).unwrap());
        assert!(locks.is_locked("s1").unwrap());
        assert_eq!(locks.holder("s1").unwrap().as_deref(), Some("worker-1"));

        assert!(locks.release("s1", "worker-1").unwrap());
        assert!(!locks.is_locked("s1").unwrap());
        assert!(locks.try_acquire("s1", "worker-2", TTL).unwrap());
    }

    #[test]
    fn test_release_by_non_owner_is_noop() {
        let locks = locks();
        locks.try_acquire("s1", "worker-1", TTL).unwrap();
        assert!(!locks.release("s1", "worker-2").unwrap());
        assert!(locks.is_locked("s1").unwrap());
    }

    #[test]
    fn test_expired_lock_can_be_taken_over() {
        let locks = locks();
        let now = 1_000_000;
        assert!(locks.try_acquire_at("s1", "worker-1", Duration::from_secs(10), now).unwrap());
        assert!(!locks.try_acquire_at("s1", "worker-2", TTL, now + 9_999).unwrap());
        assert!(locks.try_acquire_at("s1", "worker-2", TTL, now + 10_000).unwrap());
    }

    #[test]
    fn test_owner_refreshes_expiry() {
        let locks = locks();
        let now = 1_000_000;
        locks.try_acquire_at("s1", "worker-1", Duration::from_secs(10), now).unwrap();
        assert!(locks.try_acquire_at("s1", "worker-1", Duration::from_secs(10), now + 5_000).unwrap());
        // Refreshed to now + 15s, so still held at now + 12s.
        assert!(!locks.try_acquire_at("s1", "worker-2", TTL, now + 12_000).unwrap());
    }

    #[tokio::test]
    async fn test_with_lock_holds_then_releases() {
        let locks = locks();
        let held = locks
            .with_lock("s1", "cli-1", TTL, async { locks.holder("s1").unwrap() })
            .await
            .unwrap();
        assert_eq!(held, Some(Some("cli-1".to_string())));
        assert!(!locks.is_locked("s1").unwrap());
    }

    #[tokio::test]
    async fn test_with_lock_skips_busy_session() {
        let locks = locks();
        locks.try_acquire("s1", "worker-1", TTL).unwrap();
        let mut ran = false;
        let result = locks
            .with_lock("s1", "cli-1", TTL, async { ran = true })
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(!ran);
        assert_eq!(locks.holder("s1").unwrap().as_deref(), Some("worker-1"));
    }

    #[test]
    fn test_locks_are_per_session() {
        let locks = locks();
        assert!(locks.try_acquire("s1", "worker-1", TTL).unwrap());
        assert!(locks.try_acquire("s2", "worker-2", TTL).unwrap());
    }
}
