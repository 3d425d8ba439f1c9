//! Per-session single-flight guard
//!
//! A session may have at most one turn in flight. A second turn that arrives
//! while the first is still running is rejected rather than queued, so the
//! caller never sees two transcripts diverge from the same starting point.

use crate::error::{ContextError, Result};
use crate::metrics::METRICS;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Registry of per-session locks
#[derive(Debug, Clone, Default)]
pub struct SessionLocks {
    locks: Arc<LockMap>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the session for one turn, or fail with `SessionBusy`
    pub fn try_acquire(&self, session_id: &str) -> Result<SessionGuard> {
        let lock = self.locks.entry(session_id.to_string()).or_default().clone();

        match lock.try_lock_owned() {
            Ok(guard) => {
                debug!("Acquired turn lock for session {}", session_id);
                Ok(SessionGuard {
                    session_id: session_id.to_string(),
                    guard: Some(guard),
                    locks: self.locks.clone(),
                })
            }
            Err(_) => {
                // `try_lock_owned` consumed our clone; the holder may have
                // released while it was still counted
                forget_if_idle(&self.locks, session_id);
                METRICS.record_session_conflict();
                Err(ContextError::SessionBusy(session_id.to_string()))
            }
        }
    }

    /// Whether a turn is currently running for `session_id`
    pub fn is_busy(&self, session_id: &str) -> bool {
        self.locks
            .get(session_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Number of sessions with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held for the duration of one turn; releases the session on drop
#[derive(Debug)]
pub struct SessionGuard {
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl SessionGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        forget_if_idle(&self.locks, &self.session_id);
        debug!("Released turn lock for session {}", self.session_id);
    }
}

/// Drop the entry once the map holds the only reference to its lock
fn forget_if_idle(locks: &LockMap, session_id: &str) {
    locks.remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_turn_rejected_while_first_runs() {
        let locks = SessionLocks::new();
        let guard = locks.try_acquire("session-1").unwrap();
        assert!(locks.is_busy("session-1"));

        let second = locks.try_acquire("session-1");
        assert!(matches!(second, Err(ContextError::SessionBusy(id)) if id == "session-1"));

        drop(guard);
        assert!(!locks.is_busy("session-1"));
        assert!(locks.try_acquire("session-1").is_ok());
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let locks = SessionLocks::new();
        let _a = locks.try_acquire("a").unwrap();
        let _b = locks.try_acquire("b").unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_turn_keeps_holder_entry() {
        let locks = SessionLocks::new();
        let guard = locks.try_acquire("session-1").unwrap();
        assert!(locks.try_acquire("session-1").is_err());
        assert_eq!(locks.len(), 1);
        assert!(locks.is_busy("session-1"));

        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_release_during_rejected_attempt_leaves_no_entry() {
        let locks = SessionLocks::new();
        let guard = locks.try_acquire("session-1").unwrap();

        // a competing turn has cloned the lock but not yet failed
        let in_flight = locks.locks.get("session-1").map(|lock| Arc::clone(lock.value())).unwrap();
        drop(guard);
        assert_eq!(locks.len(), 1);

        // the competing turn's failed attempt releases its clone, then cleans up
        drop(in_flight);
        forget_if_idle(&locks.locks, "session-1");
        assert!(locks.is_empty());
        assert!(!locks.is_busy("session-1"));
    }

    #[tokio::test]
    async fn test_entries_removed_after_release() {
        let locks = SessionLocks::new();
        {
            let guard = locks.try_acquire("short-lived").unwrap();
            assert_eq!(guard.session_id(), "short-lived");
        }
        assert!(locks.is_empty());
    }
}
