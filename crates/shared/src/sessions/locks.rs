use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

const PRUNE_THRESHOLD: usize = 1024;

/// Serializes request cycles that share a session id.
#[derive(Clone, Default)]
pub struct SessionLocks {
    inner: Arc<Mutex<HashMap<Uuid, Weak<AsyncMutex<()>>>>>,
}

pub type SessionGuard = OwnedMutexGuard<()>;

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other request holds `session_id`, then holds it until the guard drops.
    pub async fn acquire(&self, session_id: Uuid) -> SessionGuard {
        let lock = self.lock_for(session_id);
        lock.lock_owned().await
    }

    fn lock_for(&self, session_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(existing) = locks.get(&session_id).and_then(Weak::upgrade) {
            return existing;
        }

        if locks.len() >= PRUNE_THRESHOLD {
            locks.retain(|_, lock| lock.strong_count() > 0);
        }

        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(session_id, Arc::downgrade(&lock));
        lock
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner
            .lock()
            .map(|locks| locks.values().filter(|lock| lock.strong_count() > 0).count())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;
    use uuid::Uuid;

    use super::SessionLocks;

    #[tokio::test]
    async fn second_acquire_waits_for_first_guard() {
        let locks = SessionLocks::new();
        let session_id = Uuid::new_v4();

        let guard = locks.acquire(session_id).await;
        let blocked = timeout(Duration::from_millis(50), locks.acquire(session_id)).await;
        assert!(blocked.is_err(), "same session should be serialized");

        drop(guard);
        let reacquired = timeout(Duration::from_millis(50), locks.acquire(session_id)).await;
        assert!(reacquired.is_ok(), "lock should be free after guard drop");
    }

    #[tokio::test]
    async fn different_sessions_do_not_contend() {
        let locks = SessionLocks::new();
        let _first = locks.acquire(Uuid::new_v4()).await;
        let second = timeout(Duration::from_millis(50), locks.acquire(Uuid::new_v4())).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn released_locks_are_not_retained() {
        let locks = SessionLocks::new();
        let guard = locks.acquire(Uuid::new_v4()).await;
        assert_eq!(locks.tracked(), 1);
        drop(guard);
        assert_eq!(locks.tracked(), 0);
    }
}
