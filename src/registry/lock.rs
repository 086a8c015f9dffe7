use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held for the duration of a registry build.
pub struct BuildGuard {
    _guard: Option<OwnedMutexGuard<()>>,
}

/// Serializes registry builds inside one process.
#[async_trait]
pub trait BuildLock: Send + Sync {
    async fn acquire(&self) -> BuildGuard;
}

/// Process-wide mutex for multi-threaded servers.
///
/// Not reentrant: a task holding the guard deadlocks if it acquires again.
/// Builds never call back into the cache (hooks only get a connection and the
/// model mapping), so nothing re-enters it.
#[derive(Debug, Clone, Default)]
pub struct ProcessLock {
    inner: Arc<Mutex<()>>,
}

impl ProcessLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BuildLock for ProcessLock {
    async fn acquire(&self) -> BuildGuard {
        BuildGuard {
            _guard: Some(self.inner.clone().lock_owned().await),
        }
    }
}

/// No exclusion at all, for single-threaded harnesses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLock;

#[async_trait]
impl BuildLock for NoopLock {
    async fn acquire(&self) -> BuildGuard {
        BuildGuard { _guard: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn process_lock_excludes_second_holder() {
        let lock = ProcessLock::new();
        let guard = lock.acquire().await;

        let contender = lock.clone();
        let blocked = tokio::time::timeout(Duration::from_millis(50), contender.acquire()).await;
        assert!(blocked.is_err());

        drop(guard);
        let acquired = tokio::time::timeout(Duration::from_secs(1), lock.acquire()).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn noop_lock_never_blocks() {
        let lock = NoopLock;
        let _first = lock.acquire().await;
        let _second = lock.acquire().await;
    }
}
