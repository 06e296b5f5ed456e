//! A named FD-budget pool (§3, GLOSSARY "Pool"). Grounded on
//! `original_source/opm/scanner.py`'s `defer.DeferredSemaphore`, carried
//! over as a `tokio::sync::Semaphore`; `vajra-orchestrator` showed the
//! same named-resource-pool shape for its worker slots.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

/// A bounded pool of concurrent probe slots, identified by name in config
/// (`pools: {name: size}`, §6).
pub struct Pool {
    name: String,
    semaphore: Arc<Semaphore>,
    queued: AtomicUsize,
}

impl Pool {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            semaphore: Arc::new(Semaphore::new(size)),
            queued: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Free tokens right now (`cmd_stats`'s "N free", §4.3).
    pub fn free(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Callers currently blocked waiting for a token (`cmd_stats`'s
    /// "N queued", §4.3).
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    /// Wait for a free slot. Held until the returned permit is dropped.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        if let Ok(permit) = self.semaphore.try_acquire() {
            metrics::gauge!("opm_pool_free", "pool" => self.name.clone())
                .set(self.free() as f64);
            return permit;
        }
        self.queued.fetch_add(1, Ordering::Relaxed);
        metrics::gauge!("opm_pool_queued", "pool" => self.name.clone())
            .set(self.queued() as f64);
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("pool semaphore is never closed");
        self.queued.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!("opm_pool_queued", "pool" => self.name.clone())
            .set(self.queued() as f64);
        metrics::gauge!("opm_pool_free", "pool" => self.name.clone())
            .set(self.free() as f64);
        permit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_blocks_past_capacity() {
        let pool = Pool::new("onepool", 1);
        let _first = pool.acquire().await;
        assert_eq!(pool.semaphore.available_permits(), 0);
    }

    #[test]
    fn name_is_preserved() {
        let pool = Pool::new("dns", 4);
        assert_eq!(pool.name(), "dns");
        assert_eq!(pool.size(), 4);
    }

    #[tokio::test]
    async fn queued_tracks_blocked_waiters() {
        let pool = Arc::new(Pool::new("onepool", 1));
        let _first = pool.acquire().await;
        assert_eq!(pool.queued(), 0);

        let waiter_pool = Arc::clone(&pool);
        let waiter = tokio::spawn(async move {
            let _permit = waiter_pool.acquire().await;
        });
        tokio::task::yield_now().await;
        assert_eq!(pool.free(), 0);
        assert_eq!(pool.queued(), 1);

        drop(_first);
        waiter.await.unwrap();
        assert_eq!(pool.queued(), 0);
    }
}
