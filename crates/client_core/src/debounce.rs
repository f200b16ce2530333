//! Keyed debounce: bursts of intent collapse into one action after a quiet
//! period.
//!
//! At most one timer is pending per key. Re-scheduling a key aborts the pending
//! timer and restarts the delay, so only the last-scheduled action ever runs.
//! Timers and running actions are bound to the scheduler's cancellation token;
//! once the owner shuts the scheduler down nothing fires.

use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

struct PendingAction {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct DebounceScheduler<K> {
    pending: Arc<Mutex<HashMap<K, PendingAction>>>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

impl<K> Default for DebounceScheduler<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl<K> DebounceScheduler<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// The scheduler stops when `shutdown` (or any parent of it) is cancelled.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            shutdown,
        }
    }

    /// Schedules `action` to run after `delay`, replacing any pending action
    /// for `key`. Returns `true` when a pending action was superseded.
    pub async fn schedule<F, Fut>(&self, key: K, delay: Duration, action: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.pending.lock().await;
        let superseded = guard
            .remove(&key)
            .map(|previous| previous.handle.abort())
            .is_some();

        if self.shutdown.is_cancelled() {
            return superseded;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let pending = Arc::clone(&self.pending);
        let shutdown = self.shutdown.clone();
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            {
                let mut guard = pending.lock().await;
                match guard.get(&task_key) {
                    Some(entry) if entry.generation == generation => {
                        guard.remove(&task_key);
                    }
                    _ => return,
                }
            }

            if shutdown.is_cancelled() {
                return;
            }
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = action() => {}
            }
        });

        guard.insert(key, PendingAction { generation, handle });
        superseded
    }

    /// Drops the pending action for `key`, if any.
    pub async fn cancel(&self, key: &K) -> bool {
        let mut guard = self.pending.lock().await;
        match guard.remove(key) {
            Some(previous) => {
                previous.handle.abort();
                true
            }
            None => false,
        }
    }

    pub async fn is_pending(&self, key: &K) -> bool {
        self.pending.lock().await.contains_key(key)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Cancels every pending timer and any action still running. The scheduler
    /// accepts no further work afterwards.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut guard = self.pending.lock().await;
        for (_, previous) in guard.drain() {
            previous.handle.abort();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl<K> Drop for DebounceScheduler<K> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[path = "tests/debounce_tests.rs"]
mod tests;
