use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{Scope, ScopedJoinHandle};

/// A bounded pool of worker threads. Workers are scoped threads, so they can
/// borrow from the spawning thread, and each holds one of a fixed number of
/// slots for its lifetime. Submissions beyond the capacity, or after
/// shutdown, are rejected rather than queued.
#[derive(Debug)]
pub struct ThreadPool {
    capacity: usize,
    active: Arc<AtomicUsize>,
    shutdown: AtomicBool,
}

/// A reserved worker slot, released when dropped.
struct Slot(Arc<AtomicUsize>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ThreadPool {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, active: Arc::default(), shutdown: AtomicBool::new(false) }
    }

    /// Spawns a named worker in the given scope, or returns a rejection
    /// message if no slot is available.
    pub fn spawn<'scope, 'env, F, T>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        name: String,
        f: F,
    ) -> Result<ScopedJoinHandle<'scope, T>, String>
    where
        F: FnOnce() -> T + Send + 'scope,
        T: Send + 'scope,
    {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err("thread pool is shut down".to_string());
        }
        let capacity = self.capacity;
        if self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < capacity).then_some(n + 1))
            .is_err()
        {
            return Err(format!("thread pool exhausted, {capacity} threads active"));
        }
        let slot = Slot(self.active.clone());
        std::thread::Builder::new()
            .name(name)
            .spawn_scoped(scope, move || {
                let _slot = slot;
                f()
            })
            .map_err(|err| format!("failed to spawn thread: {err}"))
    }

    /// Returns the number of active workers.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Rejects all further submissions. Active workers are unaffected.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
