use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// The result of waiting at a barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrierWait {
    /// All parties arrived.
    Released,
    /// This party timed out, breaking the barrier for everyone waiting.
    TimedOut,
    /// Another party timed out while this one was waiting, or the barrier
    /// was already broken on arrival.
    Broken,
}

/// A barrier generation. Each release or reset starts a new generation.
#[derive(Debug, Default)]
struct Generation {
    broken: AtomicBool,
}

#[derive(Debug)]
struct State {
    generation: Arc<Generation>,
    arrived: usize,
}

/// A reusable rendezvous barrier with timeouts. Once all parties arrive they
/// are released together and the barrier resets for the next round.
///
/// If a party times out, the current generation is broken: waiting parties
/// return Broken, as do later arrivals, until one of them resets the barrier
/// with reset_if_broken(). Only the first caller resets it, so parties that
/// race to reset don't discard each other's arrivals.
#[derive(Debug)]
pub struct Barrier {
    parties: usize,
    state: Mutex<State>,
    cvar: Condvar,
}

impl Barrier {
    /// Creates a barrier for the given number of parties (at least 1).
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            state: Mutex::new(State { generation: Arc::default(), arrived: 0 }),
            cvar: Condvar::new(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Locks the state. Poisoning is ignored, since the state is updated
    /// atomically under the lock.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until all parties have arrived, or the timeout expires.
    pub fn wait(&self, timeout: Duration) -> BarrierWait {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        let generation = state.generation.clone();
        if generation.broken.load(Ordering::SeqCst) {
            return BarrierWait::Broken;
        }

        state.arrived += 1;
        if state.arrived >= self.parties {
            state.generation = Arc::default();
            state.arrived = 0;
            self.cvar.notify_all();
            return BarrierWait::Released;
        }

        loop {
            if generation.broken.load(Ordering::SeqCst) {
                return BarrierWait::Broken;
            }
            if !Arc::ptr_eq(&generation, &state.generation) {
                return BarrierWait::Released;
            }
            let now = Instant::now();
            if now >= deadline {
                generation.broken.store(true, Ordering::SeqCst);
                self.cvar.notify_all();
                return BarrierWait::TimedOut;
            }
            state = self
                .cvar
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Resets a broken barrier, starting a new generation. Returns false if
    /// the barrier isn't broken, e.g. because another party already reset it.
    pub fn reset_if_broken(&self) -> bool {
        let mut state = self.lock();
        if !state.generation.broken.load(Ordering::SeqCst) {
            return false;
        }
        state.generation = Arc::default();
        state.arrived = 0;
        true
    }

    /// Returns true if the current generation is broken.
    pub fn is_broken(&self) -> bool {
        self.lock().generation.broken.load(Ordering::SeqCst)
    }
}
