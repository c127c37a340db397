use super::barrier::Barrier;
use super::pool::ThreadPool;
use super::result::{Annotation, Failure, TestResult};
use crate::config::Config;
use crate::driver::{Connection, Driver, DriverError};
use crate::errinternal;
use crate::error::{Error, Result};
use crate::types::Value;

use log::{debug, error, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom as _;
use rand::SeedableRng as _;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// The name of the connection opened before a test starts.
pub const DEFAULT_CONNECTION: &str = "default";

/// A connection handle, shared by a context and the contexts forked from it.
pub type SharedConnection = Arc<Mutex<Box<dyn Connection>>>;

/// State shared by every thread of a test.
struct Shared {
    config: Arc<Config>,
    driver: Arc<dyn Driver>,
    result: Arc<TestResult>,
    barriers: Mutex<HashMap<String, Arc<Barrier>>>,
    pool: ThreadPool,
    /// Whether test operations should continue. Cleared on failure, abort
    /// or when the test phase ends, and never set again.
    testing: Mutex<bool>,
    /// Notified when testing stops.
    cleanup: Condvar,
    rng: Mutex<StdRng>,
}

/// Locks a mutex, ignoring poisoning. Used for state that a panicking
/// holder can't leave inconsistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The execution context of a single thread of a test.
///
/// The primary thread's context is created with new(), and worker threads
/// get a fork() of their spawning thread's context. Barriers, the worker
/// pool, the cancellation flag, the RNG and the test result are shared by
/// all forks. The connections, variables and options are copied into the
/// fork, so each thread can change them without affecting others, but the
/// inherited connections themselves are shared. Connections a context
/// opens are its own, and are closed when it's dropped.
pub struct ExecutionContext {
    shared: Arc<Shared>,
    connections: HashMap<String, SharedConnection>,
    owned: HashSet<String>,
    current: Option<String>,
    /// Variables, keyed by lowercase name, with the name as written.
    variables: HashMap<String, (String, Value)>,
    options: BTreeMap<String, String>,
    /// Steps executed since the last flush.
    steps: u64,
}

impl ExecutionContext {
    /// Creates the primary context of a test.
    pub fn new(config: Arc<Config>, driver: Arc<dyn Driver>, result: Arc<TestResult>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let shared = Shared {
            pool: ThreadPool::new(config.max_threads),
            config,
            driver,
            result,
            barriers: Mutex::default(),
            testing: Mutex::new(true),
            cleanup: Condvar::new(),
            rng: Mutex::new(rng),
        };
        Self {
            shared: Arc::new(shared),
            connections: HashMap::new(),
            owned: HashSet::new(),
            current: None,
            variables: HashMap::new(),
            options: BTreeMap::new(),
            steps: 0,
        }
    }

    /// Forks the context for a worker thread.
    pub fn fork(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            connections: self.connections.clone(),
            owned: HashSet::new(),
            current: self.current.clone(),
            variables: self.variables.clone(),
            options: self.options.clone(),
            steps: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn result(&self) -> &Arc<TestResult> {
        &self.shared.result
    }

    pub(super) fn pool(&self) -> &ThreadPool {
        &self.shared.pool
    }

    /// Returns true if test operations should continue.
    pub fn continue_testing(&self) -> bool {
        *lock(&self.shared.testing)
    }

    /// Stops testing, waking any threads waiting for cleanup.
    pub fn stop_testing(&self) {
        *lock(&self.shared.testing) = false;
        self.shared.cleanup.notify_all();
    }

    /// Waits until testing stops or the timeout expires. Returns true if
    /// testing has stopped.
    pub fn wait_for_cleanup(&self, timeout: Duration) -> bool {
        let testing = lock(&self.shared.testing);
        let (testing, _) = self
            .shared
            .cleanup
            .wait_timeout_while(testing, timeout, |testing| *testing)
            .unwrap_or_else(PoisonError::into_inner);
        !*testing
    }

    /// Records a test failure and stops testing. Only the first failure is
    /// recorded.
    pub fn mark_as_failed(&self, error: Error) {
        let failure = Failure::from(error);
        let result = self.result();
        match result.mark_as_failed(failure.clone()) {
            true => error!("Test {} failed: {failure}", result.name()),
            false => debug!("Test {} already finished, ignoring failure: {failure}", result.name()),
        }
        self.stop_testing();
    }

    /// Records test success, unless the test already finished.
    pub fn mark_as_succeeded(&self) -> bool {
        self.result().mark_as_succeeded()
    }

    /// Returns a handle that can abort the test from another thread.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle { shared: self.shared.clone() }
    }

    /// Opens a named connection and makes it current, replacing any
    /// connection with the same name.
    pub fn connect(
        &mut self,
        name: &str,
        url: Option<&str>,
    ) -> std::result::Result<(), DriverError> {
        let connection = self.shared.driver.connect(name, url, &self.options)?;
        self.drop_connection(name);
        self.connections.insert(name.to_string(), Arc::new(Mutex::new(connection)));
        self.owned.insert(name.to_string());
        self.current = Some(name.to_string());
        Ok(())
    }

    /// Makes a named connection current. Returns false if it doesn't exist.
    pub fn use_connection(&mut self, name: &str) -> bool {
        if !self.connections.contains_key(name) {
            return false;
        }
        self.current = Some(name.to_string());
        true
    }

    /// Removes a named connection, closing it if this context opened it.
    /// Returns false if it doesn't exist.
    pub fn drop_connection(&mut self, name: &str) -> bool {
        let Some(connection) = self.connections.remove(name) else {
            return false;
        };
        if self.owned.remove(name) {
            lock(&connection).close();
        }
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        true
    }

    /// Returns the named connection, or the current one if no name is
    /// given. An unknown name yields None, while a missing current
    /// connection is an internal error.
    pub fn connection(&self, name: Option<&str>) -> Result<Option<SharedConnection>> {
        if let Some(name) = name {
            return Ok(self.connections.get(name).cloned());
        }
        let Some(current) = &self.current else {
            return errinternal!("no current connection");
        };
        match self.connections.get(current) {
            Some(connection) => Ok(Some(connection.clone())),
            None => errinternal!("current connection {current} not found"),
        }
    }

    /// Returns the current connection's name.
    pub fn current_connection(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Sets a variable. Names are case-insensitive.
    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_lowercase(), (name.to_string(), value));
    }

    /// Unsets a variable, returning false if it wasn't set.
    pub fn unset_variable(&mut self, name: &str) -> bool {
        self.variables.remove(&name.to_lowercase()).is_some()
    }

    /// Returns a variable's value.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(&name.to_lowercase()).map(|(_, value)| value)
    }

    /// Sets an option, used for connections opened afterwards.
    pub fn set_option(&mut self, name: &str, value: &str) {
        self.options.insert(name.to_string(), value.to_string());
    }

    /// Unsets an option, returning false if it wasn't set.
    pub fn unset_option(&mut self, name: &str) -> bool {
        self.options.remove(name).is_some()
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    /// Returns the named barrier, creating it for the given number of
    /// parties if it doesn't exist yet.
    pub fn barrier(&self, name: &str, parties: usize) -> Arc<Barrier> {
        let mut barriers = lock(&self.shared.barriers);
        let barrier =
            barriers.entry(name.to_string()).or_insert_with(|| Arc::new(Barrier::new(parties)));
        if barrier.parties() != parties {
            warn!("Sync point {name} has {} parties, ignoring {parties}", barrier.parties());
        }
        barrier.clone()
    }

    /// Counts an executed step.
    pub fn add_step(&mut self) {
        self.steps += 1;
    }

    /// Adds the steps executed since the last flush to the test result.
    pub fn flush_steps(&mut self) {
        self.shared.result.add_steps(std::mem::take(&mut self.steps));
    }

    /// Records an annotation on the test result.
    pub fn annotate(&self, annotation: Annotation) {
        self.shared.result.annotate(annotation)
    }

    /// Shuffles items using the test's random number generator.
    pub fn shuffle<T>(&self, items: &mut [T]) {
        items.shuffle(&mut *lock(&self.shared.rng));
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.flush_steps();
        for name in std::mem::take(&mut self.owned) {
            if let Some(connection) = self.connections.remove(&name) {
                lock(&connection).close();
            }
        }
    }
}

/// Aborts a running test from another thread: latches the ABORTED status,
/// rejects new worker threads and cancels test operations. Operations
/// already executing are not interrupted.
#[derive(Clone)]
pub struct AbortHandle {
    shared: Arc<Shared>,
}

impl AbortHandle {
    pub fn abort(&self) {
        let result = &self.shared.result;
        if result.abort_test() {
            warn!("Test {} aborted", result.name());
        }
        self.shared.pool.shutdown();
        *lock(&self.shared.testing) = false;
        self.shared.cleanup.notify_all();
    }
}
