//! Runs a sequence of test plans, one at a time, collecting their results.

use crate::config::Config;
use crate::driver::Driver;
use crate::execution::{AbortHandle, Engine, Failure, Status, TestResult};
use crate::plan::Plan;

use log::{error, info};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Interrupts a run from another thread, e.g. a signal handler. The running
/// test is aborted, as is every test started afterwards.
#[derive(Clone, Default)]
pub struct Interrupt {
    interrupted: Arc<AtomicBool>,
    current: Arc<Mutex<Option<AbortHandle>>>,
}

impl Interrupt {
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        if let Some(handle) = self.current.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            handle.abort();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Registers the running test's abort handle, or clears it.
    fn set_current(&self, handle: Option<AbortHandle>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = handle;
    }
}

/// Runs test plans against a driver.
pub struct Runner {
    config: Arc<Config>,
    driver: Arc<dyn Driver>,
    results: Vec<Arc<TestResult>>,
    interrupt: Interrupt,
}

impl Runner {
    pub fn new(config: Config, driver: Arc<dyn Driver>) -> Self {
        let config = Arc::new(config);
        Self { config, driver, results: Vec::new(), interrupt: Interrupt::default() }
    }

    /// Returns a handle that interrupts the run.
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Validates and executes a plan, returning its result. A plan that
    /// fails validation is not executed.
    pub fn run(&mut self, name: &str, file: &Path, plan: &Plan) -> Arc<TestResult> {
        let result = self.add(name);
        if let Err(err) = plan.validate() {
            error!("Test {name} ({}) is invalid: {err}", file.display());
            result.mark_as_failed(Failure::from(err));
            return result;
        }

        let engine = Engine::new(self.config.clone(), self.driver.clone(), result.clone());
        self.interrupt.set_current(Some(engine.abort_handle()));
        // Checked after registering, so an interrupt can't slip in between.
        if self.interrupt.is_interrupted() {
            engine.abort_handle().abort();
        }
        info!("Running test {name} from {}", file.display());
        engine.execute(plan);
        self.interrupt.set_current(None);
        result
    }

    /// Validates a plan without executing it.
    pub fn validate(&mut self, name: &str, file: &Path, plan: &Plan) -> Arc<TestResult> {
        let result = self.add(name);
        info!("Validating test {name} from {}", file.display());
        match plan.validate() {
            Ok(()) => {
                result.mark_as_validated();
            }
            Err(err) => {
                error!("Test {name} ({}) is invalid: {err}", file.display());
                result.mark_as_failed(Failure::from(err));
            }
        }
        result
    }

    fn add(&mut self, name: &str) -> Arc<TestResult> {
        let result = Arc::new(TestResult::new(name));
        self.results.push(result.clone());
        result
    }

    /// Returns the results of all tests so far, in run order.
    pub fn results(&self) -> &[Arc<TestResult>] {
        &self.results
    }

    /// Summarizes the results of all tests so far.
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for result in &self.results {
            summary.tests += 1;
            match result.status() {
                Status::Succeeded => summary.succeeded += 1,
                Status::Failed => summary.failed += 1,
                Status::Aborted => summary.aborted += 1,
                Status::Validated => summary.validated += 1,
                Status::NotStarted | Status::InProgress => {}
            }
            summary.steps += result.steps();
            summary.duration += result.duration();
        }
        summary
    }
}

/// Aggregate results of a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    pub tests: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub aborted: usize,
    pub validated: usize,
    pub steps: u64,
    pub duration: Duration,
}

impl Summary {
    /// Returns true if no test failed or was aborted.
    pub fn passed(&self) -> bool {
        self.failed == 0 && self.aborted == 0
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} tests: {} succeeded, {} failed, {} aborted, {} validated ({} steps in {:.3}s)",
            self.tests,
            self.succeeded,
            self.failed,
            self.aborted,
            self.validated,
            self.steps,
            self.duration.as_secs_f64()
        )
    }
}
