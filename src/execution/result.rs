use crate::error::Error;
use crate::expect::Mismatch;
use crate::plan::{Operation, Source};

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A test's status. Terminal statuses can only be reached once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    NotStarted,
    InProgress,
    /// The plan was validated but not executed.
    Validated,
    Succeeded,
    Failed,
    Aborted,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Validated | Self::Succeeded | Self::Failed | Self::Aborted)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Validated => "VALIDATED",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
        })
    }
}

/// Details of a test failure: where it happened, and why.
#[derive(Clone, Debug, PartialEq)]
pub struct Failure {
    /// The failing operation's source, if any.
    pub source: Option<Source>,
    /// The failing operation's command text.
    pub command: String,
    /// A one-line comment on what went wrong.
    pub comment: String,
    /// The actual outcome, for mismatches.
    pub actual: Option<String>,
    /// The expected outcome, for mismatches.
    pub expected: Option<String>,
}

impl Failure {
    /// A failure without a source location.
    pub fn message(comment: impl Into<String>) -> Self {
        let comment = comment.into();
        Self { source: None, command: String::new(), comment, actual: None, expected: None }
    }

    /// A failure of the given operation.
    pub fn at(operation: &Operation, comment: impl Into<String>) -> Self {
        Self {
            source: Some(operation.source().clone()),
            command: operation.description().to_string(),
            ..Self::message(comment)
        }
    }

    /// An expected result mismatch of the given operation.
    pub fn mismatch(operation: &Operation, mismatch: Mismatch) -> Self {
        Self {
            actual: Some(mismatch.actual),
            expected: Some(mismatch.expected),
            ..Self::at(operation, mismatch.comment)
        }
    }
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        match error {
            Error::Mismatch(failure) => *failure,
            error => Self::message(error.to_string()),
        }
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Error::Mismatch(Box::new(failure))
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{source}: {}: ", self.command)?;
        }
        f.write_str(&self.comment)?;
        if let Some(actual) = &self.actual {
            write!(f, "\n  actual: {actual}")?;
        }
        if let Some(expected) = &self.expected {
            write!(f, "\n  expected: {expected}")?;
        }
        Ok(())
    }
}

/// A recorded outcome, to be written back into the test file at the given
/// source location.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Annotation {
    pub file: PathBuf,
    pub line: u32,
    pub text: String,
}

/// A summary of a test result, for result writers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    pub name: String,
    pub status: Status,
    pub duration: Duration,
    pub steps: u64,
    pub failure: Option<String>,
}

#[derive(Debug)]
struct State {
    status: Status,
    started: Option<Instant>,
    duration: Duration,
    failure: Option<Failure>,
}

/// The result of a test, shared by every thread executing it.
///
/// The status moves from NOT_STARTED to IN_PROGRESS and then to exactly one
/// terminal status. The first of mark_as_validated(), mark_as_succeeded(),
/// mark_as_failed() and abort_test() wins; later calls are no-ops that
/// return false, so concurrent threads can race to record an outcome.
#[derive(Debug)]
pub struct TestResult {
    name: String,
    state: Mutex<State>,
    steps: AtomicU64,
    annotations: Mutex<Vec<Annotation>>,
}

impl TestResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State {
                status: Status::NotStarted,
                started: None,
                duration: Duration::ZERO,
                failure: None,
            }),
            steps: AtomicU64::new(0),
            annotations: Mutex::new(Vec::new()),
        }
    }

    /// Locks the state. A panicking holder can't leave it inconsistent,
    /// so poisoning is ignored.
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts the test, capturing the start time. Returns false if the test
    /// was aborted before it started.
    ///
    /// # Panics
    ///
    /// Panics if the test has already been started.
    pub fn start(&self) -> bool {
        let mut state = self.state();
        if state.status == Status::Aborted {
            return false;
        }
        assert_eq!(state.status, Status::NotStarted, "test {} already started", self.name);
        state.status = Status::InProgress;
        state.started = Some(Instant::now());
        true
    }

    /// Marks the test as validated without executing it.
    pub fn mark_as_validated(&self) -> bool {
        self.finish(Status::Validated, None)
    }

    /// Marks the test as succeeded, unless it already finished.
    pub fn mark_as_succeeded(&self) -> bool {
        self.finish(Status::Succeeded, None)
    }

    /// Marks the test as failed, unless it already finished.
    pub fn mark_as_failed(&self, failure: Failure) -> bool {
        self.finish(Status::Failed, Some(failure))
    }

    /// Marks the test as aborted, unless it already finished.
    pub fn abort_test(&self) -> bool {
        self.finish(Status::Aborted, Some(Failure::message("aborted")))
    }

    /// Latches a terminal status, returning false if one was already set.
    fn finish(&self, status: Status, failure: Option<Failure>) -> bool {
        let mut state = self.state();
        if state.status.is_terminal() {
            return false;
        }
        Self::transition(&mut state, status, failure);
        true
    }

    fn transition(state: &mut State, status: Status, failure: Option<Failure>) {
        assert!(!state.status.is_terminal(), "terminal status {} already set", state.status);
        assert!(status.is_terminal(), "{status} is not a terminal status");
        state.status = status;
        state.duration = state.started.map(|started| started.elapsed()).unwrap_or_default();
        state.failure = failure;
    }

    /// Adds executed steps.
    pub fn add_steps(&self, steps: u64) {
        self.steps.fetch_add(steps, Ordering::Relaxed);
    }

    /// Returns the number of executed steps.
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> Status {
        self.state().status
    }

    /// Returns the execution time, which is zero until the test finishes.
    pub fn duration(&self) -> Duration {
        self.state().duration
    }

    pub fn failure(&self) -> Option<Failure> {
        self.state().failure.clone()
    }

    /// Records an annotation.
    pub fn annotate(&self, annotation: Annotation) {
        self.annotations.lock().unwrap_or_else(PoisonError::into_inner).push(annotation);
    }

    /// Returns the recorded annotations, ordered by file and line.
    pub fn annotations(&self) -> Vec<Annotation> {
        let mut annotations =
            self.annotations.lock().unwrap_or_else(PoisonError::into_inner).clone();
        annotations.sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));
        annotations
    }

    /// Returns a report of the result.
    pub fn report(&self) -> Report {
        let state = self.state();
        Report {
            name: self.name.clone(),
            status: state.status,
            duration: state.duration,
            steps: self.steps(),
            failure: state.failure.as_ref().map(|f| f.to_string()),
        }
    }
}
