//! Test plans: immutable trees of operations, as produced by a test file's
//! front end. Variable references have already been resolved and every
//! operation carries its expected result.

use crate::errinput;
use crate::error::Result;
use crate::expect::ExpectedResult;
use crate::types::{quote, Value};

use itertools::Itertools as _;
use std::path::PathBuf;
use std::time::Duration;

pub use log::Level as LogLevel;

/// A test plan: test operations followed by cleanup operations. Cleanup
/// operations always run, even if the test fails or is cancelled.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plan {
    test: Vec<Operation>,
    cleanup: Vec<Operation>,
}

impl Plan {
    /// Creates a plan. Cleanup operations (and their children) are tagged
    /// with the cleanup phase.
    pub fn new(test: Vec<Operation>, cleanup: Vec<Operation>) -> Self {
        let cleanup = cleanup.into_iter().map(|op| op.in_phase(Phase::Cleanup)).collect();
        Self { test, cleanup }
    }

    /// The test operations.
    pub fn test(&self) -> &[Operation] {
        &self.test
    }

    /// The cleanup operations.
    pub fn cleanup(&self) -> &[Operation] {
        &self.cleanup
    }

    /// Validates the plan, returning the first invalid operation.
    pub fn validate(&self) -> Result<()> {
        self.test.iter().chain(&self.cleanup).try_for_each(Operation::validate)
    }

    /// Tags all operations with the given phase.
    fn in_phase(self, phase: Phase) -> Self {
        let retag = |ops: Vec<Operation>| ops.into_iter().map(|op| op.in_phase(phase)).collect();
        match phase {
            Phase::Test => self,
            Phase::Cleanup => Self { test: retag(self.test), cleanup: self.cleanup },
        }
    }
}

/// The lifecycle phase an operation belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    /// Test operations stop once the test is cancelled.
    #[default]
    Test,
    /// Cleanup operations ignore cancellation and always run to completion.
    Cleanup,
}

/// An operation's source location.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Source {
    pub file: PathBuf,
    pub line: u32,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// An operation. Operations are immutable: the builder methods consume the
/// operation and return a new one.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    source: Source,
    description: String,
    phase: Phase,
    kind: OperationKind,
    expected: ExpectedResult,
}

impl Operation {
    /// Creates a test-phase operation expecting success, described by its
    /// kind.
    pub fn new(kind: OperationKind) -> Self {
        Self {
            source: Source::default(),
            description: kind.to_string(),
            phase: Phase::Test,
            kind,
            expected: ExpectedResult::default(),
        }
    }

    /// Creates a statement on the current connection.
    pub fn statement(sql: impl Into<String>) -> Self {
        Self::new(OperationKind::ServerStatement { sql: sql.into(), connection: None })
    }

    /// Sets the source location.
    pub fn at(self, file: impl Into<PathBuf>, line: u32) -> Self {
        Self { source: Source { file: file.into(), line }, ..self }
    }

    /// Sets the description, i.e. the command text as written.
    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self { description: description.into(), ..self }
    }

    /// Returns the operation with a different expected result.
    pub fn rewrite_with(self, expected: ExpectedResult) -> Self {
        Self { expected, ..self }
    }

    /// Tags the operation and any children with the given phase.
    fn in_phase(self, phase: Phase) -> Self {
        let retag = |ops: Vec<Operation>| ops.into_iter().map(|op| op.in_phase(phase)).collect();
        let kind = match self.kind {
            OperationKind::Loop { count, body } => OperationKind::Loop { count, body: retag(body) },
            OperationKind::CountedLoop { variable, count, body } => {
                OperationKind::CountedLoop { variable, count, body: retag(body) }
            }
            OperationKind::TimedLoop { duration, body } => {
                OperationKind::TimedLoop { duration, body: retag(body) }
            }
            OperationKind::Shuffle(body) => OperationKind::Shuffle(retag(body)),
            OperationKind::CreateThread { count, body } => {
                OperationKind::CreateThread { count, body: body.in_phase(phase) }
            }
            kind => kind,
        };
        Self { phase, kind, ..self }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn expected(&self) -> &ExpectedResult {
        &self.expected
    }

    /// Validates the operation and its children.
    pub fn validate(&self) -> Result<()> {
        let source = &self.source;
        match &self.kind {
            OperationKind::Sync { parties: 0, .. } => {
                errinput!("{source}: sync point must have at least one party")
            }
            OperationKind::CreateThread { count: 0, .. } => {
                errinput!("{source}: thread count must be positive")
            }
            OperationKind::Loop { count, .. } if *count < -1 => {
                errinput!("{source}: invalid loop count {count}")
            }
            OperationKind::Loop { body, .. }
            | OperationKind::CountedLoop { body, .. }
            | OperationKind::TimedLoop { body, .. }
            | OperationKind::Shuffle(body) => body.iter().try_for_each(Operation::validate),
            OperationKind::CreateThread { body, .. } => body.validate(),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.description)
    }
}

/// An operation kind.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationKind {
    /// Logs a message.
    Log { level: LogLevel, message: String },
    /// Sleeps, waking early if the test is cancelled.
    Sleep(Duration),
    /// Waits at a named rendezvous point until the given number of parties
    /// have arrived.
    Sync { name: String, parties: usize },
    /// Opens a named connection and makes it current.
    CreateConnection { name: String, url: Option<String> },
    /// Makes a named connection current.
    UseConnection(String),
    /// Closes a named connection.
    DropConnection(String),
    /// Sets ad-hoc options, used for connections created afterwards.
    SetOptions(Vec<(String, String)>),
    /// Unsets options.
    UnsetOptions(Vec<String>),
    /// Sets variables.
    SetVariables(Vec<(String, Value)>),
    /// Unsets variables.
    UnsetVariables(Vec<String>),
    /// Fails the test with a message.
    Fail(String),
    /// Executes a statement on the named or current connection.
    ServerStatement { sql: String, connection: Option<String> },
    /// Repeats the body a number of times, or forever if -1.
    Loop { count: i64, body: Vec<Operation> },
    /// Repeats the body a number of times, binding the 1-based iteration
    /// number to a variable.
    CountedLoop { variable: String, count: u64, body: Vec<Operation> },
    /// Repeats the body until the duration has elapsed.
    TimedLoop { duration: Duration, body: Vec<Operation> },
    /// Runs each body operation once, in random order.
    Shuffle(Vec<Operation>),
    /// Runs the body plan concurrently on a number of worker threads, and
    /// waits for them to finish.
    CreateThread { count: usize, body: Plan },
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Log { level, message } => write!(f, "LOG {level} {}", quote(message)),
            Self::Sleep(duration) => write!(f, "SLEEP {}", duration.as_millis()),
            Self::Sync { name, parties } => write!(f, "SYNC {name} {parties}"),
            Self::CreateConnection { name, url: Some(url) } => {
                write!(f, "CREATE CONNECTION {name} {}", quote(url))
            }
            Self::CreateConnection { name, url: None } => write!(f, "CREATE CONNECTION {name}"),
            Self::UseConnection(name) => write!(f, "USE CONNECTION {name}"),
            Self::DropConnection(name) => write!(f, "DROP CONNECTION {name}"),
            Self::SetOptions(options) => write!(
                f,
                "SET OPTIONS {}",
                options.iter().map(|(k, v)| format!("{k} = {}", quote(v))).join(", ")
            ),
            Self::UnsetOptions(names) => write!(f, "UNSET OPTIONS {}", names.join(", ")),
            Self::SetVariables(variables) => write!(
                f,
                "SET VARIABLES {}",
                variables.iter().map(|(k, v)| format!("{k} = {v}")).join(", ")
            ),
            Self::UnsetVariables(names) => write!(f, "UNSET VARIABLES {}", names.join(", ")),
            Self::Fail(message) => write!(f, "FAIL {}", quote(message)),
            Self::ServerStatement { sql, connection: Some(connection) } => {
                write!(f, "ON {connection} {sql}")
            }
            Self::ServerStatement { sql, connection: None } => write!(f, "{sql}"),
            Self::Loop { count: -1, .. } => write!(f, "LOOP FOREVER"),
            Self::Loop { count, .. } => write!(f, "LOOP {count}"),
            Self::CountedLoop { variable, count, .. } => write!(f, "LOOP {variable} {count}"),
            Self::TimedLoop { duration, .. } => write!(f, "LOOP FOR {}", duration.as_millis()),
            Self::Shuffle(_) => write!(f, "SHUFFLE"),
            Self::CreateThread { count, .. } => write!(f, "CREATE THREAD {count}"),
        }
    }
}
