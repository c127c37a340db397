//! The capability set the harness requires from a database client. The
//! harness doesn't implement a client itself; any driver that can execute a
//! statement and report rows, update counts, warnings and errors will do.

use crate::types::Row;

use itertools::Itertools as _;
use std::collections::BTreeMap;

/// A database driver, which opens connections to the system under test.
/// Drivers are shared by all threads of a test.
pub trait Driver: Send + Sync {
    /// Opens a named connection. If no URL is given, the driver's default
    /// target is used. Options are the test's current ad-hoc options.
    fn connect(
        &self,
        name: &str,
        url: Option<&str>,
        options: &BTreeMap<String, String>,
    ) -> Result<Box<dyn Connection>, DriverError>;
}

/// A live connection. Connections are used by one thread at a time.
pub trait Connection: Send {
    /// Executes a statement.
    fn execute(&mut self, statement: &str) -> Result<Response, DriverError>;

    /// Closes the connection. Errors are ignored.
    fn close(&mut self) {}
}

/// A successful statement response, with any warnings raised by the
/// statement itself.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub result: StatementResult,
    pub warnings: Vec<Warning>,
}

impl Response {
    /// Creates a response without warnings.
    pub fn new(result: StatementResult) -> Self {
        Self { result, warnings: Vec::new() }
    }

    /// Attaches statement warnings.
    pub fn with_warnings(self, warnings: Vec<Warning>) -> Self {
        Self { warnings, ..self }
    }
}

impl From<StatementResult> for Response {
    fn from(result: StatementResult) -> Self {
        Self::new(result)
    }
}

/// The shape of a successful statement result.
#[derive(Clone, Debug, PartialEq)]
pub enum StatementResult {
    /// A tabular result, from a query.
    Rows(ResultSet),
    /// An update count, from a mutation.
    Count(u64),
    /// Neither rows nor a count, e.g. from DDL.
    Ok,
}

/// A tabular result.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Warnings raised while fetching the rows.
    pub warnings: Vec<Warning>,
}

impl ResultSet {
    /// Creates a result set without warnings.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows, warnings: Vec::new() }
    }
}

/// A non-fatal driver warning.
#[derive(Clone, Debug, PartialEq)]
pub struct Warning {
    pub code: i64,
    pub message: String,
}

impl Warning {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A driver error, carrying the error code and message reported by the
/// system under test (or the client itself, e.g. on connection failure).
#[derive(Clone, Debug, PartialEq)]
pub struct DriverError {
    pub code: i64,
    pub message: String,
}

impl DriverError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl std::error::Error for DriverError {}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "error {}: {}", self.code, self.message)
    }
}

/// Formats a warning chain as a bracketed list.
pub fn format_warnings(warnings: &[Warning]) -> String {
    format!("[{}]", warnings.iter().join(", "))
}
