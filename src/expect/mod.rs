//! Expected results, and verification of actual outcomes against them.
//!
//! Every operation carries an expected result. When an operation has run,
//! its actual outcome is dispatched to exactly one handler of the expected
//! result, chosen by the shape of the outcome (rows, update count, error,
//! warnings, bare success or application failure), not by what was
//! expected. Each handler either accepts the outcome or returns a comment
//! describing why it mismatched, which is combined with renderings of the
//! actual and expected outcomes into a [`Mismatch`].

pub mod render;

use crate::compare::{closest, ExpectedRow};
use crate::driver::{DriverError, Response, ResultSet, StatementResult, Warning};
use crate::types::{quote, Row};

use itertools::Itertools as _;

/// The number of closest candidates listed when a row can't be matched.
const CLOSEST_CANDIDATES: usize = 3;

/// The actual outcome of an operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// A tabular result.
    Rows(ResultSet),
    /// An update count.
    Count(u64),
    /// A driver error.
    Error(DriverError),
    /// A successful statement that raised warnings.
    Warning { warnings: Vec<Warning>, result: StatementResult },
    /// Bare success.
    Success,
    /// An application-level failure without a driver error, e.g. a reference
    /// to an unknown connection or a rejected thread submission.
    Failure(String),
}

impl From<StatementResult> for Outcome {
    fn from(result: StatementResult) -> Self {
        match result {
            StatementResult::Rows(rs) => Self::Rows(rs),
            StatementResult::Count(count) => Self::Count(count),
            StatementResult::Ok => Self::Success,
        }
    }
}

impl From<std::result::Result<Response, DriverError>> for Outcome {
    fn from(response: std::result::Result<Response, DriverError>) -> Self {
        match response {
            Ok(Response { result, warnings }) if !warnings.is_empty() => {
                Self::Warning { warnings, result }
            }
            Ok(Response { result, .. }) => result.into(),
            Err(error) => Self::Error(error),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Rows(rs) => write!(f, "rows: {}", render::rows(&rs.rows)),
            Self::Count(count) => write!(f, "affected: {count}"),
            Self::Error(error) => write!(f, "{error}"),
            Self::Warning { warnings, result } => write!(
                f,
                "{} with warnings {}",
                render::statement_result(result),
                render::warning_messages(warnings)
            ),
            Self::Success => write!(f, "success"),
            Self::Failure(message) => write!(f, "failure: {message}"),
        }
    }
}

/// An expected result mismatch.
#[derive(Clone, Debug, PartialEq)]
pub struct Mismatch {
    /// Why the outcome mismatched.
    pub comment: String,
    /// The actual outcome.
    pub actual: String,
    /// The expected result.
    pub expected: String,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}\n  actual: {}\n  expected: {}", self.comment, self.actual, self.expected)
    }
}

/// The verdict of a successful check.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// The outcome matched.
    Matched,
    /// The outcome was recorded as a new expected result, in test file syntax.
    Recorded(String),
}

/// An error message matcher.
#[derive(Clone, Debug, PartialEq)]
pub enum MessageMatch {
    Exact(String),
    Prefix(String),
    Suffix(String),
    /// The message must contain every substring.
    Substrings(Vec<String>),
}

impl MessageMatch {
    pub fn matches(&self, message: &str) -> bool {
        match self {
            Self::Exact(expected) => message == expected,
            Self::Prefix(prefix) => message.starts_with(prefix.as_str()),
            Self::Suffix(suffix) => message.ends_with(suffix.as_str()),
            Self::Substrings(substrings) => substrings.iter().all(|s| message.contains(s.as_str())),
        }
    }
}

impl std::fmt::Display for MessageMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Exact(message) => write!(f, "{}", quote(message)),
            Self::Prefix(prefix) => write!(f, "STARTS WITH {}", quote(prefix)),
            Self::Suffix(suffix) => write!(f, "ENDS WITH {}", quote(suffix)),
            Self::Substrings(substrings) => write!(f, "CONTAINS {}", render::strings(substrings)),
        }
    }
}

/// A row count bound.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangeBound {
    pub value: u64,
    pub inclusive: bool,
}

impl RangeBound {
    pub fn inclusive(value: u64) -> Self {
        Self { value, inclusive: true }
    }

    pub fn exclusive(value: u64) -> Self {
        Self { value, inclusive: false }
    }
}

/// An expected result. This is a closed set of variants, and each outcome
/// handler matches exhaustively on it, so the variant/outcome matrix is
/// checked by the compiler.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ExpectedResult {
    /// Accepts any outcome.
    DontCare,
    /// Accepts any outcome, and doesn't log driver errors.
    Mute,
    /// Accepts bare success, update counts and rows.
    #[default]
    Success,
    /// Accepts any driver error or application failure.
    FailureAny,
    /// Accepts a driver error with the given code and, optionally, message.
    FailureCode { code: i64, message: Option<MessageMatch> },
    /// Accepts a driver error or application failure with a matching message.
    FailureMessage(MessageMatch),
    /// Rows, in order.
    OrderedRows(Vec<ExpectedRow>),
    /// Rows, in any order.
    UnorderedRows(Vec<ExpectedRow>),
    /// Rows that must all be present (or, if inverted, all absent) in the
    /// result, which may contain other rows.
    ContainsRows { rows: Vec<ExpectedRow>, invert: bool },
    /// An exact number of rows.
    RowCount(u64),
    /// A number of rows within the given bounds. A missing bound is open.
    RowRange { lower: Option<RangeBound>, upper: Option<RangeBound> },
    /// An exact update count.
    AffectedRows(u64),
    /// At least one warning.
    WarningAny,
    /// An exact number of warnings.
    WarningCount(usize),
    /// Warnings including each of the given messages.
    WarningMessageSubset(Vec<String>),
    /// Warnings ending with the given messages, in order.
    WarningMessageSuffix(Vec<String>),
    /// Records the actual outcome as a new expected result instead of
    /// comparing it.
    RecordNew,
}

/// A handler's verdict: Ok if the outcome matched, otherwise a comment.
type Check = std::result::Result<(), String>;

impl ExpectedResult {
    /// Checks an actual outcome, dispatching it to the handler for its shape.
    pub fn check(&self, outcome: &Outcome) -> std::result::Result<Verdict, Mismatch> {
        if *self == Self::RecordNew {
            return Ok(Verdict::Recorded(render::record(outcome)));
        }
        let check = match outcome {
            Outcome::Rows(rs) => self.on_rows(rs),
            Outcome::Count(count) => self.on_count(*count),
            Outcome::Error(error) => self.on_error(error),
            Outcome::Warning { warnings, result } => self.on_warning(warnings, result),
            Outcome::Success => self.on_success(),
            Outcome::Failure(message) => self.on_failure(message),
        };
        check.map(|()| Verdict::Matched).map_err(|comment| Mismatch {
            comment,
            actual: outcome.to_string(),
            expected: self.describe(),
        })
    }

    /// Returns true if failures shouldn't be logged.
    pub fn is_mute(&self) -> bool {
        *self == Self::Mute
    }

    /// Handles a tabular result.
    fn on_rows(&self, rs: &ResultSet) -> Check {
        let count = rs.rows.len() as u64;
        match self {
            Self::DontCare | Self::Mute | Self::Success | Self::RecordNew => Ok(()),
            Self::FailureAny | Self::FailureCode { .. } | Self::FailureMessage(_) => {
                Err("expected failure, got rows".into())
            }
            Self::OrderedRows(expected) => Self::ordered_rows(expected, &rs.rows),
            Self::UnorderedRows(expected) => Self::unordered_rows(expected, &rs.rows),
            Self::ContainsRows { rows, invert: false } => Self::contains_rows(rows, &rs.rows),
            Self::ContainsRows { rows, invert: true } => Self::excludes_rows(rows, &rs.rows),
            Self::RowCount(expected) if count == *expected => Ok(()),
            Self::RowCount(expected) => Err(format!("expected {expected} rows, got {count}")),
            Self::RowRange { lower, upper } => {
                let above =
                    lower.map_or(true, |b| count > b.value || b.inclusive && count == b.value);
                let below =
                    upper.map_or(true, |b| count < b.value || b.inclusive && count == b.value);
                match above && below {
                    true => Ok(()),
                    false => Err(format!("row count {count} out of range")),
                }
            }
            Self::AffectedRows(_) => Err("expected affected row count, got rows".into()),
            Self::WarningAny
            | Self::WarningCount(_)
            | Self::WarningMessageSubset(_)
            | Self::WarningMessageSuffix(_) => self.check_warnings(&rs.warnings),
        }
    }

    /// Handles an update count.
    fn on_count(&self, count: u64) -> Check {
        match self {
            Self::DontCare | Self::Mute | Self::Success | Self::RecordNew => Ok(()),
            Self::FailureAny | Self::FailureCode { .. } | Self::FailureMessage(_) => {
                Err("expected failure, got affected row count".into())
            }
            Self::OrderedRows(_)
            | Self::UnorderedRows(_)
            | Self::ContainsRows { .. }
            | Self::RowCount(_)
            | Self::RowRange { .. } => Err("expected rows, got affected row count".into()),
            Self::AffectedRows(expected) if count == *expected => Ok(()),
            Self::AffectedRows(_) => Err("affected row count mismatch".into()),
            Self::WarningAny
            | Self::WarningCount(_)
            | Self::WarningMessageSubset(_)
            | Self::WarningMessageSuffix(_) => self.check_warnings(&[]),
        }
    }

    /// Handles a driver error.
    fn on_error(&self, error: &DriverError) -> Check {
        match self {
            Self::DontCare | Self::Mute | Self::FailureAny | Self::RecordNew => Ok(()),
            Self::FailureCode { code, .. } if *code != error.code => {
                Err(format!("expected error code {code}, got {}", error.code))
            }
            Self::FailureCode { message: Some(message), .. } | Self::FailureMessage(message)
                if !message.matches(&error.message) =>
            {
                Err("error message mismatch".into())
            }
            Self::FailureCode { .. } | Self::FailureMessage(_) => Ok(()),
            Self::Success
            | Self::OrderedRows(_)
            | Self::UnorderedRows(_)
            | Self::ContainsRows { .. }
            | Self::RowCount(_)
            | Self::RowRange { .. }
            | Self::AffectedRows(_)
            | Self::WarningAny
            | Self::WarningCount(_)
            | Self::WarningMessageSubset(_)
            | Self::WarningMessageSuffix(_) => Err("unexpected error".into()),
        }
    }

    /// Handles a successful statement that raised warnings. Warning
    /// expectations check the statement's warnings followed by any result
    /// set warnings, other expectations check the underlying result.
    fn on_warning(&self, warnings: &[Warning], result: &StatementResult) -> Check {
        match self {
            Self::WarningAny
            | Self::WarningCount(_)
            | Self::WarningMessageSubset(_)
            | Self::WarningMessageSuffix(_) => {
                let mut all = warnings.to_vec();
                if let StatementResult::Rows(rs) = result {
                    all.extend(rs.warnings.iter().cloned());
                }
                self.check_warnings(&all)
            }
            _ => match result {
                StatementResult::Rows(rs) => self.on_rows(rs),
                StatementResult::Count(count) => self.on_count(*count),
                StatementResult::Ok => self.on_success(),
            },
        }
    }

    /// Handles bare success.
    fn on_success(&self) -> Check {
        match self {
            Self::DontCare | Self::Mute | Self::Success | Self::RecordNew => Ok(()),
            Self::FailureAny | Self::FailureCode { .. } | Self::FailureMessage(_) => {
                Err("expected failure, got success".into())
            }
            Self::OrderedRows(_)
            | Self::UnorderedRows(_)
            | Self::ContainsRows { .. }
            | Self::RowCount(_)
            | Self::RowRange { .. } => Err("expected rows, got success".into()),
            Self::AffectedRows(_) => Err("expected affected row count, got success".into()),
            Self::WarningAny
            | Self::WarningCount(_)
            | Self::WarningMessageSubset(_)
            | Self::WarningMessageSuffix(_) => self.check_warnings(&[]),
        }
    }

    /// Handles an application-level failure.
    fn on_failure(&self, message: &str) -> Check {
        match self {
            Self::DontCare | Self::Mute | Self::FailureAny | Self::RecordNew => Ok(()),
            Self::FailureMessage(expected) if expected.matches(message) => Ok(()),
            Self::FailureMessage(_) => Err("failure message mismatch".into()),
            Self::FailureCode { code, .. } => {
                Err(format!("expected error code {code}, got failure"))
            }
            Self::Success
            | Self::OrderedRows(_)
            | Self::UnorderedRows(_)
            | Self::ContainsRows { .. }
            | Self::RowCount(_)
            | Self::RowRange { .. }
            | Self::AffectedRows(_)
            | Self::WarningAny
            | Self::WarningCount(_)
            | Self::WarningMessageSubset(_)
            | Self::WarningMessageSuffix(_) => Err("unexpected failure".into()),
        }
    }

    /// Checks a warning chain against a warning expectation.
    fn check_warnings(&self, warnings: &[Warning]) -> Check {
        let messages = warnings.iter().map(|w| w.message.as_str()).collect_vec();
        match self {
            Self::WarningAny if warnings.is_empty() => Err("expected warnings, got none".into()),
            Self::WarningCount(count) if warnings.len() != *count => {
                Err(format!("expected {count} warnings, got {}", warnings.len()))
            }
            Self::WarningMessageSubset(expected) => {
                match expected.iter().find(|e| !messages.contains(&e.as_str())) {
                    Some(missing) => Err(format!("missing warning {}", quote(missing))),
                    None => Ok(()),
                }
            }
            Self::WarningMessageSuffix(expected) => {
                let tail =
                    messages.len().checked_sub(expected.len()).map(|start| &messages[start..]);
                match tail.is_some_and(|t| t.iter().zip(expected).all(|(a, e)| *a == e.as_str())) {
                    true => Ok(()),
                    false => Err("warning messages mismatch".into()),
                }
            }
            _ => Ok(()),
        }
    }

    /// Matches rows index by index.
    fn ordered_rows(expected: &[ExpectedRow], actual: &[Row]) -> Check {
        for (i, (e, a)) in expected.iter().zip(actual).enumerate() {
            if !e.matches(a) {
                return Err(format!("row {} mismatch: expected {e}, got {}", i + 1, render::row(a)));
            }
        }
        match expected.len() == actual.len() {
            true => Ok(()),
            false => Err(format!("expected {} rows, got {}", expected.len(), actual.len())),
        }
    }

    /// Matches rows in any order. Each actual row consumes the first
    /// remaining expected row it matches. If an actual row matches none, the
    /// closest remaining expected rows are listed.
    fn unordered_rows(expected: &[ExpectedRow], actual: &[Row]) -> Check {
        let mut remaining = expected.iter().collect_vec();
        for row in actual {
            match remaining.iter().position(|e| e.matches(row)) {
                Some(i) => {
                    remaining.remove(i);
                }
                None => {
                    let scores = remaining.iter().map(|e| e.score(row));
                    let candidates = closest(scores, CLOSEST_CANDIDATES)
                        .into_iter()
                        .map(|(i, score)| format!("{} [{score:.3}]", remaining[i]))
                        .join(", ");
                    return Err(match candidates.is_empty() {
                        true => format!("unexpected row {}", render::row(row)),
                        false => format!(
                            "unexpected row {}, closest expected rows: {candidates}",
                            render::row(row)
                        ),
                    });
                }
            }
        }
        match remaining.is_empty() {
            true => Ok(()),
            false => Err(format!("missing rows {}", remaining.iter().join(", "))),
        }
    }

    /// Checks that every expected row is found among the actual rows, each
    /// actual row matching at most one expected row. Other rows are ignored.
    fn contains_rows(expected: &[ExpectedRow], actual: &[Row]) -> Check {
        let mut remaining = actual.iter().collect_vec();
        for row in expected {
            match remaining.iter().position(|a| row.matches(a)) {
                Some(i) => {
                    remaining.remove(i);
                }
                None => {
                    let scores = remaining.iter().map(|a| row.score(a));
                    let candidates = closest(scores, CLOSEST_CANDIDATES)
                        .into_iter()
                        .map(|(i, score)| format!("{} [{score:.3}]", render::row(remaining[i])))
                        .join(", ");
                    return Err(match candidates.is_empty() {
                        true => format!("missing row {row}"),
                        false => format!("missing row {row}, closest actual rows: {candidates}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Checks that no actual row matches any expected row.
    fn excludes_rows(expected: &[ExpectedRow], actual: &[Row]) -> Check {
        for row in actual {
            if let Some(e) = expected.iter().find(|e| e.matches(row)) {
                return Err(format!("unexpected row {} matches {e}", render::row(row)));
            }
        }
        Ok(())
    }

    /// Describes the expected result in test file syntax.
    pub fn describe(&self) -> String {
        let rows = |rows: &[ExpectedRow]| format!("[{}]", rows.iter().join(", "));
        match self {
            Self::DontCare => "DON'T CARE".to_string(),
            Self::Mute => "MUTE".to_string(),
            Self::Success => "SUCCESS".to_string(),
            Self::FailureAny => "FAILURE".to_string(),
            Self::FailureCode { code, message: None } => format!("FAILURE {code}"),
            Self::FailureCode { code, message: Some(message) } => {
                format!("FAILURE {code} {message}")
            }
            Self::FailureMessage(message) => format!("FAILURE {message}"),
            Self::OrderedRows(expected) => format!("ROWS {}", rows(expected)),
            Self::UnorderedRows(expected) => format!("UNORDERED ROWS {}", rows(expected)),
            Self::ContainsRows { rows: expected, invert: false } => {
                format!("CONTAINS ROWS {}", rows(expected))
            }
            Self::ContainsRows { rows: expected, invert: true } => {
                format!("NOT CONTAINS ROWS {}", rows(expected))
            }
            Self::RowCount(count) => format!("ROW COUNT {count}"),
            Self::RowRange { lower, upper } => {
                let bound = |op: &str, b: RangeBound| match b.inclusive {
                    true => format!("{op}= {}", b.value),
                    false => format!("{op} {}", b.value),
                };
                let lower = lower.map(|b| bound(">", b));
                let upper = upper.map(|b| bound("<", b));
                match lower.into_iter().chain(upper).join(" AND ") {
                    bounds if bounds.is_empty() => "ROW COUNT ANY".to_string(),
                    bounds => format!("ROW COUNT {bounds}"),
                }
            }
            Self::AffectedRows(count) => format!("AFFECTED ROWS {count}"),
            Self::WarningAny => "WARNING".to_string(),
            Self::WarningCount(count) => format!("WARNING COUNT {count}"),
            Self::WarningMessageSubset(messages) => {
                format!("WARNING MESSAGES {}", render::strings(messages))
            }
            Self::WarningMessageSuffix(messages) => {
                format!("WARNING ENDS WITH {}", render::strings(messages))
            }
            Self::RecordNew => "RECORD".to_string(),
        }
    }
}

impl std::fmt::Display for ExpectedResult {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}
