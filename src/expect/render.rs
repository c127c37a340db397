//! Renders values, rows and outcomes in test file literal syntax. These
//! renderings are used in mismatch diagnostics, and to record new expected
//! results that can be pasted back into a test file.

use super::Outcome;
use crate::driver::{StatementResult, Warning};
use crate::types::{quote, Value};

use itertools::Itertools as _;

/// Renders a row, e.g. (1, 'a').
pub fn row(values: &[Value]) -> String {
    format!("({})", values.iter().join(", "))
}

/// Renders a list of rows, e.g. [(1, 'a'), (2, 'b')].
pub fn rows<R: AsRef<[Value]>>(rows: &[R]) -> String {
    format!("[{}]", rows.iter().map(|r| row(r.as_ref())).join(", "))
}

/// Renders a list of quoted strings, e.g. ['a', 'b'].
pub fn strings<S: AsRef<str>>(strings: &[S]) -> String {
    format!("[{}]", strings.iter().map(|s| quote(s.as_ref())).join(", "))
}

/// Renders a statement result.
pub fn statement_result(result: &StatementResult) -> String {
    match result {
        StatementResult::Rows(rs) => format!("rows: {}", rows(&rs.rows)),
        StatementResult::Count(count) => format!("affected: {count}"),
        StatementResult::Ok => "success".to_string(),
    }
}

/// Renders the messages of a warning chain.
pub fn warning_messages(warnings: &[Warning]) -> String {
    strings(&warnings.iter().map(|w| w.message.as_str()).collect_vec())
}

/// Renders the expected result that an outcome would match, in test file
/// syntax. Warnings take precedence over the result they were raised with.
pub fn record(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Rows(rs) if !rs.warnings.is_empty() => {
            format!("WARNING MESSAGES {}", warning_messages(&rs.warnings))
        }
        Outcome::Rows(rs) => format!("ROWS {}", rows(&rs.rows)),
        Outcome::Count(count) => format!("AFFECTED ROWS {count}"),
        Outcome::Error(error) => format!("FAILURE {} {}", error.code, quote(&error.message)),
        Outcome::Warning { warnings, result } => {
            let mut all = warnings.clone();
            if let StatementResult::Rows(rs) = result {
                all.extend(rs.warnings.iter().cloned());
            }
            format!("WARNING MESSAGES {}", warning_messages(&all))
        }
        Outcome::Success => "SUCCESS".to_string(),
        Outcome::Failure(_) => "FAILURE".to_string(),
    }
}
