use super::{relative_difference, ComparableFloat, ComparableInterval};
use super::{INCOMPARABLE_DISTANCE, NULL_DISTANCE};
use crate::types::{quote, Value};

use chrono::{Datelike as _, NaiveDate, NaiveDateTime, NaiveTime, Timelike as _};
use itertools::Itertools as _;
use rust_decimal::Decimal;

/// An expected column value.
#[derive(Clone, Debug, PartialEq)]
pub enum ExpectedValue {
    Null,
    Boolean(bool),
    Integer(i64),
    /// A float, compared at the precision it was written with.
    Float(ComparableFloat),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    /// An interval, compared by sub-type compatibility and magnitude.
    Interval(ComparableInterval),
    /// Matches any value, including NULL.
    DontCare,
    /// Matches this and all remaining columns, regardless of how many
    /// there are. The marker's own column must be present, so a row needs
    /// at least one column beyond those before the marker.
    IgnoreRemaining,
}

impl ExpectedValue {
    /// Returns true if the actual value matches.
    pub fn matches(&self, actual: &Value) -> bool {
        match (self, actual) {
            (Self::DontCare | Self::IgnoreRemaining, _) => true,
            (Self::Null, Value::Null) => true,
            (Self::Boolean(e), Value::Boolean(a)) => e == a,
            (Self::Integer(e), Value::Integer(a)) => e == a,
            (Self::Integer(e), Value::Decimal(a)) => Decimal::from(*e) == *a,
            (Self::Integer(e), Value::Float(a)) => *e as f64 == *a,
            (Self::Float(e), a) => e.matches(a),
            (Self::String(e), Value::String(a)) => e == a,
            (Self::Bytes(e), Value::Bytes(a)) => e == a,
            (Self::Date(e), Value::Date(a)) => e == a,
            (Self::Time(e), Value::Time(a)) => e == a,
            (Self::Timestamp(e), Value::Timestamp(a)) => e == a,
            (Self::Interval(e), a) => e.matches(a),
            _ => false,
        }
    }

    /// Returns a type-specific distance to the actual value, where 0 is
    /// identical. Strings and byte strings use the edit distance, numerics
    /// and temporal values the relative magnitude difference.
    pub fn distance(&self, actual: &Value) -> f64 {
        match (self, actual) {
            (Self::DontCare | Self::IgnoreRemaining, _) => 0.0,
            (Self::Null, Value::Null) => 0.0,
            (Self::Null, _) | (_, Value::Null) => NULL_DISTANCE,
            (Self::Boolean(e), Value::Boolean(a)) => f64::from(u8::from(e != a)),
            (Self::Integer(e), a) => match numeric(a) {
                Some(a) => relative_difference(*e as f64, a),
                None => INCOMPARABLE_DISTANCE,
            },
            (Self::Float(e), a) => e.distance(a).unwrap_or(INCOMPARABLE_DISTANCE),
            (Self::String(e), Value::String(a)) => {
                let (e, a): (Vec<char>, Vec<char>) = (e.chars().collect(), a.chars().collect());
                levenshtein(&e, &a) as f64
            }
            (Self::Bytes(e), Value::Bytes(a)) => levenshtein(e, a) as f64,
            (Self::Date(e), Value::Date(a)) => {
                relative_difference(e.num_days_from_ce().into(), a.num_days_from_ce().into())
            }
            (Self::Time(e), Value::Time(a)) => {
                let seconds = |t: &NaiveTime| {
                    f64::from(t.num_seconds_from_midnight()) + f64::from(t.nanosecond()) / 1e9
                };
                relative_difference(seconds(e), seconds(a))
            }
            (Self::Timestamp(e), Value::Timestamp(a)) => relative_difference(
                e.and_utc().timestamp_micros() as f64,
                a.and_utc().timestamp_micros() as f64,
            ),
            (Self::Interval(e), a) => e.distance(a).unwrap_or(INCOMPARABLE_DISTANCE),
            _ => INCOMPARABLE_DISTANCE,
        }
    }
}

/// Returns a numeric value as a float.
fn numeric(value: &Value) -> Option<f64> {
    use rust_decimal::prelude::ToPrimitive as _;
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Decimal(d) => d.to_f64(),
        _ => None,
    }
}

impl std::fmt::Display for ExpectedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(true) => f.write_str("TRUE"),
            Self::Boolean(false) => f.write_str("FALSE"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(float) => write!(f, "{float}"),
            Self::String(s) => f.write_str(&quote(s)),
            Self::Bytes(b) => write!(f, "X'{}'", hex::encode(b)),
            Self::Date(d) => write!(f, "{}", Value::Date(*d)),
            Self::Time(t) => write!(f, "{}", Value::Time(*t)),
            Self::Timestamp(ts) => write!(f, "{}", Value::Timestamp(*ts)),
            Self::Interval(interval) => write!(f, "{interval}"),
            Self::DontCare => f.write_str("DONT_CARE"),
            Self::IgnoreRemaining => f.write_str("IGNORE_REMAINING"),
        }
    }
}

/// An expected row.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpectedRow(pub Vec<ExpectedValue>);

impl ExpectedRow {
    /// The columns that are compared, i.e. those before any IGNORE_REMAINING.
    fn compared(&self) -> &[ExpectedValue] {
        match self.0.iter().position(|v| *v == ExpectedValue::IgnoreRemaining) {
            Some(end) => &self.0[..end],
            None => &self.0,
        }
    }

    fn ignores_remaining(&self) -> bool {
        self.0.contains(&ExpectedValue::IgnoreRemaining)
    }

    /// Returns true if the actual row matches column by column. If the row
    /// ignores remaining columns, the actual row must extend at least to the
    /// IGNORE_REMAINING column. Otherwise the column counts must be equal.
    pub fn matches(&self, actual: &[Value]) -> bool {
        let compared = self.compared();
        let width_ok = match self.ignores_remaining() {
            true => actual.len() > compared.len(),
            false => actual.len() == compared.len(),
        };
        width_ok && compared.iter().zip(actual).all(|(e, a)| e.matches(a))
    }

    /// Scores the similarity of an actual row, where 0 is identical and
    /// lower is closer. The score is the geometric mean of the per-column
    /// distances, computed as exp(mean(ln(d + 1))) - 1 to tolerate zero
    /// distances. Missing and surplus columns count as incomparable. The
    /// IGNORE_REMAINING column counts as a column, and those after it don't.
    pub fn score(&self, actual: &[Value]) -> f64 {
        let compared = self.compared();
        let width = match self.ignores_remaining() {
            true => compared.len() + 1,
            false => compared.len().max(actual.len()),
        };
        if width == 0 {
            return 0.0;
        }
        let total: f64 = (0..width)
            .map(|i| match (compared.get(i), actual.get(i)) {
                (Some(e), Some(a)) => e.distance(a),
                (None, Some(_)) if self.ignores_remaining() => 0.0,
                _ => INCOMPARABLE_DISTANCE,
            })
            .map(f64::ln_1p)
            .sum();
        (total / width as f64).exp_m1()
    }
}

impl std::fmt::Display for ExpectedRow {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "({})", self.0.iter().join(", "))
    }
}

/// Ranks candidate scores, returning up to `limit` (index, score) pairs
/// with the lowest scores first. Ties keep candidate order.
pub fn closest(scores: impl IntoIterator<Item = f64>, limit: usize) -> Vec<(usize, f64)> {
    scores.into_iter().enumerate().sorted_by(|a, b| a.1.total_cmp(&b.1)).take(limit).collect()
}

/// Computes the Levenshtein edit distance between two sequences.
pub fn levenshtein<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, x) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let cost = usize::from(x != y);
            current[j + 1] = (previous[j + 1] + 1).min(current[j] + 1).min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
