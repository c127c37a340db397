use super::Interval;
use crate::errdata;
use crate::error::{Error, Result};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// A column value returned by the system under test.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// An unknown value of unknown type.
    Null,
    /// A boolean.
    Boolean(bool),
    /// A 64-bit signed integer.
    Integer(i64),
    /// A 64-bit floating point number.
    Float(f64),
    /// An exact decimal number.
    Decimal(Decimal),
    /// A UTF-8 encoded string.
    String(String),
    /// A byte string.
    Bytes(Vec<u8>),
    /// A calendar date.
    Date(NaiveDate),
    /// A time of day.
    Time(NaiveTime),
    /// A date and time of day.
    Timestamp(NaiveDateTime),
    /// An interval.
    Interval(Interval),
}

/// Formats a string as a single-quoted SQL literal, doubling any quotes.
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl std::fmt::Display for Value {
    /// Formats the value as a literal, as it would be written in a test file.
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(true) => f.write_str("TRUE"),
            Self::Boolean(false) => f.write_str("FALSE"),
            Self::Integer(integer) => write!(f, "{integer}"),
            // Debug formatting always includes a fractional part or exponent,
            // which keeps floats distinct from integers when re-read.
            Self::Float(float) => write!(f, "{float:?}"),
            Self::Decimal(decimal) => write!(f, "{decimal}"),
            Self::String(string) => f.write_str(&quote(string)),
            Self::Bytes(bytes) => write!(f, "X'{}'", hex::encode(bytes)),
            Self::Date(date) => write!(f, "DATE '{}'", date.format("%Y-%m-%d")),
            Self::Time(time) => write!(f, "TIME '{}'", time.format("%H:%M:%S%.f")),
            Self::Timestamp(ts) => write!(f, "TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S%.f")),
            Self::Interval(interval) => write!(f, "{interval}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Interval> for Value {
    fn from(v: Interval) -> Self {
        Value::Interval(v)
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(v: Option<V>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let Value::Boolean(b) = value else { return errdata!("not boolean: {value}") };
        Ok(b)
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let Value::Integer(i) = value else { return errdata!("not integer: {value}") };
        Ok(i)
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let Value::String(s) = value else { return errdata!("not string: {value}") };
        Ok(s)
    }
}

/// A row of values.
pub type Row = Vec<Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntervalKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn display() -> Result<()> {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Boolean(true).to_string(), "TRUE");
        assert_eq!(Value::Integer(-7).to_string(), "-7");
        assert_eq!(Value::Float(100.0).to_string(), "100.0");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::Decimal(Decimal::new(10050, 2)).to_string(), "100.50");
        assert_eq!(Value::from("it's").to_string(), "'it''s'");
        assert_eq!(Value::Bytes(vec![0x0a, 0xff]).to_string(), "X'0aff'");

        let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("invalid date");
        assert_eq!(Value::Date(date).to_string(), "DATE '2024-02-29'");
        let time = NaiveTime::from_hms_opt(13, 5, 9).expect("invalid time");
        assert_eq!(Value::Time(time).to_string(), "TIME '13:05:09'");
        assert_eq!(
            Value::Timestamp(date.and_time(time)).to_string(),
            "TIMESTAMP '2024-02-29 13:05:09'"
        );
        assert_eq!(
            Value::Interval(Interval::year_month(2, 0, IntervalKind::Year)).to_string(),
            "INTERVAL '2-0' YEAR"
        );
        Ok(())
    }

    #[test]
    fn conversions() -> Result<()> {
        assert_eq!(Value::from(Some(3_i64)), Value::Integer(3));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(i64::try_from(Value::Integer(3))?, 3);
        assert_eq!(String::try_from(Value::from("a"))?, "a");
        assert_eq!(bool::try_from(Value::Integer(1)), errdata!("not boolean: 1"));
        Ok(())
    }
}
