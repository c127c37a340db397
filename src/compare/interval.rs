use crate::errinput;
use crate::error::Result;
use crate::types::{Interval, IntervalFamily, IntervalKind, Value};

/// An interval field unit.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Unit {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl Unit {
    const YEAR_MONTH: &'static [Unit] = &[Unit::Year, Unit::Month];
    const DAY_TIME: &'static [Unit] = &[Unit::Day, Unit::Hour, Unit::Minute, Unit::Second];
    const ALL: &'static [Unit] =
        &[Unit::Year, Unit::Month, Unit::Day, Unit::Hour, Unit::Minute, Unit::Second];

    /// Returns the fields a literal of the given kind is written with.
    fn of_kind(kind: IntervalKind) -> &'static [Unit] {
        use IntervalKind::*;
        match kind {
            Year => &Self::YEAR_MONTH[..1],
            Month => &Self::YEAR_MONTH[1..],
            YearToMonth | UnknownYearMonth => Self::YEAR_MONTH,
            Day => &Self::DAY_TIME[..1],
            Hour => &Self::DAY_TIME[1..2],
            Minute => &Self::DAY_TIME[2..3],
            Second => &Self::DAY_TIME[3..],
            DayToHour => &Self::DAY_TIME[..2],
            DayToMinute => &Self::DAY_TIME[..3],
            DayToSecond | UnknownDayTime => Self::DAY_TIME,
            HourToMinute => &Self::DAY_TIME[1..3],
            HourToSecond => &Self::DAY_TIME[1..],
            MinuteToSecond => &Self::DAY_TIME[2..],
            Unknown => Self::ALL,
        }
    }

    /// Returns all fields of the kind's family.
    fn of_family(family: IntervalFamily) -> &'static [Unit] {
        match family {
            IntervalFamily::YearMonth => Self::YEAR_MONTH,
            IntervalFamily::DayTime => Self::DAY_TIME,
            IntervalFamily::Any => Self::ALL,
        }
    }
}

const MICROS_PER_DAY: f64 = 86_400_000_000.0;

/// An expected interval. Intervals are compared in two stages: first, the
/// sub-types must be compatible, then the normalized magnitudes must be
/// equal. Year-month intervals are normalized to months and day-time
/// intervals to microseconds, while a fully unknown interval is compared
/// across both axes.
#[derive(Clone, Debug, PartialEq)]
pub struct ComparableInterval(Interval);

impl ComparableInterval {
    /// Parses an interval literal's quoted text for the given sub-type, e.g.
    /// "-1-2" for YEAR TO MONTH or "3 04:05:06.5" for DAY TO SECOND. The
    /// text may either contain exactly the sub-type's fields, or all fields
    /// of its family (as rendered when displaying an interval).
    pub fn parse(literal: &str, kind: IntervalKind) -> Result<Self> {
        let text = literal.trim();
        let (negative, text) = match text.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, text),
        };
        let fields: Vec<&str> = text.split([' ', ':', '-']).filter(|f| !f.is_empty()).collect();
        let units = match fields.len() {
            n if n == Unit::of_kind(kind).len() => Unit::of_kind(kind),
            n if n == Unit::of_family(kind.family()).len() => Unit::of_family(kind.family()),
            _ => return errinput!("invalid interval literal '{literal}' for {kind}"),
        };

        let mut interval = Interval { negative, ..Interval::zero(kind) };
        for (unit, field) in units.iter().zip(fields) {
            let (whole, fraction) = match unit {
                Unit::Second => field.split_once('.').unwrap_or((field, "")),
                _ => (field, ""),
            };
            let Ok(value) = whole.parse::<u32>() else {
                return errinput!("invalid interval field '{field}' in '{literal}'");
            };
            match unit {
                Unit::Year => interval.years = value,
                Unit::Month => interval.months = value,
                Unit::Day => interval.days = value,
                Unit::Hour => interval.hours = value,
                Unit::Minute => interval.minutes = value,
                Unit::Second => {
                    interval.seconds = value;
                    interval.micros = Self::parse_micros(fraction, literal)?;
                }
            }
        }
        Ok(Self(interval))
    }

    /// Parses a fractional seconds field into microseconds.
    fn parse_micros(fraction: &str, literal: &str) -> Result<u32> {
        if fraction.is_empty() {
            return Ok(0);
        }
        if fraction.len() > 6 || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return errinput!("invalid fractional seconds in '{literal}'");
        }
        Ok(format!("{fraction:0<6}").parse()?)
    }

    /// Returns true if an expected sub-type can be compared with an actual
    /// one. A fully unknown type is compatible with everything. Otherwise,
    /// the families must match, and either one side is soft or the types
    /// are equal.
    pub fn compatible(expected: IntervalKind, actual: IntervalKind) -> bool {
        let (expected_family, actual_family) = (expected.family(), actual.family());
        if expected_family == IntervalFamily::Any || actual_family == IntervalFamily::Any {
            return true;
        }
        if expected_family != actual_family {
            return false;
        }
        expected.is_soft() || actual.is_soft() || expected == actual
    }

    /// Returns the family whose units two compatible sub-types are compared in.
    fn axis(expected: IntervalKind, actual: IntervalKind) -> IntervalFamily {
        match (expected.family(), actual.family()) {
            (IntervalFamily::Any, _) | (_, IntervalFamily::Any) => IntervalFamily::Any,
            (family, _) => family,
        }
    }

    /// Returns true if the actual value is a compatible interval of equal
    /// magnitude.
    pub fn matches(&self, actual: &Value) -> bool {
        match actual {
            Value::Interval(interval) => self.matches_interval(interval),
            _ => false,
        }
    }

    /// Compares against an actual interval.
    pub fn matches_interval(&self, actual: &Interval) -> bool {
        let expected = &self.0;
        if !Self::compatible(expected.kind, actual.kind) {
            return false;
        }
        let months = expected.total_months() == actual.total_months();
        let micros = expected.total_micros() == actual.total_micros();
        match Self::axis(expected.kind, actual.kind) {
            IntervalFamily::YearMonth => months,
            IntervalFamily::DayTime => micros,
            IntervalFamily::Any => months && micros,
        }
    }

    /// Returns the relative magnitude difference to an actual interval, or
    /// None if the actual value isn't a compatible interval.
    pub fn distance(&self, actual: &Value) -> Option<f64> {
        let Value::Interval(actual) = actual else {
            return None;
        };
        let expected = &self.0;
        if !Self::compatible(expected.kind, actual.kind) {
            return None;
        }
        let axis = Self::axis(expected.kind, actual.kind);
        let magnitude = |interval: &Interval| match axis {
            IntervalFamily::YearMonth => interval.total_months() as f64,
            IntervalFamily::DayTime => interval.total_micros() as f64,
            IntervalFamily::Any => {
                interval.total_months() as f64 * 30.0 * MICROS_PER_DAY
                    + interval.total_micros() as f64
            }
        };
        Some(super::relative_difference(magnitude(expected), magnitude(actual)))
    }
}

impl std::fmt::Display for ComparableInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
