/// An interval sub-type, as declared by the literal or reported by the
/// system under test. The soft types (UnknownYearMonth, UnknownDayTime and
/// Unknown) are used when the system can't report an exact sub-type, and
/// compare leniently against any type in their family.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum IntervalKind {
    Year,
    Month,
    YearToMonth,
    Day,
    Hour,
    Minute,
    Second,
    DayToHour,
    DayToMinute,
    DayToSecond,
    HourToMinute,
    HourToSecond,
    MinuteToSecond,
    UnknownYearMonth,
    UnknownDayTime,
    Unknown,
}

/// An interval family. Intervals can only be compared within a family,
/// except for the fully unknown family which spans both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntervalFamily {
    YearMonth,
    DayTime,
    Any,
}

impl IntervalKind {
    /// Returns the kind's family.
    pub fn family(&self) -> IntervalFamily {
        match self {
            Self::Year | Self::Month | Self::YearToMonth | Self::UnknownYearMonth => {
                IntervalFamily::YearMonth
            }
            Self::Day
            | Self::Hour
            | Self::Minute
            | Self::Second
            | Self::DayToHour
            | Self::DayToMinute
            | Self::DayToSecond
            | Self::HourToMinute
            | Self::HourToSecond
            | Self::MinuteToSecond
            | Self::UnknownDayTime => IntervalFamily::DayTime,
            Self::Unknown => IntervalFamily::Any,
        }
    }

    /// Returns true for the soft (inexact) kinds.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::UnknownYearMonth | Self::UnknownDayTime | Self::Unknown)
    }
}

impl std::fmt::Display for IntervalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Year => "YEAR",
            Self::Month => "MONTH",
            Self::YearToMonth => "YEAR TO MONTH",
            Self::Day => "DAY",
            Self::Hour => "HOUR",
            Self::Minute => "MINUTE",
            Self::Second => "SECOND",
            Self::DayToHour => "DAY TO HOUR",
            Self::DayToMinute => "DAY TO MINUTE",
            Self::DayToSecond => "DAY TO SECOND",
            Self::HourToMinute => "HOUR TO MINUTE",
            Self::HourToSecond => "HOUR TO SECOND",
            Self::MinuteToSecond => "MINUTE TO SECOND",
            Self::UnknownYearMonth => "UNKNOWN YEAR TO MONTH",
            Self::UnknownDayTime => "UNKNOWN DAY TO SECOND",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// An interval value: a signed year/month/day/hour/minute/second/microsecond
/// tuple with a declared sub-type. Fields are not normalized, i.e. 90
/// minutes is stored as-is rather than as 1 hour 30 minutes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Interval {
    pub negative: bool,
    pub years: u32,
    pub months: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub micros: u32,
    pub kind: IntervalKind,
}

impl Interval {
    /// Creates a zero interval of the given kind.
    pub fn zero(kind: IntervalKind) -> Self {
        Self {
            negative: false,
            years: 0,
            months: 0,
            days: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
            micros: 0,
            kind,
        }
    }

    /// Creates a year-month interval.
    pub fn year_month(years: u32, months: u32, kind: IntervalKind) -> Self {
        Self { years, months, ..Self::zero(kind) }
    }

    /// Creates a day-time interval.
    pub fn day_time(
        days: u32,
        hours: u32,
        minutes: u32,
        seconds: u32,
        micros: u32,
        kind: IntervalKind,
    ) -> Self {
        Self { days, hours, minutes, seconds, micros, ..Self::zero(kind) }
    }

    /// Returns a negated copy of the interval.
    pub fn negate(self) -> Self {
        Self { negative: !self.negative, ..self }
    }

    /// Returns the signed year-month magnitude in months.
    pub fn total_months(&self) -> i64 {
        let months = i64::from(self.years) * 12 + i64::from(self.months);
        if self.negative {
            -months
        } else {
            months
        }
    }

    /// Returns the signed day-time magnitude in microseconds.
    pub fn total_micros(&self) -> i128 {
        let seconds = ((i128::from(self.days) * 24 + i128::from(self.hours)) * 60
            + i128::from(self.minutes))
            * 60
            + i128::from(self.seconds);
        let micros = seconds * 1_000_000 + i128::from(self.micros);
        if self.negative {
            -micros
        } else {
            micros
        }
    }

    /// Returns true if all fields are zero.
    pub fn is_zero(&self) -> bool {
        self.total_months() == 0 && self.total_micros() == 0
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let sign = if self.negative { "-" } else { "" };
        let year_month = format!("{}-{}", self.years, self.months);
        let mut day_time =
            format!("{} {:02}:{:02}:{:02}", self.days, self.hours, self.minutes, self.seconds);
        if self.micros > 0 {
            day_time.push_str(&format!(".{:06}", self.micros));
        }
        match self.kind.family() {
            IntervalFamily::YearMonth => write!(f, "INTERVAL '{sign}{year_month}'")?,
            IntervalFamily::DayTime => write!(f, "INTERVAL '{sign}{day_time}'")?,
            IntervalFamily::Any => write!(f, "INTERVAL '{sign}{year_month} {day_time}'")?,
        }
        write!(f, " {}", self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn magnitudes() {
        let ym = Interval::year_month(1, 2, IntervalKind::YearToMonth);
        assert_eq!(ym.total_months(), 14);
        assert_eq!(ym.total_micros(), 0);
        assert_eq!(ym.clone().negate().total_months(), -14);

        let dt = Interval::day_time(1, 2, 3, 4, 5, IntervalKind::DayToSecond);
        assert_eq!(dt.total_months(), 0);
        assert_eq!(dt.total_micros(), 93_784_000_005);
        assert!(!dt.is_zero());
        assert!(Interval::zero(IntervalKind::Unknown).is_zero());
    }

    #[test]
    fn display() {
        assert_eq!(
            Interval::year_month(1, 2, IntervalKind::YearToMonth).negate().to_string(),
            "INTERVAL '-1-2' YEAR TO MONTH"
        );
        assert_eq!(
            Interval::day_time(3, 4, 5, 6, 7, IntervalKind::DayToSecond).to_string(),
            "INTERVAL '3 04:05:06.000007' DAY TO SECOND"
        );
        assert_eq!(
            Interval::zero(IntervalKind::Unknown).to_string(),
            "INTERVAL '0-0 0 00:00:00' UNKNOWN"
        );
    }
}
