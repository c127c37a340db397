use crate::errinput;
use crate::error::Result;
use crate::types::Value;

use rust_decimal::prelude::ToPrimitive as _;

/// An expected floating point value, compared at the precision it was
/// written with. The precision is the number of significant digits in the
/// literal's mantissa: "100.00" has 5, "1e3" has 1 and "0.0012" has 2. An
/// exponent never adds precision.
///
/// Comparison is asymmetric: the actual value is rounded (half away from
/// zero) to the expected value's precision before testing for equality, so
/// "1e3" matches any actual value in [950, 1500). Expected zero only matches
/// an actual zero.
///
/// Both sides are compared as decimal digit strings, so any literal is
/// accepted regardless of magnitude. Actual floats are rounded from their
/// shortest round-trip representation.
#[derive(Clone, Debug, PartialEq)]
pub struct ComparableFloat {
    literal: String,
    value: Scientific,
    precision: u32,
}

impl ComparableFloat {
    /// Parses a decimal or scientific literal, e.g. "-1.50" or "2.5e-3".
    pub fn parse(literal: &str) -> Result<Self> {
        let literal = literal.trim();
        let Some(value) = Scientific::parse(literal) else {
            return errinput!("invalid float literal {literal}");
        };
        Ok(Self { literal: literal.to_string(), value, precision: Self::precision_of(literal) })
    }

    /// Counts the significant digits written in a literal's mantissa.
    fn precision_of(literal: &str) -> u32 {
        let mantissa = literal.split(['e', 'E']).next().unwrap_or_default();
        let digits = mantissa.chars().filter(|c| c.is_ascii_digit()).skip_while(|c| *c == '0');
        (digits.count() as u32).max(1)
    }

    /// The number of significant digits the comparison is performed at.
    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Returns true if the actual value, rounded to this precision, equals
    /// the expected value. Non-numeric and non-finite values never match.
    pub fn matches(&self, actual: &Value) -> bool {
        let actual = match actual {
            Value::Integer(i) => i.to_string(),
            Value::Float(f) if f.is_finite() => format!("{f:e}"),
            Value::Decimal(d) => d.to_string(),
            _ => return false,
        };
        Scientific::parse(&actual)
            .is_some_and(|actual| actual.round(self.precision as usize) == self.value)
    }

    /// Returns the relative difference between the expected and actual
    /// values, or None if the actual value isn't numeric.
    pub fn distance(&self, actual: &Value) -> Option<f64> {
        let actual = match actual {
            Value::Integer(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Decimal(d) => d.to_f64()?,
            _ => return None,
        };
        let expected: f64 = self.literal.parse().ok()?;
        Some(super::relative_difference(expected, actual))
    }
}

impl std::fmt::Display for ComparableFloat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.literal)
    }
}

/// A decimal number in normalized scientific notation: d.ddd × 10^exponent.
/// The digits have no leading or trailing zeros, and zero has no digits.
#[derive(Clone, Debug, PartialEq)]
struct Scientific {
    negative: bool,
    digits: Vec<u8>,
    exponent: i64,
}

impl Scientific {
    /// Parses [+-]digits[.digits][(e|E)[+-]digits], with at least one digit
    /// in the mantissa.
    fn parse(s: &str) -> Option<Self> {
        let (mantissa, exponent) = match s.split_once(['e', 'E']) {
            Some((mantissa, exponent)) => (mantissa, exponent.parse::<i64>().ok()?),
            None => (s, 0),
        };
        let (negative, mantissa) = match mantissa.strip_prefix('-') {
            Some(mantissa) => (true, mantissa),
            None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
        };
        let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if int.is_empty() && frac.is_empty() {
            return None;
        }
        let mut digits = Vec::with_capacity(int.len() + frac.len());
        for c in int.chars().chain(frac.chars()) {
            digits.push(c.to_digit(10)? as u8);
        }

        let zeros = digits.iter().take_while(|d| **d == 0).count();
        if zeros == digits.len() {
            return Some(Self { negative: false, digits: Vec::new(), exponent: 0 });
        }
        digits.drain(..zeros);
        while digits.last() == Some(&0) {
            digits.pop();
        }
        let exponent = exponent.checked_add(int.len() as i64 - zeros as i64 - 1)?;
        Some(Self { negative, digits, exponent })
    }

    /// Rounds to the given number of significant digits, half away from zero.
    fn round(mut self, precision: usize) -> Self {
        if self.digits.len() <= precision {
            return self;
        }
        let round_up = self.digits[precision] >= 5;
        self.digits.truncate(precision);
        if round_up {
            while self.digits.last() == Some(&9) {
                self.digits.pop();
            }
            match self.digits.last_mut() {
                Some(last) => *last += 1,
                None => {
                    self.digits.push(1);
                    self.exponent = self.exponent.saturating_add(1);
                }
            }
        }
        while self.digits.last() == Some(&0) {
            self.digits.pop();
        }
        self
    }
}
