//! Comparison of expected values and rows against actual values returned by
//! the system under test. Expected values are parsed from literals as written
//! in a test file and may be fuzzy, e.g. floats are compared at the precision
//! they were written with.
//!
//! Besides strict matching, each comparator can compute a distance to an
//! actual value. Distances are only used to rank the closest candidates when
//! a row can't be matched, and never affect whether a test passes.

pub mod float;
pub mod interval;
pub mod row;

pub use float::ComparableFloat;
pub use interval::ComparableInterval;
pub use row::{closest, levenshtein, ExpectedRow, ExpectedValue};

/// The distance between a null and a non-null value.
pub const NULL_DISTANCE: f64 = 1.0;

/// The distance between values of incomparable types, and the distance
/// contributed by a missing or surplus column.
pub const INCOMPARABLE_DISTANCE: f64 = 1.0;

/// Returns the relative difference between two magnitudes, in [0, 1] when
/// they have the same sign. Two zeros have no difference.
pub(crate) fn relative_difference(expected: f64, actual: f64) -> f64 {
    let max = expected.abs().max(actual.abs());
    if max == 0.0 {
        return 0.0;
    }
    (expected - actual).abs() / max
}
