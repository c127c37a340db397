//! Values returned by the system under test.

pub mod interval;
pub mod value;

pub use interval::{Interval, IntervalFamily, IntervalKind};
pub use value::{quote, Row, Value};
