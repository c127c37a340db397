use crate::execution::Failure;

/// toytest errors.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// An operation's actual outcome did not match its expected result. This
    /// is the normal way for a test to fail, and carries the operation's
    /// source location along with renderings of both outcomes.
    Mismatch(Box<Failure>),
    /// Invalid user input, typically a malformed plan or literal. These are
    /// surfaced before a test starts executing.
    InvalidInput(String),
    /// Invalid data, typically an unexpected value returned by a driver.
    InvalidData(String),
    /// An internal invariant was violated, e.g. a missing default connection.
    /// This is always a bug in the harness itself.
    Internal(String),
    /// An IO error.
    IO(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Mismatch(failure) => write!(f, "{failure}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::Internal(msg) => write!(f, "internal error: {msg}"),
            Error::IO(msg) => write!(f, "io error: {msg}"),
        }
    }
}

/// Constructs an Error::InvalidInput via format!() and into().
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { $crate::error::Error::InvalidInput(format!($($args)*)).into() };
}

/// Constructs an Error::InvalidData via format!() and into().
#[macro_export]
macro_rules! errdata {
    ($($args:tt)*) => { $crate::error::Error::InvalidData(format!($($args)*)).into() };
}

/// Constructs an Error::Internal via format!() and into().
#[macro_export]
macro_rules! errinternal {
    ($($args:tt)*) => { $crate::error::Error::Internal(format!($($args)*)).into() };
}

/// A toytest Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Error::InvalidInput(err.to_string())
    }
}

impl From<log::ParseLevelError> for Error {
    fn from(err: log::ParseLevelError) -> Self {
        Error::InvalidInput(err.to_string())
    }
}

impl From<log::SetLoggerError> for Error {
    fn from(err: log::SetLoggerError) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::InvalidInput(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Internal(err.to_string())
    }
}
