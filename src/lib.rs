#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

pub mod compare;
pub mod config;
pub mod driver;
pub mod error;
pub mod execution;
pub mod expect;
pub mod plan;
pub mod runner;
pub mod types;

pub use config::Config;
pub use driver::{Connection, Driver};
pub use execution::{Engine, TestResult};
pub use plan::{Operation, OperationKind, Plan};
pub use runner::Runner;
