//! A scripted in-memory driver for integration tests. Statements are
//! answered by a script closure, and every connection and statement is
//! reported on a channel so tests can assert on what the harness did.

#![allow(dead_code)]

use crossbeam::channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::Arc;
use toytest::driver::{Connection, Driver, DriverError, Response, ResultSet, StatementResult};
use toytest::execution::{Engine, TestResult};
use toytest::types::{Row, Value};
use toytest::Config;

/// Answers a statement executed on a named connection.
pub type Script = dyn Fn(&str, &str) -> Result<Response, DriverError> + Send + Sync;

/// Something the harness did through the driver.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Connect { name: String, options: BTreeMap<String, String> },
    Execute { connection: String, statement: String },
    Close { name: String },
}

pub struct ScriptedDriver {
    script: Arc<Script>,
    events: Sender<Event>,
}

impl ScriptedDriver {
    /// Creates a driver, returning it along with its event receiver.
    pub fn new(
        script: impl Fn(&str, &str) -> Result<Response, DriverError> + Send + Sync + 'static,
    ) -> (Arc<Self>, Receiver<Event>) {
        let (tx, rx) = crossbeam::channel::unbounded();
        (Arc::new(Self { script: Arc::new(script), events: tx }), rx)
    }

    /// A driver that answers every statement with bare success.
    pub fn ok() -> (Arc<Self>, Receiver<Event>) {
        Self::new(|_, _| Ok(StatementResult::Ok.into()))
    }
}

impl Driver for ScriptedDriver {
    fn connect(
        &self,
        name: &str,
        _: Option<&str>,
        options: &BTreeMap<String, String>,
    ) -> Result<Box<dyn Connection>, DriverError> {
        self.events.send(Event::Connect { name: name.into(), options: options.clone() }).ok();
        Ok(Box::new(ScriptedConnection {
            name: name.to_string(),
            script: self.script.clone(),
            events: self.events.clone(),
        }))
    }
}

struct ScriptedConnection {
    name: String,
    script: Arc<Script>,
    events: Sender<Event>,
}

impl Connection for ScriptedConnection {
    fn execute(&mut self, statement: &str) -> Result<Response, DriverError> {
        let event = Event::Execute { connection: self.name.clone(), statement: statement.into() };
        self.events.send(event).ok();
        (self.script)(&self.name, statement)
    }

    fn close(&mut self) {
        self.events.send(Event::Close { name: self.name.clone() }).ok();
    }
}

/// Executes a plan with the given config, returning its result.
pub fn execute(
    config: Config,
    driver: Arc<ScriptedDriver>,
    plan: &toytest::Plan,
) -> Arc<TestResult> {
    let result = Arc::new(TestResult::new("test"));
    Engine::new(Arc::new(config), driver, result.clone()).execute(plan);
    result
}

/// Returns the statements executed so far, in order.
pub fn statements(events: &Receiver<Event>) -> Vec<String> {
    events
        .try_iter()
        .filter_map(|event| match event {
            Event::Execute { statement, .. } => Some(statement),
            _ => None,
        })
        .collect()
}

/// Builds a rows response of (integer, string) rows.
pub fn rows(rows: &[(i64, &str)]) -> Result<Response, DriverError> {
    let rows: Vec<Row> =
        rows.iter().map(|(i, s)| vec![Value::Integer(*i), Value::from(*s)]).collect();
    Ok(StatementResult::Rows(ResultSet::new(vec!["id".into(), "name".into()], rows)).into())
}
