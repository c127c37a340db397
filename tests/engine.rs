//! End-to-end tests of plan execution against a scripted driver.

#![warn(clippy::all)]

mod setup;

use pretty_assertions::assert_eq;
use setup::{execute, rows, statements, Event, ScriptedDriver};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use toytest::compare::{ExpectedRow, ExpectedValue};
use toytest::driver::{DriverError, Response, StatementResult, Warning};
use toytest::execution::{Annotation, Status};
use toytest::expect::{ExpectedResult, MessageMatch};
use toytest::plan::LogLevel;
use toytest::types::Value;
use toytest::{Config, Operation, OperationKind, Plan, Runner};

fn log(message: &str) -> Operation {
    Operation::new(OperationKind::Log { level: LogLevel::Info, message: message.into() })
}

fn expected_rows(rows: &[(i64, &str)]) -> Vec<ExpectedRow> {
    rows.iter()
        .map(|(i, s)| {
            ExpectedRow(vec![ExpectedValue::Integer(*i), ExpectedValue::String(s.to_string())])
        })
        .collect()
}

fn create_thread(count: usize, test: Vec<Operation>) -> Operation {
    Operation::new(OperationKind::CreateThread { count, body: Plan::new(test, vec![]) })
}

#[test]
fn loop_counts_steps() {
    let (driver, _) = ScriptedDriver::ok();
    let body = vec![log("hi")];
    let plan = Plan::new(vec![Operation::new(OperationKind::Loop { count: 3, body })], vec![]);
    let result = execute(Config::default(), driver, &plan);
    assert_eq!(result.status(), Status::Succeeded);
    assert_eq!(result.steps(), 3);
}

#[test]
fn create_thread_joins_before_continuing() {
    let (driver, events) = ScriptedDriver::ok();
    let plan = Plan::new(
        vec![
            create_thread(
                4,
                vec![
                    Operation::new(OperationKind::Sync { name: "start".into(), parties: 4 }),
                    Operation::statement("worker"),
                ],
            ),
            Operation::statement("after"),
        ],
        vec![],
    );
    let result = execute(Config::default(), driver, &plan);
    assert_eq!(result.status(), Status::Succeeded, "{:?}", result.failure());
    assert_eq!(statements(&events), vec!["worker", "worker", "worker", "worker", "after"]);
    // 4 syncs, 4 worker statements, the thread creation and the last statement.
    assert_eq!(result.steps(), 10);
}

#[test]
fn workers_share_parent_connections() {
    let (driver, events) = ScriptedDriver::ok();
    let plan = Plan::new(
        vec![
            Operation::new(OperationKind::SetOptions(vec![("autocommit".into(), "off".into())])),
            Operation::new(OperationKind::CreateConnection { name: "c2".into(), url: None }),
            create_thread(
                2,
                vec![
                    Operation::statement("inherited"),
                    Operation::new(OperationKind::CreateConnection {
                        name: "own".into(),
                        url: None,
                    }),
                    Operation::statement("own"),
                ],
            ),
            Operation::new(OperationKind::ServerStatement {
                sql: "after".into(),
                connection: Some("default".into()),
            }),
        ],
        vec![],
    );
    let result = execute(Config::default(), driver, &plan);
    assert_eq!(result.status(), Status::Succeeded, "{:?}", result.failure());

    let events: Vec<Event> = events.try_iter().collect();
    let count = |wanted: &Event| events.iter().filter(|e| *e == wanted).count();
    let options = [("autocommit".to_string(), "off".to_string())].into_iter().collect();
    assert_eq!(count(&Event::Connect { name: "c2".into(), options }), 1);
    let execute = |connection: &str, statement: &str| Event::Execute {
        connection: connection.into(),
        statement: statement.into(),
    };
    assert_eq!(count(&execute("c2", "inherited")), 2);
    assert_eq!(count(&execute("own", "own")), 2);
    assert_eq!(count(&execute("default", "after")), 1);
    // Each worker closes its own connection, the primary closes the rest.
    assert_eq!(count(&Event::Close { name: "own".into() }), 2);
    assert_eq!(count(&Event::Close { name: "c2".into() }), 1);
    assert_eq!(count(&Event::Close { name: "default".into() }), 1);
}

#[test]
fn affected_rows() {
    let (driver, _) = ScriptedDriver::new(|_, sql| match sql {
        "UPDATE five" => Ok(StatementResult::Count(5).into()),
        _ => Ok(StatementResult::Count(4).into()),
    });
    let update =
        |sql: &str| Operation::statement(sql).rewrite_with(ExpectedResult::AffectedRows(5));

    let plan = Plan::new(vec![update("UPDATE five")], vec![]);
    assert_eq!(execute(Config::default(), driver.clone(), &plan).status(), Status::Succeeded);

    let plan = Plan::new(vec![update("UPDATE four").at("update.test", 12)], vec![]);
    let result = execute(Config::default(), driver, &plan);
    assert_eq!(result.status(), Status::Failed);
    let failure = result.failure().expect("no failure");
    assert_eq!(
        failure.to_string(),
        "update.test:12: UPDATE four: affected row count mismatch\n  \
         actual: affected: 4\n  expected: AFFECTED ROWS 5"
    );
}

#[test]
fn statement_warnings() {
    let (driver, _) = ScriptedDriver::new(|_, _| {
        let warnings = vec![Warning::new(1265, "truncated")];
        Ok(Response::new(StatementResult::Count(2)).with_warnings(warnings))
    });
    let update = |expected| Operation::statement("UPDATE t").rewrite_with(expected);

    // Warning expectations check the warnings, others the underlying result.
    let plan = Plan::new(
        vec![
            update(ExpectedResult::WarningMessageSubset(vec!["truncated".into()])),
            update(ExpectedResult::WarningCount(1)),
            update(ExpectedResult::AffectedRows(2)),
        ],
        vec![],
    );
    let result = execute(Config::default(), driver.clone(), &plan);
    assert_eq!(result.status(), Status::Succeeded, "{:?}", result.failure());

    let plan = Plan::new(vec![update(ExpectedResult::WarningCount(2))], vec![]);
    assert_eq!(execute(Config::default(), driver, &plan).status(), Status::Failed);
}

#[test]
fn unordered_rows() {
    let (driver, _) = ScriptedDriver::new(|_, sql| match sql {
        "SELECT same" => rows(&[(2, "b"), (1, "a")]),
        _ => rows(&[(2, "b"), (1, "c")]),
    });
    let query = |sql: &str| {
        let expected = expected_rows(&[(1, "a"), (2, "b")]);
        Operation::statement(sql).rewrite_with(ExpectedResult::UnorderedRows(expected))
    };

    let plan = Plan::new(vec![query("SELECT same")], vec![]);
    assert_eq!(execute(Config::default(), driver.clone(), &plan).status(), Status::Succeeded);

    let plan = Plan::new(vec![query("SELECT other")], vec![]);
    let result = execute(Config::default(), driver, &plan);
    assert_eq!(result.status(), Status::Failed);
    let failure = result.failure().expect("no failure");
    assert_eq!(failure.comment, "unexpected row (1, 'c'), closest expected rows: (1, 'a') [0.414]");
    assert_eq!(failure.actual.as_deref(), Some("rows: [(2, 'b'), (1, 'c')]"));
    assert_eq!(failure.expected.as_deref(), Some("UNORDERED ROWS [(1, 'a'), (2, 'b')]"));
}

#[test]
fn failure_cancels_sibling_workers() {
    // The first worker to execute fails, the other goes on to sleep.
    let calls = AtomicUsize::new(0);
    let (driver, _) = ScriptedDriver::new(move |_, _| match calls.fetch_add(1, Ordering::SeqCst) {
        0 => Err(DriverError::new(1205, "lock wait timeout")),
        _ => Ok(StatementResult::Ok.into()),
    });
    let plan = Plan::new(
        vec![
            create_thread(
                2,
                vec![
                    Operation::statement("work"),
                    Operation::new(OperationKind::Sleep(Duration::from_secs(60))),
                ],
            ),
            Operation::statement("unreachable"),
        ],
        vec![],
    );
    let started = Instant::now();
    let result = execute(Config { sleep_interval_ms: 10, ..Config::default() }, driver, &plan);
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(result.status(), Status::Failed);
    let failure = result.failure().expect("no failure");
    assert_eq!(failure.comment, "unexpected error");
    assert_eq!(failure.actual.as_deref(), Some("error 1205: lock wait timeout"));
}

#[test]
fn sync_recovers_from_timeouts() {
    // The first statement outlasts the sync timeout many times over, so the
    // other workers time out, reset the sync point and wait again.
    let calls = AtomicUsize::new(0);
    let (driver, _) = ScriptedDriver::new(move |_, _| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(300));
        }
        Ok(StatementResult::Ok.into())
    });
    let sync = || Operation::new(OperationKind::Sync { name: "s".into(), parties: 3 });
    let body = vec![Operation::statement("work"), sync(), sync()];
    let plan = Plan::new(vec![create_thread(3, body)], vec![]);
    let result = execute(Config { sync_timeout_ms: 20, ..Config::default() }, driver, &plan);
    assert_eq!(result.status(), Status::Succeeded, "{:?}", result.failure());
    assert_eq!(result.steps(), 10);
}

#[test]
fn cleanup_runs_after_failure() {
    let (driver, events) = ScriptedDriver::ok();
    let plan = Plan::new(
        vec![
            Operation::statement("CREATE TABLE t"),
            Operation::new(OperationKind::Fail("stop here".into())),
            Operation::statement("INSERT INTO t"),
        ],
        vec![
            Operation::statement("DROP TABLE t"),
            Operation::new(OperationKind::Fail("cleanup failures are logged".into())),
            Operation::statement("DROP TABLE u"),
        ],
    );
    let result = execute(Config::default(), driver, &plan);
    assert_eq!(result.status(), Status::Failed);
    assert_eq!(result.failure().map(|f| f.actual), Some(Some("failure: stop here".into())));
    assert_eq!(statements(&events), vec!["CREATE TABLE t", "DROP TABLE t", "DROP TABLE u"]);
}

#[test]
fn rejected_threads_are_an_outcome() {
    let config = Config { max_threads: 2, ..Config::default() };
    let (driver, events) = ScriptedDriver::ok();
    // Workers sleep, so the first two are still active when the third is
    // submitted.
    let nap = || Operation::new(OperationKind::Sleep(Duration::from_millis(200)));
    let expected =
        ExpectedResult::FailureMessage(MessageMatch::Prefix("thread pool exhausted".into()));
    let plan = Plan::new(
        vec![
            create_thread(3, vec![nap(), Operation::statement("worker")]).rewrite_with(expected),
            Operation::statement("after"),
        ],
        vec![],
    );
    let result = execute(config.clone(), driver, &plan);
    assert_eq!(result.status(), Status::Succeeded, "{:?}", result.failure());
    // The started workers still ran and were joined.
    assert_eq!(statements(&events), vec!["worker", "worker", "after"]);

    let (driver, _) = ScriptedDriver::ok();
    let plan = Plan::new(vec![create_thread(3, vec![nap()])], vec![]);
    let result = execute(config, driver, &plan);
    assert_eq!(result.status(), Status::Failed);
    assert_eq!(
        result.failure().and_then(|f| f.actual),
        Some("failure: thread pool exhausted, 2 threads active".into())
    );
}

#[test]
fn concurrent_steps_add_up() {
    let (driver, _) = ScriptedDriver::ok();
    let body = vec![Operation::statement("SELECT 1")];
    let body = vec![Operation::new(OperationKind::Loop { count: 25, body })];
    let plan = Plan::new(vec![create_thread(8, body)], vec![]);
    let result = execute(Config::default(), driver, &plan);
    assert_eq!(result.status(), Status::Succeeded);
    assert_eq!(result.steps(), 8 * 25 + 1);
}

#[test]
fn counted_loop_binds_variable() {
    let (driver, _) = ScriptedDriver::ok();
    let plan = Plan::new(
        vec![
            Operation::new(OperationKind::CountedLoop {
                variable: "i".into(),
                count: 3,
                body: vec![log("x")],
            }),
            Operation::new(OperationKind::UnsetVariables(vec!["I".into(), "missing".into()])),
            Operation::new(OperationKind::SetVariables(vec![("n".into(), Value::Integer(1))])),
            Operation::new(OperationKind::UnsetOptions(vec!["missing".into()])),
        ],
        vec![],
    );
    let result = execute(Config::default(), driver, &plan);
    assert_eq!(result.status(), Status::Succeeded);
    assert_eq!(result.steps(), 6);
}

#[test]
fn interrupt_aborts_run() {
    let (driver, _) = ScriptedDriver::ok();
    let mut runner = Runner::new(Config { sleep_interval_ms: 10, ..Config::default() }, driver);
    let interrupt = runner.interrupt();
    let plan = Plan::new(
        vec![Operation::new(OperationKind::Loop {
            count: -1,
            body: vec![Operation::new(OperationKind::Sleep(Duration::from_millis(5)))],
        })],
        vec![log("cleanup")],
    );
    let path = std::path::Path::new("forever.test");
    std::thread::scope(|s| {
        s.spawn(|| {
            std::thread::sleep(Duration::from_millis(50));
            interrupt.interrupt();
        });
        assert_eq!(runner.run("forever", path, &plan).status(), Status::Aborted);
    });
    assert_eq!(runner.run("next", path, &Plan::default()).status(), Status::Aborted);
    let summary = runner.summary();
    assert_eq!((summary.tests, summary.aborted), (2, 2));
}

#[test]
fn record_new_annotates() {
    let (driver, _) = ScriptedDriver::new(|_, sql| match sql {
        "SELECT" => rows(&[(1, "it's")]),
        _ => Err(DriverError::new(1146, "no such table")),
    });
    let plan = Plan::new(
        vec![
            Operation::statement("SELECT").at("a.test", 3).rewrite_with(ExpectedResult::RecordNew),
            Operation::statement("DROP").at("a.test", 1).rewrite_with(ExpectedResult::RecordNew),
        ],
        vec![],
    );
    let result = execute(Config::default(), driver, &plan);
    assert_eq!(result.status(), Status::Succeeded);
    assert_eq!(
        result.annotations(),
        vec![
            Annotation {
                file: "a.test".into(),
                line: 1,
                text: "FAILURE 1146 'no such table'".into(),
            },
            Annotation { file: "a.test".into(), line: 3, text: "ROWS [(1, 'it''s')]".into() },
        ]
    );
}
