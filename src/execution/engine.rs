use super::barrier::BarrierWait;
use super::context::{AbortHandle, ExecutionContext, DEFAULT_CONNECTION};
use super::result::{Annotation, Failure, TestResult};
use crate::config::Config;
use crate::driver::{format_warnings, Driver};
use crate::error::{Error, Result};
use crate::expect::{Outcome, Verdict};
use crate::plan::{Operation, OperationKind, Phase, Plan};
use crate::types::Value;

use log::{debug, error, info, log, warn};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Executes a test plan on the calling thread, which becomes the test's
/// primary thread.
pub struct Engine {
    ctx: ExecutionContext,
}

impl Engine {
    pub fn new(config: Arc<Config>, driver: Arc<dyn Driver>, result: Arc<TestResult>) -> Self {
        Self { ctx: ExecutionContext::new(config, driver, result) }
    }

    pub fn result(&self) -> &Arc<TestResult> {
        self.ctx.result()
    }

    /// Returns a handle to abort the test from another thread.
    pub fn abort_handle(&self) -> AbortHandle {
        self.ctx.abort_handle()
    }

    /// Executes the plan: opens the default connection, runs the test
    /// operations until they complete or the test is cancelled, latches the
    /// result and runs the cleanup operations. Worker threads spawned by the
    /// plan have all been joined when this returns.
    pub fn execute(self, plan: &Plan) {
        let Self { mut ctx } = self;
        let result = ctx.result().clone();
        if !result.start() {
            info!("Test {} aborted before starting", result.name());
            return;
        }
        info!("Executing test {}", result.name());

        match ctx.connect(DEFAULT_CONNECTION, None) {
            Ok(()) => {
                run_all(plan.test(), &mut ctx);
            }
            Err(err) => {
                let failure = Failure::message(format!("failed to open default connection: {err}"));
                ctx.mark_as_failed(failure.into());
            }
        }
        ctx.mark_as_succeeded();
        ctx.stop_testing();
        run_cleanup(plan.cleanup(), &mut ctx);

        // Flushes steps and closes connections.
        drop(ctx);
        info!(
            "Test {} finished with status {} after {} steps in {:.3}s",
            result.name(),
            result.status(),
            result.steps(),
            result.duration().as_secs_f64()
        );
    }
}

/// Returns true if the operation may still run: cleanup operations always
/// run, test operations only until the test is cancelled.
fn proceed(phase: Phase, ctx: &ExecutionContext) -> bool {
    phase == Phase::Cleanup || ctx.continue_testing()
}

/// Records a failed operation. Test failures fail the test and cancel it,
/// cleanup failures are only logged.
fn record_failure(phase: Phase, error: Error, ctx: &ExecutionContext) {
    match phase {
        Phase::Test => ctx.mark_as_failed(error),
        Phase::Cleanup => {
            error!("Cleanup of test {} failed: {}", ctx.result().name(), Failure::from(error))
        }
    }
}

/// Runs operations in order, stopping at the first failure or when the test
/// is cancelled. Returns true if all operations ran.
fn run_all<'a>(ops: impl IntoIterator<Item = &'a Operation>, ctx: &mut ExecutionContext) -> bool {
    for op in ops {
        if !proceed(op.phase(), ctx) {
            return false;
        }
        if let Err(error) = op.execute(ctx) {
            record_failure(op.phase(), error, ctx);
            return false;
        }
    }
    true
}

/// Runs cleanup operations, continuing past failures.
fn run_cleanup(ops: &[Operation], ctx: &mut ExecutionContext) {
    for op in ops {
        if let Err(error) = op.execute(ctx) {
            record_failure(op.phase(), error, ctx);
        }
    }
}

/// Runs a thread body on a worker thread, consuming the worker's context.
fn run_worker(body: &Plan, mut ctx: ExecutionContext) {
    debug!("Worker {} started", std::thread::current().name().unwrap_or_default());
    run_all(body.test(), &mut ctx);
    run_cleanup(body.cleanup(), &mut ctx);
}

/// Extracts the message of a thread panic.
fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

impl Operation {
    /// Executes the operation and verifies its outcome against the expected
    /// result. Test operations do nothing once the test is cancelled.
    ///
    /// Failures of operations nested in loops and threads are recorded on
    /// the test result and not returned, so an error is only returned for
    /// this operation's own mismatch or for internal errors.
    pub fn execute(&self, ctx: &mut ExecutionContext) -> Result<()> {
        if !proceed(self.phase(), ctx) {
            return Ok(());
        }
        debug!("{}: {}", self.source(), self.description());

        let outcome = match self.kind() {
            OperationKind::Log { level, message } => {
                log!(*level, "{message}");
                Outcome::Success
            }

            OperationKind::Sleep(duration) => {
                self.sleep(*duration, ctx);
                Outcome::Success
            }

            OperationKind::Sync { name, parties } => {
                let barrier = ctx.barrier(name, *parties);
                loop {
                    match barrier.wait(ctx.config().sync_timeout()) {
                        BarrierWait::Released => break,
                        BarrierWait::TimedOut | BarrierWait::Broken => {
                            if barrier.reset_if_broken() {
                                debug!("{}: reset sync point {name}", self.source());
                            }
                            if !proceed(self.phase(), ctx) {
                                return Ok(());
                            }
                        }
                    }
                }
                Outcome::Success
            }

            OperationKind::CreateConnection { name, url } => {
                match ctx.connect(name, url.as_deref()) {
                    Ok(()) => Outcome::Success,
                    Err(err) => Outcome::Error(err),
                }
            }

            OperationKind::UseConnection(name) => match ctx.use_connection(name) {
                true => Outcome::Success,
                false => Outcome::Failure(format!("unknown connection {name}")),
            },

            OperationKind::DropConnection(name) => match ctx.drop_connection(name) {
                true => Outcome::Success,
                false => Outcome::Failure(format!("unknown connection {name}")),
            },

            OperationKind::SetOptions(options) => {
                for (name, value) in options {
                    ctx.set_option(name, value);
                }
                Outcome::Success
            }

            OperationKind::UnsetOptions(names) => {
                for name in names {
                    if !ctx.unset_option(name) {
                        warn!("{}: option {name} is not set", self.source());
                    }
                }
                Outcome::Success
            }

            OperationKind::SetVariables(variables) => {
                for (name, value) in variables {
                    ctx.set_variable(name, value.clone());
                }
                Outcome::Success
            }

            OperationKind::UnsetVariables(names) => {
                for name in names {
                    if !ctx.unset_variable(name) {
                        warn!("{}: variable {name} is not set", self.source());
                    }
                }
                Outcome::Success
            }

            OperationKind::Fail(message) => Outcome::Failure(message.clone()),

            OperationKind::ServerStatement { sql, connection } => {
                self.execute_statement(sql, connection.as_deref(), ctx)?
            }

            OperationKind::Loop { count, body } => {
                let mut iteration = 0;
                while (*count < 0 || iteration < *count) && proceed(self.phase(), ctx) {
                    if !run_all(body, ctx) {
                        break;
                    }
                    iteration += 1;
                }
                return Ok(());
            }

            OperationKind::CountedLoop { variable, count, body } => {
                for iteration in 1..=*count {
                    if !proceed(self.phase(), ctx) {
                        break;
                    }
                    let iteration = iteration.try_into().unwrap_or(i64::MAX);
                    ctx.set_variable(variable, Value::Integer(iteration));
                    if !run_all(body, ctx) {
                        break;
                    }
                }
                return Ok(());
            }

            OperationKind::TimedLoop { duration, body } => {
                let deadline = Instant::now() + *duration;
                while Instant::now() < deadline && proceed(self.phase(), ctx) {
                    if !run_all(body, ctx) {
                        break;
                    }
                }
                return Ok(());
            }

            OperationKind::Shuffle(body) => {
                let mut order = body.iter().collect::<Vec<_>>();
                ctx.shuffle(&mut order);
                run_all(order, ctx);
                return Ok(());
            }

            OperationKind::CreateThread { count, body } => self.create_threads(*count, body, ctx),
        };
        self.verify(outcome, ctx)
    }

    /// Counts the operation as a step and checks its outcome.
    fn verify(&self, outcome: Outcome, ctx: &mut ExecutionContext) -> Result<()> {
        ctx.add_step();
        match self.expected().check(&outcome) {
            Ok(Verdict::Matched) => Ok(()),
            Ok(Verdict::Recorded(text)) => {
                let source = self.source();
                ctx.annotate(Annotation { file: source.file.clone(), line: source.line, text });
                Ok(())
            }
            Err(mismatch) => Err(Failure::mismatch(self, mismatch).into()),
        }
    }

    /// Sleeps for the given duration. Test operations sleep in chunks and
    /// wake early if the test is cancelled.
    fn sleep(&self, duration: Duration, ctx: &ExecutionContext) {
        if self.phase() == Phase::Cleanup {
            std::thread::sleep(duration);
            return;
        }
        let deadline = Instant::now() + duration;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let interval = remaining.min(ctx.config().sleep_interval());
            if remaining.is_zero() || ctx.wait_for_cleanup(interval) {
                return;
            }
        }
    }

    /// Executes a statement on the named or current connection.
    fn execute_statement(
        &self,
        sql: &str,
        connection: Option<&str>,
        ctx: &ExecutionContext,
    ) -> Result<Outcome> {
        let Some(conn) = ctx.connection(connection)? else {
            let name = connection.unwrap_or_default();
            return Ok(Outcome::Failure(format!("unknown connection {name}")));
        };
        let outcome = Outcome::from(conn.lock()?.execute(sql));
        if !self.expected().is_mute() {
            match &outcome {
                Outcome::Error(err) => warn!("{}: {err}", self.source()),
                Outcome::Warning { warnings, .. } => {
                    warn!("{}: warnings {}", self.source(), format_warnings(warnings))
                }
                _ => {}
            }
        }
        Ok(outcome)
    }

    /// Runs the thread body on count workers, waiting for all of them to
    /// finish. If the pool rejects a worker, no further workers are started
    /// and the rejection becomes the outcome once the started ones finish.
    fn create_threads(&self, count: usize, body: &Plan, ctx: &ExecutionContext) -> Outcome {
        let rejection = std::thread::scope(|s| {
            let mut handles = Vec::with_capacity(count);
            let mut rejection = None;
            for i in 1..=count {
                let worker = ctx.fork();
                let name = format!("{}-worker-{i}", ctx.result().name());
                match ctx.pool().spawn(s, name, move || run_worker(body, worker)) {
                    Ok(handle) => handles.push(handle),
                    Err(message) => {
                        rejection = Some(message);
                        break;
                    }
                }
            }
            for handle in handles {
                if let Err(panic) = handle.join() {
                    let message = format!("worker thread panicked: {}", panic_message(&*panic));
                    ctx.mark_as_failed(Failure::at(self, message).into());
                }
            }
            rejection
        });
        match rejection {
            Some(message) => Outcome::Failure(message),
            None => Outcome::Success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Connection, DriverError, Response, StatementResult};
    use crate::expect::ExpectedResult;
    use crate::execution::Status;
    use crate::plan::LogLevel;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// A driver that records executed statements and answers "SELECT n"
    /// with an update count of n.
    #[derive(Default)]
    struct EchoDriver {
        statements: Arc<Mutex<Vec<String>>>,
        refuse: bool,
    }

    struct EchoConnection(Arc<Mutex<Vec<String>>>);

    impl Driver for EchoDriver {
        fn connect(
            &self,
            _: &str,
            _: Option<&str>,
            _: &BTreeMap<String, String>,
        ) -> std::result::Result<Box<dyn Connection>, DriverError> {
            if self.refuse {
                return Err(DriverError::new(2003, "connection refused"));
            }
            Ok(Box::new(EchoConnection(self.statements.clone())))
        }
    }

    impl Connection for EchoConnection {
        fn execute(&mut self, statement: &str) -> std::result::Result<Response, DriverError> {
            self.0.lock().expect("poisoned").push(statement.to_string());
            match statement.strip_prefix("SELECT ").and_then(|n| n.parse().ok()) {
                Some(n) => Ok(StatementResult::Count(n).into()),
                None => Err(DriverError::new(1064, "syntax error")),
            }
        }
    }

    fn execute(driver: EchoDriver, plan: Plan) -> Arc<TestResult> {
        let config = Config { seed: Some(1), ..Config::default() };
        let result = Arc::new(TestResult::new("test"));
        Engine::new(Arc::new(config), Arc::new(driver), result.clone()).execute(&plan);
        result
    }

    fn log(message: &str) -> Operation {
        Operation::new(OperationKind::Log { level: LogLevel::Debug, message: message.into() })
    }

    #[test]
    fn succeeds() {
        let plan = Plan::new(
            vec![
                Operation::statement("SELECT 1").rewrite_with(ExpectedResult::AffectedRows(1)),
                Operation::statement("bogus").rewrite_with(ExpectedResult::FailureAny),
                log("done"),
            ],
            vec![],
        );
        let result = execute(EchoDriver::default(), plan);
        assert_eq!(result.status(), Status::Succeeded);
        assert_eq!(result.steps(), 3);
    }

    #[test]
    fn mismatch_fails_and_runs_cleanup() {
        let driver = EchoDriver::default();
        let statements = driver.statements.clone();
        let plan = Plan::new(
            vec![
                Operation::statement("SELECT 4")
                    .at("t.test", 2)
                    .rewrite_with(ExpectedResult::AffectedRows(5)),
                Operation::statement("SELECT 2"),
            ],
            vec![Operation::statement("SELECT 3"), Operation::statement("SELECT 9")],
        );
        let result = execute(driver, plan);
        assert_eq!(result.status(), Status::Failed);
        let failure = result.failure().expect("no failure");
        assert_eq!(failure.comment, "affected row count mismatch");
        assert_eq!(failure.actual.as_deref(), Some("affected: 4"));
        assert_eq!(failure.source.map(|s| s.line), Some(2));
        assert_eq!(*statements.lock().expect("poisoned"), vec!["SELECT 4", "SELECT 3", "SELECT 9"]);
    }

    #[test]
    fn default_connection_failure() {
        let plan = Plan::new(vec![log("unreachable")], vec![]);
        let result = execute(EchoDriver { refuse: true, ..EchoDriver::default() }, plan);
        assert_eq!(result.status(), Status::Failed);
        assert_eq!(
            result.failure().map(|f| f.comment),
            Some("failed to open default connection: error 2003: connection refused".into())
        );
        assert_eq!(result.steps(), 0);
    }

    #[test]
    fn unknown_connection() {
        let on = |sql: &str, connection: &str| {
            let kind = OperationKind::ServerStatement {
                sql: sql.into(),
                connection: Some(connection.into()),
            };
            Operation::new(kind)
        };
        let plan = Plan::new(
            vec![
                on("SELECT 1", "c2").rewrite_with(ExpectedResult::FailureAny),
                Operation::new(OperationKind::CreateConnection { name: "c2".into(), url: None }),
                on("SELECT 1", "c2"),
                Operation::new(OperationKind::DropConnection("c2".into())),
                Operation::new(OperationKind::UseConnection("c2".into()))
                    .rewrite_with(ExpectedResult::FailureAny),
            ],
            vec![],
        );
        let result = execute(EchoDriver::default(), plan);
        assert_eq!(result.status(), Status::Succeeded, "{:?}", result.failure());
    }

    #[test]
    fn loops() {
        let driver = EchoDriver::default();
        let statements = driver.statements.clone();
        let plan = Plan::new(
            vec![
                Operation::new(OperationKind::Loop { count: 3, body: vec![log("hi")] }),
                Operation::new(OperationKind::Loop { count: 0, body: vec![log("never")] }),
                Operation::new(OperationKind::CountedLoop {
                    variable: "i".into(),
                    count: 2,
                    body: vec![Operation::statement("SELECT 1")],
                }),
                Operation::new(OperationKind::Shuffle(vec![
                    Operation::statement("SELECT 1"),
                    Operation::statement("SELECT 2"),
                    Operation::statement("SELECT 3"),
                ])),
                Operation::new(OperationKind::TimedLoop {
                    duration: Duration::ZERO,
                    body: vec![log("never")],
                }),
            ],
            vec![],
        );
        let result = execute(driver, plan);
        assert_eq!(result.status(), Status::Succeeded);
        assert_eq!(result.steps(), 8);
        let mut shuffled = statements.lock().expect("poisoned")[2..].to_vec();
        shuffled.sort();
        assert_eq!(shuffled, vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
    }

    #[test]
    fn loop_forever_stops_on_failure() {
        let plan = Plan::new(
            vec![Operation::new(OperationKind::Loop {
                count: -1,
                body: vec![log("once"), Operation::new(OperationKind::Fail("stop".into()))],
            })],
            vec![log("cleanup")],
        );
        let result = execute(EchoDriver::default(), plan);
        assert_eq!(result.status(), Status::Failed);
        assert_eq!(result.failure().map(|f| f.comment), Some("unexpected failure".into()));
        assert_eq!(result.steps(), 3);
    }

    #[test]
    fn abort_wakes_sleeping_workers() {
        let sleep = Operation::new(OperationKind::Sleep(Duration::from_secs(60)));
        let plan = Plan::new(
            vec![Operation::new(OperationKind::CreateThread {
                count: 2,
                body: Plan::new(vec![sleep], vec![log("worker cleanup")]),
            })],
            vec![log("cleanup")],
        );
        let result = Arc::new(TestResult::new("test"));
        let driver = Arc::new(EchoDriver::default());
        let engine = Engine::new(Arc::new(Config::default()), driver, result.clone());
        let handle = engine.abort_handle();
        let started = Instant::now();
        std::thread::scope(|s| {
            s.spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                handle.abort();
            });
            engine.execute(&plan);
        });
        assert!(started.elapsed() < Duration::from_secs(30));
        assert_eq!(result.status(), Status::Aborted);
        assert_eq!(result.failure().map(|f| f.comment), Some("aborted".into()));
    }

    #[test]
    fn record_new() {
        let plan = Plan::new(
            vec![Operation::statement("SELECT 7")
                .at("t.test", 4)
                .rewrite_with(ExpectedResult::RecordNew)],
            vec![],
        );
        let result = execute(EchoDriver::default(), plan);
        assert_eq!(result.status(), Status::Succeeded);
        assert_eq!(
            result.annotations(),
            vec![Annotation { file: "t.test".into(), line: 4, text: "AFFECTED ROWS 7".into() }]
        );
    }
}
