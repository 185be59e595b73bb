use crate::error::{self, CommandError};
use crate::native::NativeCatalog;
use crate::MachineHandle;
use log::{debug, error, info, warn};
use model::constants::{NATIVE_RUNNER, SUBTEST_SEPARATOR};
use model::{Failure, FailureKind, Outcome, TestReport};
use snafu::ResultExt;
use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Proof that the current test or subtest has been aborted. It can only be obtained from a
/// [`TestCluster`], which records the failure at the same time, so a test body propagates it with
/// `?` and nothing after the failed step runs.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Fatal {
    message: String,
}

impl Fatal {
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Fatal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Fatal {}

/// What a test body or subtest body returns.
pub type TestResult = std::result::Result<(), Fatal>;

#[derive(Default)]
struct Scope {
    failures: Vec<Failure>,
    subtests: Vec<TestReport>,
    cleanups: Vec<Cleanup>,
    /// The subtest currently running under this scope, so a time limit that interrupts it can
    /// still clean up after it and report it.
    running: Vec<Running>,
}

struct Running {
    cluster: TestCluster,
    started: Instant,
}

struct Cleanup {
    machine: MachineHandle,
    command: String,
}

/// The view of the cluster that a running test gets: the machines it may use, the native
/// functions of the test, and the failure scope of the test or subtest that is currently running.
///
/// Cloning a `TestCluster` gives another handle to the same scope. Subtests started with
/// [`TestCluster::run`] get a handle with a scope of their own.
#[derive(Clone)]
pub struct TestCluster {
    name: String,
    test_name: Arc<str>,
    machines: Arc<[MachineHandle]>,
    natives: Arc<NativeCatalog>,
    scope: Arc<Mutex<Scope>>,
}

impl Debug for TestCluster {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCluster")
            .field("name", &self.name)
            .field(
                "machines",
                &self.machines.iter().map(|m| m.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl TestCluster {
    pub(crate) fn new(
        test_name: &str,
        machines: Arc<[MachineHandle]>,
        natives: Arc<NativeCatalog>,
    ) -> Self {
        Self {
            name: test_name.to_string(),
            test_name: Arc::from(test_name),
            machines,
            natives,
            scope: Arc::default(),
        }
    }

    fn child(&self, name: &str) -> Self {
        Self {
            name: format!("{}{}{}", self.name, SUBTEST_SEPARATOR, name),
            test_name: Arc::clone(&self.test_name),
            machines: Arc::clone(&self.machines),
            natives: Arc::clone(&self.natives),
            scope: Arc::default(),
        }
    }

    fn scope(&self) -> MutexGuard<'_, Scope> {
        // A panic while the lock was held leaves the scope usable; we only ever push to it.
        self.scope.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The full name of the running test or subtest, e.g. `rkt.base/cli`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn machines(&self) -> &[MachineHandle] {
        &self.machines
    }

    /// Gets a machine by its position in the cluster. Asking for a machine the cluster does not
    /// have aborts the current (sub)test.
    pub fn machine(&self, index: usize) -> Result<MachineHandle, Fatal> {
        match self.machines.get(index) {
            Some(machine) => Ok(Arc::clone(machine)),
            None => Err(self.fatal(format!(
                "machine {} requested but the cluster has {}",
                index,
                self.machines.len()
            ))),
        }
    }

    /// Runs `command` on `machine` and returns its stdout. A command that cannot be run or exits
    /// with a non-zero status is returned as an error for the caller to handle; nothing is recorded
    /// against the test.
    pub async fn ssh(&self, machine: &MachineHandle, command: &str) -> Result<Vec<u8>, CommandError> {
        debug!("[{}] {}: running '{}'", self.name, machine.id(), command);
        let output = machine
            .execute(command)
            .await
            .context(error::TransportSnafu {
                machine: machine.id(),
                command,
            })?;
        if output.success() {
            Ok(output.stdout)
        } else {
            error::ExitSnafu {
                machine: machine.id(),
                command,
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            }
            .fail()
        }
    }

    /// Runs `command` on `machine` and returns its stdout. If the command fails, the failure is
    /// recorded and the returned [`Fatal`] aborts the current (sub)test when propagated with `?`.
    pub async fn must_ssh(&self, machine: &MachineHandle, command: &str) -> Result<Vec<u8>, Fatal> {
        self.ssh(machine, command).await.map_err(|e| self.fatal(e))
    }

    /// Registers a command to run on `machine` when the current (sub)test ends, however it ends.
    /// Commands run in the reverse order of registration and their failures are only logged.
    pub fn defer_ssh<S>(&self, machine: &MachineHandle, command: S)
    where
        S: Into<String>,
    {
        self.scope().cleanups.push(Cleanup {
            machine: Arc::clone(machine),
            command: command.into(),
        });
    }

    /// Records `err` as a fatal failure of the current (sub)test. Return the result from the test
    /// body to stop it.
    pub fn fatal<D>(&self, err: D) -> Fatal
    where
        D: Display,
    {
        self.abort(FailureKind::Fatal, err.to_string())
    }

    /// Records `err` as a failure of the current (sub)test and lets it continue.
    pub fn error<D>(&self, err: D)
    where
        D: Display,
    {
        let message = err.to_string();
        error!("[{}] {}", self.name, message);
        self.scope()
            .failures
            .push(Failure::new(FailureKind::Error, message));
    }

    pub(crate) fn abort(&self, kind: FailureKind, message: String) -> Fatal {
        error!("[{}] {}: {}", self.name, kind, message);
        self.scope()
            .failures
            .push(Failure::new(kind, message.clone()));
        Fatal { message }
    }

    /// Whether anything has failed in the current (sub)test so far, including its subtests.
    pub fn failed(&self) -> bool {
        let scope = self.scope();
        !scope.failures.is_empty() || scope.subtests.iter().any(|s| !s.passed())
    }

    /// Runs `body` as a subtest named `name`. The subtest gets its own failure scope: a fatal
    /// abort inside it stops only the subtest, and the caller carries on with the next step. A
    /// failed subtest fails the parent. Returns whether the subtest passed.
    pub async fn run<F, Fut>(&self, name: &str, body: F) -> bool
    where
        F: FnOnce(TestCluster) -> Fut,
        Fut: Future<Output = TestResult>,
    {
        let child = self.child(name);
        self.scope().running.push(Running {
            cluster: child.clone(),
            started: Instant::now(),
        });
        let report = run_scoped(child.clone(), body, None).await;
        let passed = report.passed();
        let mut scope = self.scope();
        scope
            .running
            .retain(|running| !Arc::ptr_eq(&running.cluster.scope, &child.scope));
        scope.subtests.push(report);
        passed
    }

    /// The names of the native functions of the running test, sorted.
    pub fn list_native_functions(&self) -> Vec<String> {
        self.natives.names().map(String::from).collect()
    }

    /// Runs the native function `function` of the running test on `machine`, as a subtest named
    /// after the function. An unknown function fails the subtest without contacting the machine.
    pub async fn run_native(&self, function: &str, machine: &MachineHandle) -> bool {
        self.run(function, |c| async move {
            if !self.natives.contains(function) {
                return Err(c.fatal(format!(
                    "test '{}' has no native function named '{}'",
                    self.test_name, function
                )));
            }
            let command = format!("{} run {} {}", NATIVE_RUNNER, self.test_name, function);
            c.must_ssh(machine, &command).await?;
            Ok(())
        })
        .await
    }

    fn pop_cleanup(&self) -> Option<Cleanup> {
        self.scope().cleanups.pop()
    }

    fn pop_running(&self) -> Option<Running> {
        self.scope().running.pop()
    }

    /// Ends the subtests that were still running when a time limit dropped their bodies,
    /// innermost first: each one is reported as timed out after its cleanups have run.
    fn interrupt_running(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            while let Some(running) = self.pop_running() {
                let child = running.cluster;
                child.interrupt_running().await;
                child.abort(
                    FailureKind::Timeout,
                    "interrupted by the time limit of an enclosing test".to_string(),
                );
                child.run_cleanups().await;
                let report = child.report(Outcome::Timeout, running.started.elapsed());
                self.scope().subtests.push(report);
            }
        })
    }

    async fn run_cleanups(&self) {
        while let Some(cleanup) = self.pop_cleanup() {
            if let Err(e) = self.ssh(&cleanup.machine, &cleanup.command).await {
                warn!("[{}] cleanup failed: {}", self.name, e);
            }
        }
    }

    /// Ends the scope: records how the body finished, runs deferred cleanups and builds the
    /// report. `result` is `None` when the body ran out of time.
    async fn conclude(
        &self,
        result: Option<TestResult>,
        limit: Option<Duration>,
        started: Instant,
    ) -> TestReport {
        let recorded = !self.scope().failures.is_empty();
        match (&result, limit) {
            (None, Some(limit)) => {
                self.interrupt_running().await;
                self.abort(
                    FailureKind::Timeout,
                    format!("did not finish within {:?}", limit),
                );
            }
            (Some(Err(fatal)), _) if !recorded => {
                // The abort was recorded against another scope, e.g. a parent handle used inside
                // a subtest body. Make sure this scope shows it failed too.
                self.abort(FailureKind::Fatal, fatal.message.clone());
            }
            _ => {}
        }

        self.run_cleanups().await;

        let outcome = if result.is_none() {
            Outcome::Timeout
        } else if self.failed() {
            Outcome::Fail
        } else {
            Outcome::Pass
        };
        self.report(outcome, started.elapsed())
    }

    /// Turns the scope into a report, leaving it empty.
    fn report(&self, outcome: Outcome, duration: Duration) -> TestReport {
        let scope = std::mem::take(&mut *self.scope());
        info!(
            "--- {}: {} ({:.2}s)",
            outcome.to_string().to_uppercase(),
            self.name,
            duration.as_secs_f64()
        );
        TestReport {
            name: self.name.clone(),
            outcome,
            duration,
            failures: scope.failures,
            subtests: scope.subtests,
        }
    }
}

/// Runs `body` against `cluster`, bounded by `limit` if given, and turns its scope into a report.
pub(crate) async fn run_scoped<F, Fut>(
    cluster: TestCluster,
    body: F,
    limit: Option<Duration>,
) -> TestReport
where
    F: FnOnce(TestCluster) -> Fut,
    Fut: Future<Output = TestResult>,
{
    run_guarded(cluster, |_| async { Ok(()) }, body, limit).await
}

/// Like [`run_scoped`], but runs `guard` first. `body` only runs if `guard` succeeds, and `limit`
/// bounds `body` alone.
pub(crate) async fn run_guarded<G, GFut, F, Fut>(
    cluster: TestCluster,
    guard: G,
    body: F,
    limit: Option<Duration>,
) -> TestReport
where
    G: FnOnce(TestCluster) -> GFut,
    GFut: Future<Output = TestResult>,
    F: FnOnce(TestCluster) -> Fut,
    Fut: Future<Output = TestResult>,
{
    info!("=== RUN   {}", cluster.name);
    let started = Instant::now();
    let result = match guard(cluster.clone()).await {
        Ok(()) => {
            let future = body(cluster.clone());
            match limit {
                Some(limit) => tokio::time::timeout(limit, future).await.ok(),
                None => Some(future.await),
            }
        }
        Err(fatal) => Some(Err(fatal)),
    };
    cluster.conclude(result, limit, started).await
}
