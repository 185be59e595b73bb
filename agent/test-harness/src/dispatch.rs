use crate::cluster::run_guarded;
use crate::registry::TestDescriptor;
use crate::retry::{retry, RetryPolicy};
use crate::{BoxError, MachineHandle, TestCluster, TestRegistry};
use async_trait::async_trait;
use log::{error, info};
use model::{DispatchReport, Failure, FailureKind, Filter, Outcome, TestReport};
use std::sync::Arc;
use std::time::Duration;

/// A condition that must hold before a test's entry point is invoked. If the check fails, the
/// test fails without running.
#[async_trait]
pub trait Precondition: Send + Sync {
    async fn check(&self, cluster: &TestCluster) -> Result<(), BoxError>;
}

/// Reports whether the cluster's coordination service considers all members healthy, as seen
/// from `machine`.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn cluster_health(
        &self,
        cluster: &TestCluster,
        machine: &MachineHandle,
        expected_members: usize,
    ) -> Result<(), BoxError>;
}

/// A [`Precondition`] that polls a [`HealthCheck`] from the first machine until every machine of
/// the cluster is reported healthy or the retry policy runs out.
pub struct ClusterHealth {
    check: Arc<dyn HealthCheck>,
    policy: RetryPolicy,
}

impl ClusterHealth {
    pub fn new(check: Arc<dyn HealthCheck>, policy: RetryPolicy) -> Self {
        Self { check, policy }
    }
}

#[async_trait]
impl Precondition for ClusterHealth {
    async fn check(&self, cluster: &TestCluster) -> Result<(), BoxError> {
        let machine = cluster
            .machines()
            .first()
            .ok_or("the cluster has no machines")?;
        let expected_members = cluster.machines().len();
        retry(self.policy, || {
            self.check
                .cluster_health(cluster, machine, expected_members)
        })
        .await
        .map_err(|e| -> BoxError {
            format!(
                "cluster not healthy after {} attempts: {}",
                self.policy.max_attempts(),
                e
            )
            .into()
        })
    }
}

/// The ways a set of tests can be dispatched. They differ only in what must hold before each
/// test starts.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DispatchMode {
    /// Tests that need a single machine and nothing else.
    Local,
    /// Tests that need the whole cluster to have formed; waits for cluster health first.
    Clustered,
    /// Tests that need internet access. Selection is already gated by
    /// [`Flag::RequiresInternetAccess`](model::Flag::RequiresInternetAccess) in the filter.
    Internet,
}

/// Runs the registered tests that match a filter against a set of machines, one after another,
/// and collects a report. A failing test never prevents the following tests from running.
pub struct TestDispatcher<'a> {
    registry: &'a TestRegistry,
    precondition: Option<Arc<dyn Precondition>>,
    default_timeout: Option<Duration>,
}

impl<'a> TestDispatcher<'a> {
    pub fn new(registry: &'a TestRegistry) -> Self {
        Self {
            registry,
            precondition: None,
            default_timeout: None,
        }
    }

    /// Creates a dispatcher with the precondition that `mode` calls for. `health_check` and
    /// `policy` are only used by [`DispatchMode::Clustered`].
    pub fn for_mode(
        registry: &'a TestRegistry,
        mode: DispatchMode,
        health_check: Arc<dyn HealthCheck>,
        policy: RetryPolicy,
    ) -> Self {
        let dispatcher = Self::new(registry);
        match mode {
            DispatchMode::Local | DispatchMode::Internet => dispatcher,
            DispatchMode::Clustered => {
                dispatcher.with_precondition(Arc::new(ClusterHealth::new(health_check, policy)))
            }
        }
    }

    /// Checked before every test, ahead of the test's own precondition.
    pub fn with_precondition(mut self, precondition: Arc<dyn Precondition>) -> Self {
        self.precondition = Some(precondition);
        self
    }

    /// The time limit for tests that do not set their own.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Runs every registered test that matches `filter` against `machines`, in registration order.
    pub async fn dispatch(&self, machines: &[MachineHandle], filter: &Filter) -> DispatchReport {
        let machines: Arc<[MachineHandle]> = Arc::from(machines);
        let mut report = DispatchReport::default();
        for descriptor in self.registry.list_matching(filter) {
            report
                .tests
                .push(self.dispatch_one(descriptor, &machines).await);
        }
        info!(
            "Dispatch finished: {} passed, {} failed",
            report.num_passed(),
            report.num_failed()
        );
        report
    }

    async fn dispatch_one(
        &self,
        descriptor: &TestDescriptor,
        machines: &Arc<[MachineHandle]>,
    ) -> TestReport {
        if machines.len() < descriptor.cluster_size() {
            let message = format!(
                "test requires {} machines but the cluster has {}",
                descriptor.cluster_size(),
                machines.len()
            );
            error!("Not running '{}': {}", descriptor.name(), message);
            return TestReport {
                name: descriptor.name().to_string(),
                outcome: Outcome::Fail,
                duration: Duration::ZERO,
                failures: vec![Failure::new(FailureKind::InsufficientResources, message)],
                subtests: Vec::new(),
            };
        }

        let cluster = TestCluster::new(
            descriptor.name(),
            Arc::clone(machines),
            Arc::clone(descriptor.native_functions()),
        );
        // The time limit covers the entry point only, not the wait for preconditions.
        let timeout = descriptor.timeout().or(self.default_timeout);
        run_guarded(
            cluster,
            |c| async move {
                let preconditions = self.precondition.iter().chain(descriptor.precondition());
                for precondition in preconditions {
                    if let Err(e) = precondition.check(&c).await {
                        return Err(c.abort(FailureKind::Precondition, e.to_string()));
                    }
                }
                Ok(())
            },
            |c| descriptor.invoke(c),
            timeout,
        )
        .await
    }
}
