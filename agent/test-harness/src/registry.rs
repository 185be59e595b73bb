use crate::dispatch::Precondition;
use crate::error::{self, RegistryError};
use crate::native::{NativeCatalog, NativeFunction};
use crate::{TestCluster, TestResult};
use log::{debug, warn};
use model::{Applicability, Filter, Flag, ProvisioningHint, UserData};
use snafu::ensure;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

type TestFuture = Pin<Box<dyn Future<Output = TestResult> + Send + 'static>>;
type EntryPoint = Arc<dyn Fn(TestCluster) -> TestFuture + Send + Sync>;

/// Everything the harness knows about one test: its entry point, how many machines it needs,
/// where it applies, and how its machines should be provisioned. Built once with the `with_*`
/// methods and handed to [`TestRegistry::register`].
#[derive(Clone)]
pub struct TestDescriptor {
    name: String,
    run: EntryPoint,
    cluster_size: usize,
    applicability: Applicability,
    hints: BTreeSet<ProvisioningHint>,
    user_data: Option<UserData>,
    native_functions: Arc<NativeCatalog>,
    precondition: Option<Arc<dyn Precondition>>,
    timeout: Option<Duration>,
}

impl Debug for TestDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDescriptor")
            .field("name", &self.name)
            .field("cluster_size", &self.cluster_size)
            .field("applicability", &self.applicability)
            .field("hints", &self.hints)
            .field("user_data", &self.user_data)
            .field("native_functions", &self.native_functions)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TestDescriptor {
    /// Creates a descriptor for a test named `name` that runs `run` on a single machine, on every
    /// distro and platform, with no flags.
    pub fn new<S, F, Fut>(name: S, run: F) -> Self
    where
        S: Into<String>,
        F: Fn(TestCluster) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TestResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Arc::new(move |cluster| -> TestFuture { Box::pin(run(cluster)) }),
            cluster_size: 1,
            applicability: Applicability::default(),
            hints: BTreeSet::new(),
            user_data: None,
            native_functions: Arc::default(),
            precondition: None,
            timeout: None,
        }
    }

    pub fn with_cluster_size(mut self, cluster_size: usize) -> Self {
        self.cluster_size = cluster_size;
        self
    }

    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.applicability.flags.insert(flag);
        self
    }

    /// Limits the test to the given distros. Without this the test applies to every distro.
    pub fn with_distros<I, S>(mut self, distros: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.applicability
            .distros
            .extend(distros.into_iter().map(Into::into));
        self
    }

    pub fn with_excluded_distros<I, S>(mut self, distros: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.applicability
            .exclude_distros
            .extend(distros.into_iter().map(Into::into));
        self
    }

    /// Limits the test to the given platforms. Without this the test applies to every platform.
    pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.applicability
            .platforms
            .extend(platforms.into_iter().map(Into::into));
        self
    }

    pub fn with_excluded_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.applicability
            .exclude_platforms
            .extend(platforms.into_iter().map(Into::into));
        self
    }

    pub fn with_hint(mut self, hint: ProvisioningHint) -> Self {
        self.hints.insert(hint);
        self
    }

    pub fn with_user_data(mut self, user_data: UserData) -> Self {
        self.user_data = Some(user_data);
        self
    }

    pub fn with_native_function<S>(mut self, name: S, function: NativeFunction) -> Self
    where
        S: Into<String>,
    {
        Arc::make_mut(&mut self.native_functions).insert(name, function);
        self
    }

    /// A condition checked after the dispatcher's own precondition and before the entry point.
    pub fn with_precondition(mut self, precondition: Arc<dyn Precondition>) -> Self {
        self.precondition = Some(precondition);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    pub fn applicability(&self) -> &Applicability {
        &self.applicability
    }

    pub fn hints(&self) -> &BTreeSet<ProvisioningHint> {
        &self.hints
    }

    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }

    pub fn native_functions(&self) -> &Arc<NativeCatalog> {
        &self.native_functions
    }

    pub fn precondition(&self) -> Option<&Arc<dyn Precondition>> {
        self.precondition.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether this test should run under `filter`.
    pub fn matches(&self, filter: &Filter) -> bool {
        filter.matches_name(&self.name) && self.applicability.matches(filter)
    }

    pub(crate) fn invoke(&self, cluster: TestCluster) -> TestFuture {
        (self.run)(cluster)
    }
}

/// Names end up on remote command lines, so they are limited to characters that need no quoting.
fn is_shell_safe(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// The set of tests known to the harness, in registration order. Fill it at startup, before the
/// first dispatch; it is only read afterwards.
#[derive(Debug, Default)]
pub struct TestRegistry {
    tests: Vec<TestDescriptor>,
    index: HashMap<String, usize>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a test. Fails if a test with the same name is already registered or the descriptor is
    /// malformed; callers are expected to stop the process in either case.
    pub fn register(&mut self, descriptor: TestDescriptor) -> Result<(), RegistryError> {
        let name = descriptor.name.clone();
        ensure!(
            !self.index.contains_key(&name),
            error::RegistrationConflictSnafu { name }
        );
        ensure!(
            is_shell_safe(&name),
            error::InvalidDescriptorSnafu {
                name: &name,
                reason: "names may only contain ASCII letters, digits, '.', '_' and '-'",
            }
        );
        ensure!(
            descriptor.cluster_size >= 1,
            error::InvalidDescriptorSnafu {
                name: &name,
                reason: "cluster size must be at least 1",
            }
        );
        if let Some(function) = descriptor
            .native_functions
            .names()
            .find(|function| !is_shell_safe(function))
        {
            return error::InvalidDescriptorSnafu {
                name: &name,
                reason: format!("native function name '{}' is not shell-safe", function),
            }
            .fail();
        }

        let conflicting = descriptor.applicability.conflicting_distros();
        if !conflicting.is_empty() {
            warn!(
                "Test '{}' both includes and excludes {:?}; it will not run there",
                name, conflicting
            );
        }

        debug!("Registered test '{}'", name);
        self.index.insert(name, self.tests.len());
        self.tests.push(descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TestDescriptor> {
        self.index.get(name).and_then(|&i| self.tests.get(i))
    }

    /// Tests that apply under `filter`, in registration order.
    pub fn list_matching<'a>(
        &'a self,
        filter: &'a Filter,
    ) -> impl Iterator<Item = &'a TestDescriptor> + 'a {
        self.tests.iter().filter(move |test| test.matches(filter))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestDescriptor> {
        self.tests.iter()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}
