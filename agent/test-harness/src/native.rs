use crate::error::{self, NativeError};
use crate::{BoxError, TestRegistry};
use log::info;
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A check compiled into the test binary that runs directly on a machine of the cluster. The
/// harness starts it remotely with [`TestCluster::run_native`](crate::TestCluster::run_native);
/// the machine-side binary runs it with [`run_local`].
#[derive(Clone)]
pub struct NativeFunction(Arc<dyn Fn() -> Result<(), BoxError> + Send + Sync>);

impl NativeFunction {
    pub fn new<F>(function: F) -> Self
    where
        F: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self(Arc::new(function))
    }

    pub fn call(&self) -> Result<(), BoxError> {
        (self.0)()
    }
}

impl Debug for NativeFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("NativeFunction")
    }
}

/// The native functions of one test, by name.
#[derive(Debug, Clone, Default)]
pub struct NativeCatalog {
    functions: BTreeMap<String, NativeFunction>,
}

impl NativeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `function` under `name`, returning the function it replaced, if any.
    pub fn insert<S>(&mut self, name: S, function: NativeFunction) -> Option<NativeFunction>
    where
        S: Into<String>,
    {
        self.functions.insert(name.into(), function)
    }

    pub fn get(&self, name: &str) -> Option<&NativeFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Function names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Runs the native function `function` of the registered test `test` in this process. This is
/// the machine-side half of [`TestCluster::run_native`](crate::TestCluster::run_native).
pub fn run_local(registry: &TestRegistry, test: &str, function: &str) -> Result<(), NativeError> {
    let descriptor = registry
        .get(test)
        .context(error::UnknownTestSnafu { test })?;
    let native = descriptor
        .native_functions()
        .get(function)
        .context(error::UnknownFunctionSnafu { test, function })?;
    info!("Running native function '{}' of '{}'", function, test);
    native
        .call()
        .context(error::FunctionSnafu { test, function })
}
