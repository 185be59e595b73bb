/*!

`test-harness` registers cluster integration tests, selects the ones that apply to a run, and
dispatches them against live machines.

Tests are described by a [`TestDescriptor`] and collected in a [`TestRegistry`] before anything
runs. A [`TestDispatcher`] then walks the tests that match a [`Filter`], checks that the cluster is
large enough, runs any [`Precondition`], and invokes each test body with a [`TestCluster`]. The
test body talks to machines through [`TestCluster::ssh`] and [`TestCluster::must_ssh`], splits
itself into subtests with [`TestCluster::run`], and aborts with the [`Fatal`] token that those
calls return.

Machines are reached through the [`Machine`] trait. Provisioning machines and establishing the
connection to them happens outside of this library.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

mod cluster;
pub mod config;
mod dispatch;
pub mod error;
mod native;
mod registry;
mod retry;
#[cfg(feature = "ssh")]
mod ssh;

pub use crate::cluster::{Fatal, TestCluster, TestResult};
pub use crate::config::HarnessConfig;
pub use crate::dispatch::{ClusterHealth, DispatchMode, HealthCheck, Precondition, TestDispatcher};
pub use crate::native::{run_local, NativeCatalog, NativeFunction};
pub use crate::registry::{TestDescriptor, TestRegistry};
pub use crate::retry::{retry, RetryPolicy};
#[cfg(feature = "ssh")]
pub use crate::ssh::SshMachine;
use async_trait::async_trait;
pub use model::constants;
pub use model::{
    DispatchReport, Failure, FailureKind, Filter, Flag, Outcome, ProvisioningHint, TestReport,
    UserData, UserDataKind,
};
use std::fmt::Debug;
use std::sync::Arc;

/// The error type used at the seams where implementations bring their own errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A shared reference to one machine of the cluster under test.
pub type MachineHandle = Arc<dyn Machine>;

/// What a command run on a [`Machine`] produced.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// The exit status of the command, or `None` if it was terminated by a signal.
    pub status: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// The `Machine` trait is the remote-command channel to one cluster member. Implement it for
/// whatever transport reaches your machines; the harness only ever asks it to run a shell command
/// and wait for the result.
#[async_trait]
pub trait Machine: Debug + Send + Sync {
    /// A name for the machine that is used in logs and error messages.
    fn id(&self) -> &str;

    /// Runs `command` through the machine's shell and waits for it to exit. An `Err` means the
    /// command could not be run at all; a command that ran and failed is reported through
    /// [`CommandOutput::status`].
    async fn execute(&self, command: &str) -> Result<CommandOutput, BoxError>;
}
