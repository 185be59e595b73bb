/*!

Errors returned by the harness. Test bodies see [`CommandError`] when a command fails and decide
what to do about it; registration problems surface as [`RegistryError`] at startup.

!*/

use crate::BoxError;
use snafu::Snafu;

/// A command run through [`TestCluster::ssh`](crate::TestCluster::ssh) did not succeed. This is
/// recoverable: the caller inspects it and decides whether the test can continue.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CommandError {
    #[snafu(display(
        "'{}' on machine '{}' exited with {}: {}",
        command,
        machine,
        describe_status(*status),
        String::from_utf8_lossy(stderr).trim()
    ))]
    Exit {
        machine: String,
        command: String,
        status: Option<i32>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },

    #[snafu(display("Unable to run '{}' on machine '{}': {}", command, machine, source))]
    Transport {
        machine: String,
        command: String,
        source: BoxError,
    },
}

impl CommandError {
    /// Whatever the command wrote to stdout before it failed.
    pub fn stdout(&self) -> &[u8] {
        match self {
            CommandError::Exit { stdout, .. } => stdout,
            CommandError::Transport { .. } => &[],
        }
    }

    /// The exit status, if the command ran and exited.
    pub fn status(&self) -> Option<i32> {
        match self {
            CommandError::Exit { status, .. } => *status,
            CommandError::Transport { .. } => None,
        }
    }
}

fn describe_status(status: Option<i32>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// A test could not be added to a [`TestRegistry`](crate::TestRegistry). These are programming
/// errors in the test suites and should stop the process before any test runs.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RegistryError {
    #[snafu(display("A test named '{}' is already registered", name))]
    RegistrationConflict { name: String },

    #[snafu(display("Test '{}' is invalid: {}", name, reason))]
    InvalidDescriptor { name: String, reason: String },
}

/// A native function could not be run on the local machine.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum NativeError {
    #[snafu(display("No test named '{}' is registered", test))]
    UnknownTest { test: String },

    #[snafu(display("Test '{}' has no native function named '{}'", test, function))]
    UnknownFunction { test: String, function: String },

    #[snafu(display("Native function '{}' of test '{}' failed: {}", function, test, source))]
    Function {
        test: String,
        function: String,
        source: BoxError,
    },
}

/// The harness configuration could not be read from the environment.
#[derive(Debug, Snafu)]
pub struct ConfigError(InnerConfigError);

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum InnerConfigError {
    #[snafu(display("Unable to read configuration from the environment: {}", source))]
    Env { source: envy::Error },

    #[snafu(display("Invalid test name pattern: {}", source))]
    NamePattern { source: model::Error },
}
