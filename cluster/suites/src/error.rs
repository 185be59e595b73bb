use snafu::Snafu;
use std::path::PathBuf;
use test_harness::error::CommandError;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the checks the suites make, both from the harness side and on the machines.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to query etcd cluster health: {}", source))]
    EtcdCommand { source: CommandError },

    #[snafu(display("Unable to run '{}': {}", command, source))]
    EtcdProcess {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("'{}' exited with {:?}: {}", command, status, stderr))]
    EtcdProcessStatus {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[snafu(display("{} of {} etcd members are healthy", healthy, expected))]
    EtcdMembers { healthy: usize, expected: usize },

    #[snafu(display("etcd did not report the cluster as healthy"))]
    EtcdClusterUnhealthy,

    #[snafu(display("Invalid hostname '{}'", hostname))]
    InvalidHostname { hostname: String },

    #[snafu(display("Invalid machine id '{}'", machine_id))]
    InvalidMachineId { machine_id: String },

    #[snafu(display("Invalid UUID '{}': {}", uuid, source))]
    InvalidUuid { uuid: String, source: uuid::Error },

    #[snafu(display("The kernel returned the same random UUID twice: {}", uuid))]
    RepeatedUuid { uuid: String },

    #[snafu(display("Unable to read '{}': {}", path.display(), source))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to resolve '{}': {}", host, source))]
    Resolve {
        host: String,
        source: std::io::Error,
    },

    #[snafu(display("'{}' resolved to no addresses", host))]
    NoAddresses { host: String },

    #[snafu(display("/usr is mounted with options '{}', expected 'ro'", options))]
    UsrWritable { options: String },

    #[snafu(display("/usr is not a mount point"))]
    UsrNotMounted,
}
