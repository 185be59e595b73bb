/*!

Basic checks of the operating system that run on the machine itself as native functions. Each
group is one registered test whose body runs all of its native functions on the first machine:

* `coreos.basic`: single machine checks that need nothing else.
* `cl.etcd-member.cluster`: checks that need a formed etcd cluster of three machines.
* `coreos.internet`: checks that need the machine to reach the internet.

!*/

use crate::error::{self, Result};
use crate::etcd::{self, EtcdHealth};
use log::debug;
use snafu::{ensure, OptionExt, ResultExt};
use std::net::ToSocketAddrs;
use std::time::Duration;
use test_harness::error::RegistryError;
use test_harness::{
    BoxError, Flag, HealthCheck, NativeFunction, RetryPolicy, TestCluster, TestDescriptor,
    TestRegistry, TestResult,
};

/// The number of machines of the etcd cluster group.
pub const ETCD_CLUSTER_SIZE: usize = 3;

const MACHINE_ID: &str = "/etc/machine-id";
const RANDOM_UUID: &str = "/proc/sys/kernel/random/uuid";
const HOSTNAME: &str = "/proc/sys/kernel/hostname";
const MOUNTS: &str = "/proc/self/mounts";
const RESOLVE_HOST: &str = "www.example.com";

pub(crate) fn register(registry: &mut TestRegistry) -> std::result::Result<(), RegistryError> {
    registry.register(
        TestDescriptor::new("coreos.basic", local_tests)
            .with_native_function("Hostname", native(hostname))
            .with_native_function("MachineID", native(machine_id))
            .with_native_function("RandomUUID", native(random_uuid))
            .with_native_function("ReadOnlyUsr", native(read_only_usr)),
    )?;
    registry.register(
        TestDescriptor::new("cl.etcd-member.cluster", cluster_tests)
            .with_cluster_size(ETCD_CLUSTER_SIZE)
            .with_distros(["cl"])
            .with_native_function("EtcdMemberHealth", native(etcd_member_health)),
    )?;
    registry.register(
        TestDescriptor::new("coreos.internet", internet_tests)
            .with_flag(Flag::RequiresInternetAccess)
            .with_native_function("ResolveHostname", native(resolve_hostname)),
    )?;
    Ok(())
}

fn native(check: fn() -> Result<()>) -> NativeFunction {
    NativeFunction::new(move || check().map_err(BoxError::from))
}

/// Runs the single machine checks.
pub async fn local_tests(c: TestCluster) -> TestResult {
    run_native_functions(&c).await
}

/// Waits for etcd to report every machine of the cluster healthy, then runs the cluster checks.
pub async fn cluster_tests(c: TestCluster) -> TestResult {
    let m = c.machine(0)?;
    let members = c.machines().len();
    let etcd = EtcdHealth;
    let policy = RetryPolicy::new(60, Duration::from_secs(3));
    let health = test_harness::retry(policy, || etcd.cluster_health(&c, &m, members)).await;
    if let Err(e) = health {
        return Err(c.fatal(e));
    }
    run_native_functions(&c).await
}

/// Runs the checks that need internet access.
pub async fn internet_tests(c: TestCluster) -> TestResult {
    run_native_functions(&c).await
}

async fn run_native_functions(c: &TestCluster) -> TestResult {
    let m = c.machine(0)?;
    for name in c.list_native_functions() {
        c.run_native(&name, &m).await;
    }
    Ok(())
}

fn read(path: &str) -> Result<String> {
    std::fs::read_to_string(path).context(error::ReadFileSnafu { path })
}

fn hostname() -> Result<()> {
    validate_hostname(&read(HOSTNAME)?)
}

fn machine_id() -> Result<()> {
    validate_machine_id(&read(MACHINE_ID)?)
}

fn random_uuid() -> Result<()> {
    let first = read(RANDOM_UUID)?;
    let second = read(RANDOM_UUID)?;
    validate_random_uuids(&first, &second)
}

fn read_only_usr() -> Result<()> {
    check_usr_read_only(&read(MOUNTS)?)
}

fn etcd_member_health() -> Result<()> {
    etcd::local_cluster_health(ETCD_CLUSTER_SIZE)
}

fn resolve_hostname() -> Result<()> {
    let addresses: Vec<_> = (RESOLVE_HOST, 443)
        .to_socket_addrs()
        .context(error::ResolveSnafu { host: RESOLVE_HOST })?
        .collect();
    debug!("{} resolves to {:?}", RESOLVE_HOST, addresses);
    ensure!(
        !addresses.is_empty(),
        error::NoAddressesSnafu { host: RESOLVE_HOST }
    );
    Ok(())
}

/// A hostname is one or more dot-separated labels of ASCII letters, digits and hyphens.
fn validate_hostname(contents: &str) -> Result<()> {
    let hostname = contents.trim();
    let valid = !hostname.is_empty()
        && hostname.len() <= 253
        && hostname.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    ensure!(valid, error::InvalidHostnameSnafu { hostname });
    Ok(())
}

/// The machine id is 32 lowercase hex digits and never all zeros.
fn validate_machine_id(contents: &str) -> Result<()> {
    let machine_id = contents.trim();
    ensure!(
        machine_id.len() == 32
            && machine_id
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
            && machine_id.chars().any(|c| c != '0'),
        error::InvalidMachineIdSnafu { machine_id }
    );
    Ok(())
}

/// Two reads of the kernel's random UUID must both parse and must differ.
fn validate_random_uuids(first: &str, second: &str) -> Result<()> {
    let parse = |value: &str| {
        let value = value.trim();
        uuid::Uuid::parse_str(value).context(error::InvalidUuidSnafu { uuid: value })
    };
    let first = parse(first)?;
    let second = parse(second)?;
    ensure!(
        first != second,
        error::RepeatedUuidSnafu {
            uuid: first.to_string()
        }
    );
    Ok(())
}

/// Checks a mount table in `/proc/mounts` format. The last entry for `/usr` is the one in effect.
fn check_usr_read_only(mounts: &str) -> Result<()> {
    let options = mounts
        .lines()
        .filter_map(|line| {
            let fields: Vec<_> = line.split_whitespace().collect();
            match fields.as_slice() {
                [_, "/usr", _, options, ..] => Some(*options),
                _ => None,
            }
        })
        .last()
        .context(error::UsrNotMountedSnafu)?;
    ensure!(
        options.split(',').any(|option| option == "ro"),
        error::UsrWritableSnafu { options }
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Error;

    #[test]
    fn hostnames() {
        validate_hostname("localhost\n").unwrap();
        validate_hostname("node-1.example.com").unwrap();
        assert!(validate_hostname("").is_err());
        assert!(validate_hostname("-node").is_err());
        assert!(validate_hostname("under_score").is_err());
        assert!(validate_hostname("double..dot").is_err());
    }

    #[test]
    fn machine_ids() {
        validate_machine_id("4f3b2c1d0e9f8a7b6c5d4e3f2a1b0c9d\n").unwrap();
        assert!(validate_machine_id("00000000000000000000000000000000").is_err());
        assert!(validate_machine_id("4F3B2C1D0E9F8A7B6C5D4E3F2A1B0C9D").is_err());
        assert!(validate_machine_id("4f3b2c1d").is_err());
        assert!(matches!(
            validate_machine_id("uninitialized").unwrap_err(),
            Error::InvalidMachineId { .. }
        ));
    }

    #[test]
    fn random_uuids() {
        validate_random_uuids(
            "9b2f6a52-1d3c-4c1e-9d0a-6e1c2f3b4a5d\n",
            "0d6f1e2a-3b4c-4d5e-8f9a-0b1c2d3e4f5a\n",
        )
        .unwrap();
        assert!(matches!(
            validate_random_uuids(
                "9b2f6a52-1d3c-4c1e-9d0a-6e1c2f3b4a5d",
                "9b2f6a52-1d3c-4c1e-9d0a-6e1c2f3b4a5d"
            )
            .unwrap_err(),
            Error::RepeatedUuid { .. }
        ));
        assert!(matches!(
            validate_random_uuids("not-a-uuid", "9b2f6a52-1d3c-4c1e-9d0a-6e1c2f3b4a5d").unwrap_err(),
            Error::InvalidUuid { .. }
        ));
    }

    #[test]
    fn usr_mount() {
        let read_only = "\
/dev/vda3 / ext4 rw,relatime 0 0
/dev/mapper/usr /usr ext4 ro,seclabel,relatime 0 0
tmpfs /tmp tmpfs rw,nosuid,nodev 0 0
";
        check_usr_read_only(read_only).unwrap();

        let remounted = format!("{}overlay /usr overlay rw,relatime 0 0\n", read_only);
        assert!(matches!(
            check_usr_read_only(&remounted).unwrap_err(),
            Error::UsrWritable { .. }
        ));

        assert!(matches!(
            check_usr_read_only("/dev/vda3 / ext4 rw,relatime 0 0\n").unwrap_err(),
            Error::UsrNotMounted
        ));
    }
}
