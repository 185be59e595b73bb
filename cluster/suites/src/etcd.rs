/*!

Cluster health as reported by etcd. The harness side runs `etcdctl cluster-health` over the
remote-command channel; the machine side runs the same command as a local process. Both read its
output with [`check_cluster_health`].

!*/

use crate::error::{self, Result};
use async_trait::async_trait;
use log::debug;
use snafu::{ensure, ResultExt};
use std::process::Command;
use test_harness::{BoxError, HealthCheck, MachineHandle, TestCluster};

pub const CLUSTER_HEALTH_COMMAND: &str = "etcdctl cluster-health";

/// A [`HealthCheck`] that asks etcd on the given machine whether every member is healthy.
#[derive(Debug, Clone, Copy, Default)]
pub struct EtcdHealth;

#[async_trait]
impl HealthCheck for EtcdHealth {
    async fn cluster_health(
        &self,
        cluster: &TestCluster,
        machine: &MachineHandle,
        expected_members: usize,
    ) -> std::result::Result<(), BoxError> {
        let output = cluster
            .ssh(machine, CLUSTER_HEALTH_COMMAND)
            .await
            .context(error::EtcdCommandSnafu)?;
        check_cluster_health(&String::from_utf8_lossy(&output), expected_members)?;
        Ok(())
    }
}

/// Reads the output of `etcdctl cluster-health`, which looks like this:
///
/// ```text
/// member 8e9e05c52164694d is healthy: got healthy result from http://localhost:2379
/// cluster is healthy
/// ```
///
/// The cluster counts as healthy when exactly `expected_members` members report healthy and etcd
/// reports the cluster itself as healthy.
pub fn check_cluster_health(output: &str, expected_members: usize) -> Result<()> {
    let mut healthy = 0;
    let mut cluster_healthy = false;
    for line in output.lines().map(str::trim) {
        if line == "cluster is healthy" {
            cluster_healthy = true;
        } else if line.starts_with("member ") && line.contains(" is healthy") {
            healthy += 1;
        }
    }
    debug!(
        "etcd reports {} of {} members healthy",
        healthy, expected_members
    );
    ensure!(
        healthy == expected_members,
        error::EtcdMembersSnafu {
            healthy,
            expected: expected_members
        }
    );
    ensure!(cluster_healthy, error::EtcdClusterUnhealthySnafu);
    Ok(())
}

/// Runs `etcdctl cluster-health` on this machine.
pub(crate) fn local_cluster_health(expected_members: usize) -> Result<()> {
    let output = Command::new("etcdctl")
        .arg("cluster-health")
        .output()
        .context(error::EtcdProcessSnafu {
            command: CLUSTER_HEALTH_COMMAND,
        })?;
    ensure!(
        output.status.success(),
        error::EtcdProcessStatusSnafu {
            command: CLUSTER_HEALTH_COMMAND,
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    );
    check_cluster_health(&String::from_utf8_lossy(&output.stdout), expected_members)
}
