/*!

Tests for the rkt container runtime. `rkt.base` builds a small ACI on the machine once and then
runs it in several ways as subtests, since building the image costs more than most of the checks.

!*/

use crate::etcd::CLUSTER_HEALTH_COMMAND;
use serde_json::json;
use std::time::Duration;
use test_harness::error::RegistryError;
use test_harness::{
    retry, Flag, MachineHandle, RetryPolicy, TestCluster, TestDescriptor, TestRegistry,
    TestResult, UserData,
};

const TEST_ACI: &str = "test.rkt.aci";

pub(crate) fn register(registry: &mut TestRegistry) -> Result<(), RegistryError> {
    registry.register(
        TestDescriptor::new("cl.rkt.etcd3", rkt_etcd)
            // etcdctl needs networking to reach the member
            .with_flag(Flag::RequiresInternetAccess)
            .with_distros(["cl"])
            .with_user_data(etcd_member_config()),
    )?;
    registry.register(TestDescriptor::new("rkt.base", rkt_base).with_distros(["cl"]))?;
    Ok(())
}

/// An Ignition config that enables the etcd member service.
pub fn etcd_member_config() -> UserData {
    let config = json!({
        "ignition": { "version": "2.0.0" },
        "systemd": {
            "units": [{ "name": "etcd-member.service", "enable": true }]
        }
    });
    UserData::ignition(config.to_string())
}

async fn rkt_etcd(c: TestCluster) -> TestResult {
    let m = c.machine(0)?;
    let policy = RetryPolicy::new(60, Duration::from_secs(3));
    if let Err(e) = retry(policy, || c.ssh(&m, CLUSTER_HEALTH_COMMAND)).await {
        return Err(c.fatal(format!("etcd in rkt failed health check: {}", e)));
    }
    Ok(())
}

async fn rkt_base(c: TestCluster) -> TestResult {
    let m = c.machine(0)?;
    c.must_ssh(&m, "sudo setenforce 0").await?;
    create_test_aci(&c, &m, TEST_ACI, &["echo", "sleep", "sh"]).await?;
    let m = &m;

    c.run("cli", |c| async move {
        let uuid_file = "/tmp/run-test.uuid";
        let output = c
            .must_ssh(
                m,
                &format!(
                    "sudo rkt run --uuid-file-save={} {}:latest --exec=sh -- -c 'echo success'",
                    uuid_file, TEST_ACI
                ),
            )
            .await?;
        c.defer_ssh(m, format!("sudo rkt rm --uuid-file={}", uuid_file));

        if !String::from_utf8_lossy(&output).contains("success") {
            return Err(c.fatal(format!(
                "expected rkt stdout to include app output ('success'); was {}",
                String::from_utf8_lossy(&output)
            )));
        }
        journal_for_pod_contains(&c, m, uuid_file, "success").await
    })
    .await;

    c.run("unit", |c| async move {
        let uuid_file = "/tmp/run-as-unit-test.uuid";
        c.must_ssh(
            m,
            &format!(
                "sudo systemd-run --quiet --unit run-as-unit.service -- rkt run --uuid-file-save={} {}:latest --exec=sh -- -c 'echo success'",
                uuid_file, TEST_ACI
            ),
        )
        .await?;
        c.defer_ssh(m, format!("sudo rkt rm --uuid-file={}", uuid_file));

        c.must_ssh(m, &wait_for_pod(uuid_file, "--wait")).await?;
        journal_for_pod_contains(&c, m, uuid_file, "success").await
    })
    .await;

    c.run("machinectl-integration", |c| async move {
        let uuid_file = "/tmp/run-machinectl.uuid";
        c.must_ssh(
            m,
            &format!(
                "sudo systemd-run --quiet --unit run-machinectl -- rkt run --uuid-file-save={} {}:latest --exec=sleep -- inf",
                uuid_file, TEST_ACI
            ),
        )
        .await?;
        c.defer_ssh(m, format!("sudo rkt rm --uuid-file={}", uuid_file));

        c.must_ssh(m, &wait_for_pod(uuid_file, "--wait-ready")).await?;
        let output = c
            .must_ssh(m, &format!("machinectl show rkt-$(cat {})", uuid_file))
            .await?;
        let output = String::from_utf8_lossy(&output);
        let missing = missing_lines(&output, &["State=running", "Class=container", "Service=rkt"]);
        if let Some(line) = missing.first() {
            return Err(c.fatal(format!(
                "expected machinectl to include '{}': was {}",
                line, output
            )));
        }

        c.must_ssh(m, &format!("sudo rkt stop --uuid-file={}", uuid_file))
            .await?;
        c.must_ssh(m, &format!("rkt status --wait $(cat {})", uuid_file))
            .await?;
        Ok(())
    })
    .await;

    Ok(())
}

/// Waits for the pod whose UUID will be written to `uuid_file` to reach the state that
/// `rkt status <wait_flag>` waits for.
fn wait_for_pod(uuid_file: &str, wait_flag: &str) -> String {
    format!(
        "while ! [ -s {file} ]; do sleep 0.1; done; rkt status {flag} $(cat {file})",
        file = uuid_file,
        flag = wait_flag
    )
}

async fn journal_for_pod_contains(
    c: &TestCluster,
    m: &MachineHandle,
    uuid_file: &str,
    contains: &str,
) -> TestResult {
    let output = c
        .must_ssh(
            m,
            &format!(
                "journalctl --dir /var/log/journal/$(cat {} | sed 's/-//g')",
                uuid_file
            ),
        )
        .await?;
    let output = String::from_utf8_lossy(&output);
    if !output.contains(contains) {
        return Err(c.fatal(format!(
            "expected journal logs from machine dir to include app output '{}'; was {}",
            contains, output
        )));
    }
    Ok(())
}

/// The entries of `expected` that do not occur in `output`.
fn missing_lines<'a>(output: &str, expected: &[&'a str]) -> Vec<&'a str> {
    expected
        .iter()
        .copied()
        .filter(|line| !output.contains(line))
        .collect()
}

fn aci_manifest(name: &str) -> String {
    let manifest = json!({
        "acKind": "ImageManifest",
        "acVersion": "0.8.9",
        "name": name,
        "labels": [
            { "name": "os", "value": "linux" },
            { "name": "arch", "value": "amd64" },
            { "name": "version", "value": "latest" }
        ]
    });
    manifest.to_string()
}

/// A shell script that packs `bins` and the libraries they link against into an ACI named `name`
/// and imports it into rkt's image store.
fn create_aci_script(name: &str, bins: &[&str]) -> String {
    format!(
        r#"set -e
tmpdir=$(mktemp -d)
cd $tmpdir
cat > manifest <<EOF
{manifest}
EOF

mkdir rootfs
bins=$(which {bins})
libs=$(sudo ldd $bins | grep -o /lib'[^ ]*' | sort -u)
sudo rsync -av --relative --copy-links $bins $libs ./rootfs/

sudo tar cf /tmp/test-aci.aci .
sudo rkt image fetch --insecure-options=image /tmp/test-aci.aci
cd
sudo rm -rf /tmp/test-aci.aci $tmpdir"#,
        manifest = aci_manifest(name),
        bins = bins.join(" ")
    )
}

async fn create_test_aci(
    c: &TestCluster,
    m: &MachineHandle,
    name: &str,
    bins: &[&str],
) -> TestResult {
    c.must_ssh(m, &create_aci_script(name, bins)).await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn manifest_names_the_image() {
        let manifest: serde_json::Value = serde_json::from_str(&aci_manifest("test.rkt.aci")).unwrap();
        assert_eq!(manifest["name"], "test.rkt.aci");
        assert_eq!(manifest["acKind"], "ImageManifest");
        assert_eq!(manifest["labels"][1]["value"], "amd64");
    }

    #[test]
    fn script_packs_requested_binaries() {
        let script = create_aci_script("test.rkt.aci", &["echo", "sleep", "sh"]);
        assert!(script.starts_with("set -e\n"));
        assert!(script.contains("bins=$(which echo sleep sh)"));
        assert!(script.contains(r#""name":"test.rkt.aci""#));
        assert!(script.ends_with("sudo rm -rf /tmp/test-aci.aci $tmpdir"));
    }

    #[test]
    fn machinectl_lines() {
        let output = "Name=rkt-1234\nClass=container\nService=rkt\nState=running\n";
        assert!(missing_lines(output, &["State=running", "Class=container"]).is_empty());
        assert_eq!(
            missing_lines("State=closing\nClass=container\n", &["State=running", "Class=container", "Service=rkt"]),
            vec!["State=running", "Service=rkt"]
        );
    }

    #[test]
    fn etcd_config_is_ignition() {
        let user_data = etcd_member_config();
        assert_eq!(user_data.kind, test_harness::UserDataKind::Ignition);
        let config: serde_json::Value = serde_json::from_str(&user_data.contents).unwrap();
        assert_eq!(config["systemd"]["units"][0]["name"], "etcd-member.service");
        assert_eq!(config["systemd"]["units"][0]["enable"], true);
    }
}
