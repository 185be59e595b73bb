/*!

Runs the registered suites against scripted machines. These check the commands each suite sends
and how it reacts to the answers, not the behavior of a real machine.

!*/

use cluster_suites::register_all;
use selftest::{init_logger, Reply, ScriptedMachine};
use std::sync::Arc;
use test_harness::{
    DispatchReport, FailureKind, Filter, Flag, MachineHandle, Outcome, TestDispatcher,
    TestRegistry,
};

const ETCD_HEALTHY_3: &str = "\
member 8e9e05c52164694d is healthy: got healthy result from http://10.0.0.1:2379
member 91bc3c398fb3c146 is healthy: got healthy result from http://10.0.0.2:2379
member fd422379fda50e48 is healthy: got healthy result from http://10.0.0.3:2379
cluster is healthy
";

fn registry() -> TestRegistry {
    let mut registry = TestRegistry::new();
    register_all(&mut registry).unwrap();
    registry
}

fn selected(filter: &Filter) -> Vec<String> {
    registry()
        .list_matching(filter)
        .map(|descriptor| descriptor.name().to_string())
        .collect()
}

async fn dispatch_one(name: &str, machines: &[MachineHandle]) -> DispatchReport {
    let registry = registry();
    let filter = Filter::new("cl")
        .with_flag(Flag::RequiresInternetAccess)
        .with_name_glob(name)
        .unwrap();
    TestDispatcher::new(&registry)
        .dispatch(machines, &filter)
        .await
}

#[test]
fn selection_by_distro_and_flags() {
    let offline_cl = Filter::new("cl").with_platform("qemu");
    assert_eq!(
        selected(&offline_cl),
        vec!["coreos.basic", "cl.etcd-member.cluster", "rkt.base"]
    );

    let online_cl = offline_cl.with_flag(Flag::RequiresInternetAccess);
    assert_eq!(
        selected(&online_cl),
        vec![
            "coreos.basic",
            "cl.etcd-member.cluster",
            "coreos.internet",
            "cl.rkt.etcd3",
            "rkt.base",
            "coreos.tls.fetch-urls",
        ]
    );

    let online_rhcos = Filter::new("rhcos").with_flag(Flag::RequiresInternetAccess);
    assert_eq!(selected(&online_rhcos), vec!["coreos.basic", "coreos.internet"]);
}

#[tokio::test]
async fn tls_fetches_every_url_twice() {
    init_logger();
    let (machine, handle) = ScriptedMachine::new("m0").into_handles();
    let report = dispatch_one("coreos.tls.fetch-urls", &[handle]).await;

    assert!(report.passed());
    let commands = machine.commands();
    assert_eq!(commands.len(), 6);
    assert_eq!(machine.count("curl -s -S -m 30 --retry 2 "), 3);
    assert_eq!(machine.count("wget -nv -T 30 -t 2 --delete-after "), 3);
    assert!(commands[0].starts_with("curl"));
    assert!(commands[0].ends_with("https://www.example.com/"));
}

#[tokio::test]
async fn tls_stops_at_first_failed_fetch() {
    init_logger();
    let (machine, handle) = ScriptedMachine::new("m0")
        .on(
            "curl -s -S -m 30 --retry 2 https://www.wikipedia.org/",
            Reply::failure(6, "curl: (6) Could not resolve host: www.wikipedia.org"),
        )
        .into_handles();
    let report = dispatch_one("coreos.tls.fetch-urls", &[handle]).await;

    let test = report.get("coreos.tls.fetch-urls").unwrap();
    assert_eq!(test.outcome, Outcome::Fail);
    assert_eq!(test.failures.len(), 1);
    assert!(test.failures[0].message.contains("Could not resolve host"));
    assert_eq!(machine.commands().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn rkt_etcd_retries_health_check() {
    init_logger();
    let (machine, handle) = ScriptedMachine::new("m0")
        .on_sequence(
            "etcdctl cluster-health",
            vec![
                Reply::failure(4, "cluster may be unhealthy: failed to list members"),
                Reply::failure(4, "cluster may be unhealthy: failed to list members"),
                Reply::success(ETCD_HEALTHY_3),
            ],
        )
        .into_handles();
    let report = dispatch_one("cl.rkt.etcd3", &[handle]).await;

    assert!(report.passed());
    assert_eq!(machine.count("etcdctl cluster-health"), 3);
}

#[tokio::test(start_paused = true)]
async fn rkt_etcd_gives_up_after_sixty_attempts() {
    init_logger();
    let (machine, handle) = ScriptedMachine::new("m0")
        .on(
            "etcdctl cluster-health",
            Reply::failure(4, "cluster may be unhealthy: failed to list members"),
        )
        .into_handles();
    let report = dispatch_one("cl.rkt.etcd3", &[handle]).await;

    let test = report.get("cl.rkt.etcd3").unwrap();
    assert_eq!(test.outcome, Outcome::Fail);
    assert_eq!(test.failures[0].kind, FailureKind::Fatal);
    assert!(test.failures[0]
        .message
        .starts_with("etcd in rkt failed health check"));
    assert_eq!(machine.count("etcdctl cluster-health"), 60);
}

fn rkt_machine(machinectl: &str) -> (Arc<ScriptedMachine>, MachineHandle) {
    ScriptedMachine::new("m0")
        .on("echo success'", Reply::success("success\n"))
        .on("journalctl", Reply::success("rkt[1234]: success\n"))
        .on("machinectl show", Reply::success(machinectl))
        .into_handles()
}

#[tokio::test]
async fn rkt_base_runs_every_subtest() {
    init_logger();
    let (machine, handle) = rkt_machine("State=running\nClass=container\nService=rkt\n");
    let report = dispatch_one("rkt.base", &[handle]).await;

    assert!(report.passed(), "{}", report);
    let test = report.get("rkt.base").unwrap();
    let subtests: Vec<_> = test.subtests.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        subtests,
        vec![
            "rkt.base/cli",
            "rkt.base/unit",
            "rkt.base/machinectl-integration"
        ]
    );

    let commands = machine.commands();
    assert_eq!(commands[0], "sudo setenforce 0");
    assert!(commands[1].contains("rkt image fetch"));
    assert_eq!(machine.count("sudo rkt rm --uuid-file="), 3);
    assert_eq!(machine.count("sudo rkt stop"), 1);
}

#[tokio::test]
async fn rkt_base_failed_subtest_still_cleans_up() {
    init_logger();
    let (machine, handle) = rkt_machine("State=running\nClass=container\n");
    let report = dispatch_one("rkt.base", &[handle]).await;

    let test = report.get("rkt.base").unwrap();
    assert_eq!(test.outcome, Outcome::Fail);
    assert_eq!(
        test.failed_names(),
        vec!["rkt.base", "rkt.base/machinectl-integration"]
    );
    let failed = report.get("rkt.base/machinectl-integration").unwrap();
    assert!(failed.failures[0].message.contains("Service=rkt"));
    assert_eq!(machine.count("sudo rkt rm --uuid-file=/tmp/run-machinectl.uuid"), 1);
    assert_eq!(machine.count("sudo rkt stop"), 0);
}

#[tokio::test]
async fn rkt_base_stops_when_image_cannot_be_built() {
    init_logger();
    let (machine, handle) = ScriptedMachine::new("m0")
        .on("rkt image fetch", Reply::failure(1, "image fetch failed"))
        .into_handles();
    let report = dispatch_one("rkt.base", &[handle]).await;

    let test = report.get("rkt.base").unwrap();
    assert_eq!(test.outcome, Outcome::Fail);
    assert!(test.subtests.is_empty());
    assert_eq!(machine.commands().len(), 2);
}

#[tokio::test]
async fn basic_group_runs_native_functions_in_order() {
    init_logger();
    let (machine, handle) = ScriptedMachine::new("m0").into_handles();
    let report = dispatch_one("coreos.basic", &[handle]).await;

    assert!(report.passed());
    assert_eq!(
        machine.commands(),
        vec![
            "./clustertest-native run coreos.basic Hostname",
            "./clustertest-native run coreos.basic MachineID",
            "./clustertest-native run coreos.basic RandomUUID",
            "./clustertest-native run coreos.basic ReadOnlyUsr",
        ]
    );
}

#[tokio::test]
async fn cluster_group_needs_three_machines() {
    init_logger();
    let (machine, handle) = ScriptedMachine::new("m0").into_handles();
    let report = dispatch_one("cl.etcd-member.cluster", &[handle]).await;

    let test = report.get("cl.etcd-member.cluster").unwrap();
    assert_eq!(test.outcome, Outcome::Fail);
    assert_eq!(test.failures[0].kind, FailureKind::InsufficientResources);
    assert!(machine.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cluster_group_waits_for_etcd() {
    init_logger();
    let (first, first_handle) = ScriptedMachine::new("m0")
        .on_sequence(
            "etcdctl cluster-health",
            vec![
                Reply::unreachable("connection reset by peer"),
                Reply::success(ETCD_HEALTHY_3),
            ],
        )
        .into_handles();
    let (second, second_handle) = ScriptedMachine::new("m1").into_handles();
    let (_, third_handle) = ScriptedMachine::new("m2").into_handles();

    let report =
        dispatch_one("cl.etcd-member.cluster", &[first_handle, second_handle, third_handle]).await;

    assert!(report.passed(), "{}", report);
    assert_eq!(
        first.commands(),
        vec![
            "etcdctl cluster-health",
            "etcdctl cluster-health",
            "./clustertest-native run cl.etcd-member.cluster EtcdMemberHealth",
        ]
    );
    assert!(second.commands().is_empty());
}
