//! Whole topology passes, from readiness gate to dispatched commands.

use std::time::Duration;

use redis_cluster_operator::cluster::ClusterTarget;
use redis_cluster_operator::controller::topology::{
    ReadyReplicas, ReconcileOutcome, RequeueDirective, TopologyAction, run_topology_pass,
};

use crate::fakes::*;

fn ready(target: &ClusterTarget) -> ReadyReplicas {
    ReadyReplicas {
        leaders: target.leaders as i32,
        followers: target.followers as i32,
    }
}

#[tokio::test]
async fn scenario_a_fresh_cluster_is_created_on_leader_zero() {
    let target = ClusterTarget::new("cache", "prod", 3, 0);
    // Cluster support is on but the node knows only itself before creation.
    let store = FakeStore::default().table(&leader_ip(0), "");
    let harness = Harness::new(FakeResolver::for_target(&target), FakeExecutor::default(), store);

    let report = run_topology_pass(&harness.toolkit, &target, ready(&target)).await;

    assert_eq!(report.action, TopologyAction::Bootstrap);
    assert_eq!(report.outcome, ReconcileOutcome::Bootstrapping);
    assert!(report.succeeded);
    assert_eq!(report.cluster_nodes, Some(0));

    let calls = harness.executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.name, "cache-leader-0");
    assert_eq!(calls[0].0.namespace, "prod");
    assert_eq!(
        calls[0].1,
        vec![
            "redis-cli",
            "--cluster",
            "create",
            "10.0.0.1:6379",
            "10.0.0.2:6379",
            "10.0.0.3:6379",
            "--cluster-yes",
        ]
    );
    assert!(harness.store.resets().is_empty());
}

#[tokio::test]
async fn scenario_a_unreachable_leaders_still_bootstrap() {
    let target = ClusterTarget::new("cache", "prod", 3, 0);
    let store = FakeStore::default()
        .unreachable(&leader_ip(0))
        .unreachable(&leader_ip(1))
        .unreachable(&leader_ip(2));
    let harness = Harness::new(FakeResolver::for_target(&target), FakeExecutor::default(), store);

    let report = run_topology_pass(&harness.toolkit, &target, ready(&target)).await;

    assert_eq!(report.action, TopologyAction::Bootstrap);
    assert_eq!(harness.executor.calls().len(), 1);
}

#[tokio::test]
async fn scenario_b_followers_join_their_paired_leaders() {
    let target = ClusterTarget::new("cache", "prod", 3, 3);
    let store = FakeStore::default().table(&leader_ip(0), &leader_rows(3).join("\n"));
    let harness = Harness::new(FakeResolver::for_target(&target), FakeExecutor::default(), store);

    let report = run_topology_pass(&harness.toolkit, &target, ready(&target)).await;

    assert_eq!(report.action, TopologyAction::AttachFollowers);
    assert_eq!(report.outcome, ReconcileOutcome::Replicating);
    assert!(report.succeeded);

    let calls = harness.executor.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(pod, _)| pod.name == "cache-leader-0"));
    assert_eq!(
        calls[0].1,
        vec![
            "redis-cli",
            "--cluster",
            "add-node",
            "10.0.1.1:6379",
            "10.0.0.1:6379",
            "--cluster-slave",
        ]
    );
    assert_eq!(calls[2].1[3], "10.0.1.3:6379");
    assert_eq!(calls[2].1[4], "10.0.0.3:6379");
}

#[tokio::test]
async fn scenario_b_only_missing_follower_is_attached() {
    let target = ClusterTarget::new("cache", "prod", 3, 3);
    let mut rows = leader_rows(3);
    rows.extend(follower_rows(&[1, 2]));
    let store = FakeStore::default().table(&leader_ip(0), &rows.join("\n"));
    let harness = Harness::new(FakeResolver::for_target(&target), FakeExecutor::default(), store);

    let report = run_topology_pass(&harness.toolkit, &target, ready(&target)).await;

    assert_eq!(report.action, TopologyAction::AttachFollowers);
    assert_eq!(
        harness.executor.argvs(),
        vec![vec![
            "redis-cli".to_string(),
            "--cluster".to_string(),
            "add-node".to_string(),
            "10.0.1.1:6379".to_string(),
            "10.0.0.1:6379".to_string(),
            "--cluster-slave".to_string(),
        ]]
    );
    assert!(report.message.contains("2 already joined"));
}

#[tokio::test]
async fn scenario_c_failed_node_resets_every_member() {
    let target = ClusterTarget::new("cache", "prod", 3, 3);
    let mut rows = vec![
        row("leader0", &leader_ip(0), "myself,master", "connected"),
        row("leader1", &leader_ip(1), "master,fail", "connected"),
        row("leader2", &leader_ip(2), "master", "connected"),
    ];
    rows.extend(follower_rows(&[0, 1, 2]));
    let store = FakeStore::default().table(&leader_ip(0), &rows.join("\n"));
    let harness = Harness::new(FakeResolver::for_target(&target), FakeExecutor::default(), store);

    let report = run_topology_pass(&harness.toolkit, &target, ready(&target)).await;

    assert_eq!(report.action, TopologyAction::Failover);
    assert_eq!(report.outcome, ReconcileOutcome::FailingOver);
    assert_eq!(report.cluster_nodes, Some(6));
    assert_eq!(report.failed_nodes, Some(1));
    assert!(report.succeeded);

    let mut resets = harness.store.resets();
    resets.sort();
    let mut expected: Vec<String> = (0..3).map(leader_ip).chain((0..3).map(follower_ip)).collect();
    expected.sort();
    assert_eq!(resets, expected);
    assert!(harness.store.flushes().is_empty());
    assert!(harness.executor.calls().is_empty());
}

#[tokio::test]
async fn scenario_c_disconnected_link_counts_as_failure() {
    let target = ClusterTarget::new("cache", "prod", 2, 0);
    let rows = [
        row("leader0", &leader_ip(0), "myself,master", "connected"),
        row("leader1", &leader_ip(1), "master", "disconnected"),
    ];
    let store = FakeStore::default().table(&leader_ip(0), &rows.join("\n"));
    let harness = Harness::new(FakeResolver::for_target(&target), FakeExecutor::default(), store);

    let report = run_topology_pass(&harness.toolkit, &target, ready(&target)).await;

    assert_eq!(report.action, TopologyAction::Failover);
    assert_eq!(harness.store.resets().len(), 2);
}

#[tokio::test]
async fn scenario_d_partial_readiness_waits_without_side_effects() {
    let target = ClusterTarget::new("cache", "prod", 3, 3);
    let harness = Harness::new(
        FakeResolver::for_target(&target),
        FakeExecutor::default(),
        FakeStore::default(),
    );

    let report = run_topology_pass(
        &harness.toolkit,
        &target,
        ReadyReplicas {
            leaders: 3,
            followers: 2,
        },
    )
    .await;

    assert_eq!(report.outcome, ReconcileOutcome::WaitingForReadiness);
    assert_eq!(report.action, TopologyAction::None);
    assert_eq!(report.cluster_nodes, None);
    assert_eq!(
        report.outcome.requeue(),
        RequeueDirective::After(Duration::from_secs(30))
    );
    assert!(harness.executor.calls().is_empty());
    assert!(harness.store.calls().is_empty());
}

#[tokio::test]
async fn test_healthy_cluster_converges() {
    let target = ClusterTarget::new("cache", "prod", 3, 3);
    let mut rows = leader_rows(3);
    rows.extend(follower_rows(&[0, 1, 2]));
    let store = FakeStore::default().table(&leader_ip(0), &rows.join("\n"));
    let harness = Harness::new(FakeResolver::for_target(&target), FakeExecutor::default(), store);

    let report = run_topology_pass(&harness.toolkit, &target, ready(&target)).await;

    assert_eq!(report.action, TopologyAction::None);
    assert_eq!(report.outcome, ReconcileOutcome::Converged);
    assert_eq!(
        report.outcome.requeue(),
        RequeueDirective::After(Duration::from_secs(20))
    );
    assert!(harness.executor.calls().is_empty());
    assert!(harness.store.resets().is_empty());
}

#[tokio::test]
async fn test_failed_bootstrap_is_reported() {
    let target = ClusterTarget::new("cache", "prod", 3, 0);
    let harness = Harness::new(
        FakeResolver::for_target(&target),
        FakeExecutor::failing(),
        FakeStore::default(),
    );

    let report = run_topology_pass(&harness.toolkit, &target, ready(&target)).await;

    assert_eq!(report.action, TopologyAction::Bootstrap);
    assert!(!report.succeeded);
    assert!(report.message.starts_with("Cluster creation failed"));
    assert_eq!(harness.executor.calls().len(), 1);
}
