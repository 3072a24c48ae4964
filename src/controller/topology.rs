//! Topology pass of the RedisCluster controller.
//!
//! One pass is a readiness gate, one snapshot, one decision and at most one
//! dispatched action. Nothing is remembered between passes. A failed command
//! is logged and re-derived from a fresh snapshot on the next tick.
//!
//! ```text
//! readiness mismatch ───────────────────────────▶ WaitingForReadiness (30s)
//! nodes != desired, leaders != desired ─────────▶ Bootstrapping
//! nodes != desired, leaders ok, followers > 0 ──▶ Replicating
//! nodes == desired, failed > 0 ─────────────────▶ FailingOver
//! otherwise ────────────────────────────────────▶ Converged
//! ```

use std::time::Duration;

use kube::runtime::controller::Action;
use tracing::{debug, info, warn};

use crate::client::ClusterTopologySnapshot;
use crate::cluster::commander::log_exec_failure;
use crate::cluster::{ClusterTarget, ClusterToolkit};
use crate::crd::{ClusterPhase, NodeRole};

/// Delay before re-checking a cluster whose pods are not all ready.
pub const READINESS_REQUEUE: Duration = Duration::from_secs(30);
/// Delay between topology passes.
pub const TOPOLOGY_REQUEUE: Duration = Duration::from_secs(20);

/// Action chosen for one topology pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TopologyAction {
    None,
    Bootstrap,
    AttachFollowers,
    Failover,
}

impl TopologyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopologyAction::None => "none",
            TopologyAction::Bootstrap => "bootstrap",
            TopologyAction::AttachFollowers => "attach_followers",
            TopologyAction::Failover => "failover",
        }
    }

    pub fn outcome(&self) -> ReconcileOutcome {
        match self {
            TopologyAction::None => ReconcileOutcome::Converged,
            TopologyAction::Bootstrap => ReconcileOutcome::Bootstrapping,
            TopologyAction::AttachFollowers => ReconcileOutcome::Replicating,
            TopologyAction::Failover => ReconcileOutcome::FailingOver,
        }
    }
}

impl std::fmt::Display for TopologyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one pass. Only selects the requeue delay and the reported phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Converged,
    WaitingForReadiness,
    Bootstrapping,
    Replicating,
    FailingOver,
}

impl ReconcileOutcome {
    pub fn phase(&self) -> ClusterPhase {
        match self {
            ReconcileOutcome::Converged => ClusterPhase::Converged,
            ReconcileOutcome::WaitingForReadiness => ClusterPhase::WaitingForReadiness,
            ReconcileOutcome::Bootstrapping => ClusterPhase::Bootstrapping,
            ReconcileOutcome::Replicating => ClusterPhase::Replicating,
            ReconcileOutcome::FailingOver => ClusterPhase::FailingOver,
        }
    }

    pub fn requeue(&self) -> RequeueDirective {
        match self {
            ReconcileOutcome::WaitingForReadiness => RequeueDirective::After(READINESS_REQUEUE),
            _ => RequeueDirective::After(TOPOLOGY_REQUEUE),
        }
    }
}

/// When the controller should run again for the same object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequeueDirective {
    None,
    Immediate,
    After(Duration),
}

impl From<RequeueDirective> for Action {
    fn from(directive: RequeueDirective) -> Self {
        match directive {
            RequeueDirective::None => Action::await_change(),
            RequeueDirective::Immediate => Action::requeue(Duration::ZERO),
            RequeueDirective::After(delay) => Action::requeue(delay),
        }
    }
}

/// Ready replica counts read from the two StatefulSets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadyReplicas {
    pub leaders: i32,
    pub followers: i32,
}

impl ReadyReplicas {
    /// Both role groups report exactly the desired number of ready pods.
    pub fn matches(&self, target: &ClusterTarget) -> bool {
        i64::from(self.leaders) == i64::from(target.leaders)
            && i64::from(self.followers) == i64::from(target.followers)
    }
}

/// Choose the action for one pass from the desired counts and a snapshot.
///
/// Leader formation comes before follower attachment, and failover is only
/// considered once the node count already matches.
pub fn decide(
    desired_leaders: u32,
    desired_followers: u32,
    snapshot: &ClusterTopologySnapshot,
) -> TopologyAction {
    if desired_leaders == 0 {
        return TopologyAction::None;
    }

    let desired_total = desired_leaders as usize + desired_followers as usize;
    if snapshot.total_count() != desired_total {
        if snapshot.role_count(Some(NodeRole::Leader)) != desired_leaders as usize {
            TopologyAction::Bootstrap
        } else if desired_followers > 0 {
            TopologyAction::AttachFollowers
        } else {
            TopologyAction::None
        }
    } else if snapshot.failed_count() > 0 {
        TopologyAction::Failover
    } else {
        TopologyAction::None
    }
}

/// What one topology pass observed and did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopologyReport {
    pub outcome: ReconcileOutcome,
    pub action: TopologyAction,
    /// Rows in the snapshot the decision was based on. `None` if no snapshot was taken.
    pub cluster_nodes: Option<usize>,
    pub failed_nodes: Option<usize>,
    /// Whether the dispatched action completed without any failure.
    pub succeeded: bool,
    /// Human readable summary, used for events and conditions.
    pub message: String,
}

impl TopologyReport {
    fn waiting(target: &ClusterTarget, ready: ReadyReplicas) -> Self {
        Self {
            outcome: ReconcileOutcome::WaitingForReadiness,
            action: TopologyAction::None,
            cluster_nodes: None,
            failed_nodes: None,
            succeeded: true,
            message: format!(
                "{}/{} leaders and {}/{} followers ready",
                ready.leaders, target.leaders, ready.followers, target.followers
            ),
        }
    }
}

/// Run one topology pass against a cluster.
///
/// Inspection and command failures are absorbed here and reflected in the
/// report. This function never fails.
pub async fn run_topology_pass(
    toolkit: &ClusterToolkit,
    target: &ClusterTarget,
    ready: ReadyReplicas,
) -> TopologyReport {
    if !ready.matches(target) {
        info!(
            cluster = %target.name,
            ready_leaders = ready.leaders,
            desired_leaders = target.leaders,
            ready_followers = ready.followers,
            desired_followers = target.followers,
            "Waiting for pods to become ready"
        );
        return TopologyReport::waiting(target, ready);
    }

    let snapshot = toolkit.inspector().snapshot(target).await;
    let action = decide(target.leaders, target.followers, &snapshot);
    debug!(
        cluster = %target.name,
        nodes = snapshot.total_count(),
        leaders = snapshot.role_count(Some(NodeRole::Leader)),
        failed = snapshot.failed_count(),
        action = %action,
        "Topology decision"
    );

    let commander = toolkit.commander();
    let (succeeded, message) = match action {
        TopologyAction::None => (
            true,
            format!("{} nodes in cluster", snapshot.total_count()),
        ),
        TopologyAction::Bootstrap => match commander.bootstrap(target).await {
            Ok(output) => {
                info!(cluster = %target.name, stdout = %output.stdout, "Cluster created");
                (true, format!("Created cluster from {} leaders", target.leaders))
            }
            Err(e) => {
                log_exec_failure(&e, "Cluster creation failed");
                (false, format!("Cluster creation failed: {e}"))
            }
        },
        TopologyAction::AttachFollowers => {
            let report = commander.attach_followers(target, &snapshot).await;
            (
                report.failed == 0,
                format!(
                    "Attached {} followers ({} already joined, {} unpaired, {} failed)",
                    report.attached.len(),
                    report.skipped,
                    report.unpaired,
                    report.failed
                ),
            )
        }
        TopologyAction::Failover => {
            warn!(
                cluster = %target.name,
                failed = snapshot.failed_count(),
                "Failed nodes detected, resetting cluster"
            );
            let report = commander.failover(target).await;
            (
                report.failed == 0,
                format!(
                    "Reset {} nodes ({} flushed, {} failed)",
                    report.reset + report.flushed,
                    report.flushed,
                    report.failed
                ),
            )
        }
    };

    TopologyReport {
        outcome: action.outcome(),
        action,
        cluster_nodes: Some(snapshot.total_count()),
        failed_nodes: Some(snapshot.failed_count()),
        succeeded,
        message,
    }
}
