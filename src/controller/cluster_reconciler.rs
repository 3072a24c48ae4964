//! Reconciliation loop for RedisCluster.
//!
//! Every tick makes sure both role StatefulSets and their Services exist,
//! then hands over to the topology pass. The loop never settles: even a
//! converged cluster is re-inspected every 20 seconds so failed nodes are
//! noticed.

use std::sync::Arc;
use std::time::Instant;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::{
    Api, ResourceExt,
    api::{Patch, PatchParams},
    runtime::controller::Action,
};
use tracing::{debug, error, info, warn};

use crate::{
    cluster::ClusterTarget,
    controller::{
        common::ready_replicas,
        context::{Context, FIELD_MANAGER},
        error::Error,
        status::ConditionBuilder,
        topology::{
            ReadyReplicas, ReconcileOutcome, RequeueDirective, TopologyAction, TopologyReport,
            run_topology_pass,
        },
    },
    crd::{ClusterPhase, NodeRole, RedisCluster, RedisClusterStatus},
    resources::{
        apply::{ensure_services, ensure_statefulset},
        common::role_resource_name,
        services::cluster_services,
        statefulset::cluster_statefulset,
    },
};

const KIND: &str = "RedisCluster";

/// Reconcile a RedisCluster
pub async fn reconcile(obj: Arc<RedisCluster>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;

    debug!(name = %name, namespace = %namespace, "Reconciling RedisCluster");

    // Owned objects are garbage collected through their owner references.
    if obj.metadata.deletion_timestamp.is_some() {
        debug!(name = %name, "RedisCluster is being deleted");
        return Ok(Action::await_change());
    }

    if let Err(reason) = obj.spec.validate() {
        ctx.publish_warning_event(
            obj.as_ref(),
            "InvalidSpec",
            "Validate",
            Some(reason.clone()),
        )
        .await;
        return Err(Error::Validation(reason));
    }

    let api: Api<RedisCluster> = Api::namespaced(ctx.client.clone(), &namespace);
    let target = ClusterTarget::from_resource(&obj);

    if ensure_owned_resources(&obj, &ctx, &target).await? {
        ctx.publish_normal_event(
            obj.as_ref(),
            "Creating",
            "CreateResources",
            Some("Created StatefulSets for leaders and followers".to_string()),
        )
        .await;
        let status = creating_status(&obj);
        patch_status(&api, &name, &status).await?;
        return Ok(RequeueDirective::Immediate.into());
    }

    let sts_api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), &namespace);
    let ready = ReadyReplicas {
        leaders: ready_replicas(&sts_api, &role_resource_name(&name, NodeRole::Leader)).await?,
        followers: ready_replicas(&sts_api, &role_resource_name(&name, NodeRole::Follower))
            .await?,
    };

    let report = run_topology_pass(&ctx.toolkit, &target, ready).await;
    publish_action_event(&obj, &ctx, &report).await;

    let status = build_status(&obj, &report, ready);
    patch_status(&api, &name, &status).await?;

    if let Some(ref health_state) = ctx.health_state {
        let metrics = &health_state.metrics;
        for (role, ready_count) in [
            (NodeRole::Leader, ready.leaders),
            (NodeRole::Follower, ready.followers),
        ] {
            metrics.set_role_replicas(
                &namespace,
                &name,
                role.as_str(),
                i64::from(target.replicas(role)),
                i64::from(ready_count),
            );
        }
        if let (Some(nodes), Some(failed)) = (report.cluster_nodes, report.failed_nodes) {
            metrics.set_cluster_nodes(
                &namespace,
                &name,
                i64::try_from(nodes).unwrap_or(i64::MAX),
                i64::try_from(failed).unwrap_or(i64::MAX),
            );
        }
        if report.action != TopologyAction::None {
            metrics.record_topology_action(&namespace, &name, report.action.as_str());
        }
        metrics.record_reconcile(KIND, &namespace, &name, start_time.elapsed().as_secs_f64());
        health_state.touch_reconcile();
    }

    Ok(report.outcome.requeue().into())
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<RedisCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(KIND, &namespace, &name);
    }

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
    }
    Action::requeue(error.requeue_after())
}

/// Apply both StatefulSets and the Services of every non-empty role.
///
/// Returns `true` if a StatefulSet was created by this call.
async fn ensure_owned_resources(
    obj: &RedisCluster,
    ctx: &Context,
    target: &ClusterTarget,
) -> Result<bool, Error> {
    let mut created = false;
    for role in NodeRole::ALL {
        if ensure_statefulset(&ctx.client, &cluster_statefulset(obj, role)).await? {
            info!(name = %obj.name_any(), role = %role, "Created StatefulSet");
            created = true;
        }
        if target.replicas(role) > 0 {
            ensure_services(&ctx.client, &cluster_services(obj, role)).await?;
        }
    }
    Ok(created)
}

async fn publish_action_event(obj: &RedisCluster, ctx: &Context, report: &TopologyReport) {
    let (reason, action) = match report.action {
        TopologyAction::None => return,
        TopologyAction::Bootstrap => ("Bootstrapping", "CreateCluster"),
        TopologyAction::AttachFollowers => ("Replicating", "AttachFollowers"),
        TopologyAction::Failover => ("FailingOver", "ResetNodes"),
    };
    if report.succeeded {
        ctx.publish_normal_event(obj, reason, action, Some(report.message.clone()))
            .await;
    } else {
        ctx.publish_warning_event(obj, reason, action, Some(report.message.clone()))
            .await;
    }
}

fn count(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn creating_status(obj: &RedisCluster) -> RedisClusterStatus {
    let generation = obj.metadata.generation;
    let previous = obj.status.clone().unwrap_or_default();
    let mut conditions = ConditionBuilder::from_existing(&previous.conditions);
    conditions
        .ready(false, "Creating", "StatefulSets created", generation)
        .progressing(true, "Creating", "StatefulSets created", generation);

    RedisClusterStatus {
        phase: ClusterPhase::Creating,
        observed_generation: generation,
        conditions: conditions.build(),
        ..previous
    }
}

/// Status after one topology pass.
///
/// Node counts are only replaced when the pass actually took a snapshot.
pub fn build_status(
    obj: &RedisCluster,
    report: &TopologyReport,
    ready: ReadyReplicas,
) -> RedisClusterStatus {
    let generation = obj.metadata.generation;
    let previous = obj.status.clone().unwrap_or_default();
    let mut conditions = ConditionBuilder::from_existing(&previous.conditions);

    let phase = report.outcome.phase();
    let reason = phase.to_string();
    match report.outcome {
        ReconcileOutcome::Converged => {
            conditions
                .ready(true, &reason, &report.message, generation)
                .progressing(false, &reason, &report.message, generation);
        }
        ReconcileOutcome::WaitingForReadiness
        | ReconcileOutcome::Bootstrapping
        | ReconcileOutcome::Replicating
        | ReconcileOutcome::FailingOver => {
            conditions
                .ready(false, &reason, &report.message, generation)
                .progressing(true, &reason, &report.message, generation);
        }
    }

    let failed_nodes = report
        .failed_nodes
        .map(count)
        .unwrap_or(previous.failed_nodes);
    let degraded = report.outcome == ReconcileOutcome::FailingOver || !report.succeeded;
    let degraded_reason = if report.succeeded { "FailedNodes" } else { "CommandFailed" };
    if degraded {
        conditions.degraded(true, degraded_reason, &report.message, generation);
    } else {
        conditions.degraded(false, "Healthy", "No failed nodes observed", generation);
    }

    RedisClusterStatus {
        phase,
        ready_leaders: ready.leaders,
        ready_followers: ready.followers,
        cluster_nodes: report
            .cluster_nodes
            .map(count)
            .unwrap_or(previous.cluster_nodes),
        failed_nodes,
        observed_generation: generation,
        conditions: conditions.build(),
    }
}

async fn patch_status(
    api: &Api<RedisCluster>,
    name: &str,
    status: &RedisClusterStatus,
) -> Result<(), Error> {
    let patch = serde_json::json!({
        "status": serde_json::to_value(status)?
    });
    api.patch_status(
        name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}
