//! Reconciliation loop for RedisSingle.
//!
//! A standalone instance is one StatefulSet with a single replica plus its
//! two Services. A finalizer is attached before anything is created. On
//! deletion the Services and the data PVC are removed explicitly and the
//! finalizer is cleared last.

use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use kube::{
    Api, Client, ResourceExt,
    api::{DeleteParams, ListParams, Patch, PatchParams},
    runtime::controller::Action,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::{
    controller::{
        common::{FINALIZER, add_finalizer, has_finalizer, ready_replicas, remove_finalizer},
        context::{Context, FIELD_MANAGER},
        error::Error,
        status::ConditionBuilder,
    },
    crd::{RedisSingle, RedisSingleStatus},
    resources::{
        apply::{ensure_services, ensure_statefulset},
        common::{SETUP_TYPE_STANDALONE, headless_service_name, selector_labels},
        services::single_services,
        statefulset::single_statefulset,
    },
};

const KIND: &str = "RedisSingle";

/// Delay between passes over a standalone instance.
pub const SINGLE_REQUEUE: Duration = Duration::from_secs(15);

/// Objects removed explicitly before the finalizer is cleared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeardownPlan {
    pub services: Vec<String>,
    pub pvc: String,
}

impl TeardownPlan {
    /// Services `<name>` and `<name>-headless`, and PVC `<name>-<name>-0`
    /// (claim template `<name>` of pod `<name>-0`).
    pub fn for_instance(name: &str) -> Self {
        Self {
            services: vec![name.to_string(), headless_service_name(name)],
            pvc: format!("{name}-{name}-0"),
        }
    }
}

/// Deletion steps of one instance.
#[async_trait]
pub trait TeardownSteps: Send + Sync {
    /// Delete a Service. An already missing Service is not an error.
    async fn delete_service(&self, name: &str) -> Result<(), Error>;
    /// Delete a PVC. An already missing claim is not an error.
    async fn delete_claim(&self, name: &str) -> Result<(), Error>;
    async fn release_finalizer(&self) -> Result<(), Error>;
}

/// Run `plan` against `steps`: Services, then the PVC, then the finalizer.
///
/// The first failing step stops the teardown, so the finalizer stays in place
/// and the next tick starts over.
pub async fn run_teardown(plan: &TeardownPlan, steps: &dyn TeardownSteps) -> Result<(), Error> {
    for service in &plan.services {
        steps.delete_service(service).await?;
    }
    steps.delete_claim(&plan.pvc).await?;
    steps.release_finalizer().await
}

/// [`TeardownSteps`] against the Kubernetes API.
struct KubeTeardown {
    services: Api<Service>,
    claims: Api<PersistentVolumeClaim>,
    owner: Api<RedisSingle>,
    name: String,
}

#[async_trait]
impl TeardownSteps for KubeTeardown {
    async fn delete_service(&self, name: &str) -> Result<(), Error> {
        delete_if_present(&self.services, name).await
    }

    async fn delete_claim(&self, name: &str) -> Result<(), Error> {
        delete_if_present(&self.claims, name).await
    }

    async fn release_finalizer(&self) -> Result<(), Error> {
        remove_finalizer(&self.owner, &self.name, FINALIZER).await
    }
}

/// Reconcile a RedisSingle
pub async fn reconcile(obj: Arc<RedisSingle>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;

    debug!(name = %name, namespace = %namespace, "Reconciling RedisSingle");

    let api: Api<RedisSingle> = Api::namespaced(ctx.client.clone(), &namespace);

    if obj.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&obj, &ctx, &api, &namespace).await;
    }

    if !has_finalizer(obj.as_ref(), FINALIZER) {
        info!(name = %name, "Adding finalizer");
        add_finalizer(&api, &name, FINALIZER).await?;
    }

    if ensure_statefulset(&ctx.client, &single_statefulset(&obj)).await? {
        ctx.publish_normal_event(
            obj.as_ref(),
            "Creating",
            "CreateResources",
            Some("Created StatefulSet".to_string()),
        )
        .await;
    }
    ensure_services(&ctx.client, &single_services(&obj)).await?;

    let sts_api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), &namespace);
    let ready = ready_replicas(&sts_api, &name).await?;
    let nodes = pod_names(&ctx.client, &namespace, &name).await?;

    let previous = obj.status.clone().unwrap_or_default();
    if status_changed(&previous, ready, &nodes, obj.metadata.generation) {
        let status = build_status(&obj, ready, nodes);
        let patch = serde_json::json!({
            "status": serde_json::to_value(&status)?
        });
        api.patch_status(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        debug!(name = %name, ready, "Updated status");
    }

    if let Some(ref health_state) = ctx.health_state {
        health_state
            .metrics
            .record_reconcile(KIND, &namespace, &name, start_time.elapsed().as_secs_f64());
        health_state.touch_reconcile();
    }

    Ok(Action::requeue(SINGLE_REQUEUE))
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<RedisSingle>, error: &Error, ctx: Arc<Context>) -> Action {
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

async fn handle_deletion(
    obj: &RedisSingle,
    ctx: &Context,
    api: &Api<RedisSingle>,
    namespace: &str,
) -> Result<Action, Error> {
    let name = obj.name_any();
    if !has_finalizer(obj, FINALIZER) {
        return Ok(Action::await_change());
    }

    info!(name = %name, "Handling deletion");
    let steps = KubeTeardown {
        services: Api::namespaced(ctx.client.clone(), namespace),
        claims: Api::namespaced(ctx.client.clone(), namespace),
        owner: api.clone(),
        name: name.clone(),
    };
    run_teardown(&TeardownPlan::for_instance(&name), &steps).await?;
    info!(name = %name, "Teardown complete, finalizer removed");
    Ok(Action::await_change())
}

/// Delete an object, treating an already missing object as success.
async fn delete_if_present<K>(api: &Api<K>, name: &str) -> Result<(), Error>
where
    K: kube::Resource + Clone + DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!(name = %name, "Deleted");
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {
            debug!(name = %name, "Already gone");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Names of the pods selected by the instance's StatefulSet, in list order.
async fn pod_names(client: &Client, namespace: &str, name: &str) -> Result<Vec<String>, Error> {
    let selector = selector_labels(name, SETUP_TYPE_STANDALONE, SETUP_TYPE_STANDALONE)
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let list = pods.list(&ListParams::default().labels(&selector)).await?;
    Ok(list.items.iter().map(|pod| pod.name_any()).collect())
}

/// Whether the reported status differs from what was just observed.
///
/// Pod names are compared as an ordered sequence.
pub fn status_changed(
    previous: &RedisSingleStatus,
    ready: i32,
    nodes: &[String],
    generation: Option<i64>,
) -> bool {
    previous.ready_replicas != ready
        || previous.nodes.as_slice() != nodes
        || previous.observed_generation != generation
}

pub fn build_status(obj: &RedisSingle, ready: i32, nodes: Vec<String>) -> RedisSingleStatus {
    let generation = obj.metadata.generation;
    let previous = obj.status.clone().unwrap_or_default();
    let mut conditions = ConditionBuilder::from_existing(&previous.conditions);
    if ready >= 1 {
        conditions.ready(true, "Ready", "Instance is ready", generation);
    } else {
        conditions.ready(false, "WaitingForReadiness", "Instance is not ready", generation);
    }

    RedisSingleStatus {
        ready_replicas: ready,
        nodes,
        observed_generation: generation,
        conditions: conditions.build(),
    }
}
