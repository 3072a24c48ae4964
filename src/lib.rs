//! redis-cluster-operator library crate
//!
//! Exports the controllers, CRD definitions, resource generators and the
//! cluster toolkit that drives the live Redis cluster.

pub mod client;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;

pub use config::OperatorConfig;
pub use health::HealthState;

use std::sync::Arc;

use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{Controller, WatchStreamExt, metadata_watcher, predicates, reflector, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use controller::context::Context;
use controller::{cluster_reconciler, single_reconciler};
use crd::{RedisCluster, RedisSingle};

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Reflector-backed stream of applied objects, filtered to spec changes.
fn create_filtered_stream<K>(
    api: Api<K>,
    watcher_config: WatcherConfig,
) -> (
    reflector::Store<K>,
    impl Stream<Item = Result<K, watcher::Error>>,
)
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher_config))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::generation);
    (reader, stream)
}

/// Log the outcome of one reconcile, demoting errors for deleted objects.
async fn log_result<K>(
    kind: &'static str,
    result: Result<
        (reflector::ObjectRef<K>, kube::runtime::controller::Action),
        kube::runtime::controller::Error<controller::error::Error, watcher::Error>,
    >,
) where
    K: Resource,
{
    match result {
        Ok((obj, _action)) => {
            debug!(kind, "Reconciled: {}", obj.name);
        }
        Err(e) => {
            let is_not_found = match &e {
                kube::runtime::controller::Error::ObjectNotFound(_) => true,
                kube::runtime::controller::Error::ReconcilerFailed(err, _) => err.is_not_found(),
                _ => false,
            };
            if is_not_found {
                debug!(kind, "Object no longer exists (likely deleted): {:?}", e);
            } else {
                error!(kind, "Reconciliation error: {:?}", e);
            }
        }
    }
}

/// Run both controllers until their streams end.
///
/// `config.watch_namespace` scopes every watch to one namespace; `None`
/// watches cluster-wide.
pub async fn run_controllers(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) {
    let namespace = config.watch_namespace.as_deref();
    info!(
        "Starting controllers for RedisCluster and RedisSingle (scope: {})",
        namespace.unwrap_or("cluster-wide")
    );

    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let ctx = Arc::new(Context::new(client.clone(), &config, health_state));
    let watcher_config = default_watcher_config();

    let clusters: Api<RedisCluster> = scoped_api(client.clone(), namespace);
    let (cluster_reader, cluster_stream) =
        create_filtered_stream(clusters, watcher_config.clone());
    // StatefulSets are watched in full because reconcile reads readyReplicas;
    // Services only need metadata.
    let cluster_controller = Controller::for_stream(cluster_stream, cluster_reader)
        .owns(
            scoped_api::<StatefulSet>(client.clone(), namespace),
            watcher_config.clone(),
        )
        .owns_stream(
            metadata_watcher(
                scoped_api::<Service>(client.clone(), namespace),
                watcher_config.clone(),
            )
            .touched_objects(),
        )
        .run(
            cluster_reconciler::reconcile,
            cluster_reconciler::error_policy,
            ctx.clone(),
        )
        .for_each(|result| log_result("RedisCluster", result));

    let singles: Api<RedisSingle> = scoped_api(client.clone(), namespace);
    let (single_reader, single_stream) = create_filtered_stream(singles, watcher_config.clone());
    let single_controller = Controller::for_stream(single_stream, single_reader)
        .owns(
            scoped_api::<StatefulSet>(client.clone(), namespace),
            watcher_config,
        )
        .run(
            single_reconciler::reconcile,
            single_reconciler::error_policy,
            ctx,
        )
        .for_each(|result| log_result("RedisSingle", result));

    tokio::join!(cluster_controller, single_controller);

    error!("Controller streams ended unexpectedly");
}
