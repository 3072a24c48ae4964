//! Shared controller helpers.
//!
//! Finalizer bookkeeping and small lookups used by both the RedisCluster and
//! RedisSingle controllers.

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::{Api, Resource, ResourceExt, api::PatchParams};
use serde::de::DeserializeOwned;

use crate::controller::error::Error;

/// Finalizer guarding ordered teardown of a RedisSingle
pub const FINALIZER: &str = "redis.kubeops.dev/finalizer";

/// Add a finalizer to a resource.
pub async fn add_finalizer<T>(api: &Api<T>, name: &str, finalizer: &str) -> Result<(), Error>
where
    T: Resource + Clone + DeserializeOwned + std::fmt::Debug,
    <T as Resource>::DynamicType: Default,
{
    let resource = api.get(name).await?;
    let mut finalizers = resource.finalizers().to_vec();

    if !finalizers.iter().any(|f| f == finalizer) {
        finalizers.push(finalizer.to_string());

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        api.patch(
            name,
            &PatchParams::default(),
            &kube::api::Patch::Merge(&patch),
        )
        .await?;
    }
    Ok(())
}

/// Remove a specific finalizer from a resource.
pub async fn remove_finalizer<T>(api: &Api<T>, name: &str, finalizer: &str) -> Result<(), Error>
where
    T: Resource + Clone + DeserializeOwned + std::fmt::Debug,
    <T as Resource>::DynamicType: Default,
{
    let Some(resource) = api.get_opt(name).await? else {
        return Ok(());
    };

    let mut finalizers = resource.finalizers().to_vec();

    if let Some(pos) = finalizers.iter().position(|f| f == finalizer) {
        finalizers.remove(pos);

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        api.patch(
            name,
            &PatchParams::default(),
            &kube::api::Patch::Merge(&patch),
        )
        .await?;
    }
    Ok(())
}

/// Ready replica count of a StatefulSet. A missing StatefulSet counts as zero.
pub async fn ready_replicas(api: &Api<StatefulSet>, name: &str) -> Result<i32, Error> {
    Ok(api
        .get_opt(name)
        .await?
        .and_then(|sts| sts.status)
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0))
}

/// Whether `finalizers` contains `finalizer`.
pub fn has_finalizer<T: Resource>(resource: &T, finalizer: &str) -> bool {
    resource.finalizers().iter().any(|f| f == finalizer)
}
