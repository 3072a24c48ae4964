//! Create-or-patch of generated objects via server-side apply.

use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::controller::context::FIELD_MANAGER;
use crate::controller::error::Error;

/// Apply `object` with the operator's field manager.
///
/// Returns `true` when the object did not exist before this call.
pub async fn apply<K>(client: &Client, object: &K) -> Result<bool, Error>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug,
{
    let name = object
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::MissingField("metadata.name".to_string()))?;
    let namespace = object
        .namespace()
        .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;
    let api: Api<K> = Api::namespaced(client.clone(), &namespace);

    let created = api.get_opt(&name).await?.is_none();
    api.patch(
        &name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(object),
    )
    .await?;

    if created {
        info!(kind = %K::kind(&()), name = %name, namespace = %namespace, "Created object");
    } else {
        debug!(kind = %K::kind(&()), name = %name, namespace = %namespace, "Applied object");
    }
    Ok(created)
}

/// Apply a StatefulSet. Returns `true` if it was newly created.
pub async fn ensure_statefulset(client: &Client, statefulset: &StatefulSet) -> Result<bool, Error> {
    apply(client, statefulset).await
}

/// Apply a set of Services. Returns `true` if any was newly created.
pub async fn ensure_services(client: &Client, services: &[Service]) -> Result<bool, Error> {
    let mut created = false;
    for service in services {
        created |= apply(client, service).await?;
    }
    Ok(created)
}
