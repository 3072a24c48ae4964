//! Common resource generation utilities.
//!
//! Naming, labels, annotations and owner references shared by the
//! StatefulSet and Service generators.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::crd::{API_GROUP, NodeRole};

/// `redis_setup_type` label value for clustered pods.
pub const SETUP_TYPE_CLUSTER: &str = "cluster";
/// `redis_setup_type` and `role` label value for standalone pods.
pub const SETUP_TYPE_STANDALONE: &str = "standalone";

/// Name of the StatefulSet and Services of one role group: `<cluster>-<role>`.
pub fn role_resource_name(cluster_name: &str, role: NodeRole) -> String {
    format!("{}-{}", cluster_name, role.as_str())
}

pub fn headless_service_name(base: &str) -> String {
    format!("{base}-headless")
}

/// Labels that select the pods of one StatefulSet.
pub fn selector_labels(app: &str, setup_type: &str, role: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), app.to_string()),
        ("redis_setup_type".to_string(), setup_type.to_string()),
        ("role".to_string(), role.to_string()),
    ])
}

/// The owner's labels plus the selector labels.
///
/// Selector keys always keep their selector values so the pod template
/// matches the StatefulSet selector.
pub fn redis_labels(
    app: &str,
    setup_type: &str,
    role: &str,
    owner_labels: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut labels = owner_labels.clone();
    labels.extend(selector_labels(app, setup_type, role));
    labels
}

/// Annotations written by apply tooling, never copied onto owned objects.
const CLIENT_BOOKKEEPING_ANNOTATIONS: [&str; 2] = [
    "kubectl.kubernetes.io/last-applied-configuration",
    "banzaicloud.com/last-applied",
];

/// Operator annotations plus the owner's own, minus client bookkeeping.
pub fn redis_annotations(
    instance: &str,
    owner_annotations: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::from([
        (API_GROUP.to_string(), "true".to_string()),
        (format!("{API_GROUP}/instance"), instance.to_string()),
    ]);
    annotations.extend(
        owner_annotations
            .iter()
            .filter(|(k, _)| !CLIENT_BOOKKEEPING_ANNOTATIONS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    annotations
}

/// Controller owner reference pointing at a custom resource.
pub fn owner_reference<K>(owner: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: owner.name_any(),
        uid: owner.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Metadata for an owned object.
pub fn owned_meta<K>(
    owner: &K,
    name: &str,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
) -> ObjectMeta
where
    K: Resource<DynamicType = ()>,
{
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: owner.namespace(),
        labels: Some(labels),
        annotations: Some(annotations),
        owner_references: Some(vec![owner_reference(owner)]),
        ..Default::default()
    }
}
