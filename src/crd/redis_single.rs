//! RedisSingle Custom Resource Definition.
//!
//! A single, non-clustered Redis instance backed by a one-replica StatefulSet.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{Condition, KubernetesConfig, RedisConfig, StorageSpec};

/// RedisSingle is a custom resource for a standalone Redis instance.
///
/// Example:
/// ```yaml
/// apiVersion: redis.kubeops.dev/v1alpha1
/// kind: RedisSingle
/// metadata:
///   name: sessions
/// spec:
///   kubernetesConfig:
///     image: redis:7.2
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "redis.kubeops.dev",
    version = "v1alpha1",
    kind = "RedisSingle",
    plural = "redissingles",
    shortname = "rsg",
    status = "RedisSingleStatus",
    namespaced,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RedisSingleSpec {
    pub kubernetes_config: KubernetesConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_config: Option<RedisConfig>,

    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
}

impl RedisSingleSpec {
    pub fn external_config(&self) -> Option<&str> {
        self.redis_config
            .as_ref()
            .and_then(|c| c.additional_redis_config.as_deref())
    }
}

/// Status of a RedisSingle.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisSingleStatus {
    #[serde(default)]
    pub ready_replicas: i32,

    /// Names of the pods currently backing the instance, in list order.
    #[serde(default)]
    pub nodes: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}
