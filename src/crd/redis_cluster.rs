//! RedisCluster Custom Resource Definition.
//!
//! A RedisCluster is split into two role groups, leaders and followers, each
//! backed by its own StatefulSet. Follower `i` replicates leader `i`.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{Condition, KubernetesConfig, RedisConfig, StorageSpec};

/// RedisCluster is a custom resource for a leader/follower Redis cluster.
///
/// Example:
/// ```yaml
/// apiVersion: redis.kubeops.dev/v1alpha1
/// kind: RedisCluster
/// metadata:
///   name: cache
/// spec:
///   size: 3
///   kubernetesConfig:
///     image: redis:7.2
///   redisFollower:
///     replicas: 3
///   storage:
///     volumeClaimTemplate:
///       size: 5Gi
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "redis.kubeops.dev",
    version = "v1alpha1",
    kind = "RedisCluster",
    plural = "redisclusters",
    shortname = "rcl",
    status = "RedisClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Leaders", "type":"integer", "jsonPath":".status.readyLeaders"}"#,
    printcolumn = r#"{"name":"Followers", "type":"integer", "jsonPath":".status.readyFollowers"}"#,
    printcolumn = r#"{"name":"Nodes", "type":"integer", "jsonPath":".status.clusterNodes"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterSpec {
    /// Fallback replica count for any role group that does not set its own.
    #[serde(default = "default_size")]
    pub size: i32,

    #[serde(default)]
    pub redis_leader: RedisRoleSpec,

    #[serde(default)]
    pub redis_follower: RedisRoleSpec,

    pub kubernetes_config: KubernetesConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,

    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
}

impl Default for RedisClusterSpec {
    fn default() -> Self {
        Self {
            size: default_size(),
            redis_leader: RedisRoleSpec::default(),
            redis_follower: RedisRoleSpec::default(),
            kubernetes_config: KubernetesConfig::default(),
            storage: None,
            node_selector: BTreeMap::new(),
        }
    }
}

fn default_size() -> i32 {
    3
}

/// Per-role settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisRoleSpec {
    /// Replica count for this role. Falls back to `spec.size` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_config: Option<RedisConfig>,
}

/// Role group of a cluster node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Leader,
    Follower,
}

impl NodeRole {
    pub const ALL: [NodeRole; 2] = [NodeRole::Leader, NodeRole::Follower];

    /// Name used in object names and the `role` label.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Leader => "leader",
            NodeRole::Follower => "follower",
        }
    }

    /// Token identifying this role in the CLUSTER NODES flags column.
    pub fn flag_token(&self) -> &'static str {
        match self {
            NodeRole::Leader => "master",
            NodeRole::Follower => "slave",
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RedisClusterSpec {
    pub fn role(&self, role: NodeRole) -> &RedisRoleSpec {
        match role {
            NodeRole::Leader => &self.redis_leader,
            NodeRole::Follower => &self.redis_follower,
        }
    }

    /// Replica count for a role group, falling back to `size`. Negative values clamp to 0.
    pub fn effective_replicas(&self, role: NodeRole) -> i32 {
        self.role(role).replicas.unwrap_or(self.size).max(0)
    }

    pub fn effective_leader_count(&self) -> i32 {
        self.effective_replicas(NodeRole::Leader)
    }

    pub fn effective_follower_count(&self) -> i32 {
        self.effective_replicas(NodeRole::Follower)
    }

    /// Reject replica counts the API schema lets through but the cluster
    /// cannot represent.
    pub fn validate(&self) -> Result<(), String> {
        if self.size < 0 {
            return Err(format!("spec.size must not be negative, got {}", self.size));
        }
        for role in NodeRole::ALL {
            if let Some(replicas) = self.role(role).replicas.filter(|r| *r < 0) {
                return Err(format!(
                    "spec.redis{}.replicas must not be negative, got {replicas}",
                    match role {
                        NodeRole::Leader => "Leader",
                        NodeRole::Follower => "Follower",
                    }
                ));
            }
        }
        Ok(())
    }

    /// Name of the ConfigMap included by a role's pods, if any.
    pub fn external_config(&self, role: NodeRole) -> Option<&str> {
        self.role(role)
            .redis_config
            .as_ref()
            .and_then(|c| c.additional_redis_config.as_deref())
    }
}

/// Status of a RedisCluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterStatus {
    #[serde(default)]
    pub phase: ClusterPhase,

    #[serde(default)]
    pub ready_leaders: i32,

    #[serde(default)]
    pub ready_followers: i32,

    /// Rows in the last observed CLUSTER NODES table.
    #[serde(default)]
    pub cluster_nodes: i32,

    /// Rows flagged `fail` or `disconnected` in the last observed table.
    #[serde(default)]
    pub failed_nodes: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Phase reported after each topology pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ClusterPhase {
    #[default]
    Pending,
    /// StatefulSets were just created.
    Creating,
    WaitingForReadiness,
    Bootstrapping,
    Replicating,
    FailingOver,
    Converged,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClusterPhase::Pending => "Pending",
            ClusterPhase::Creating => "Creating",
            ClusterPhase::WaitingForReadiness => "WaitingForReadiness",
            ClusterPhase::Bootstrapping => "Bootstrapping",
            ClusterPhase::Replicating => "Replicating",
            ClusterPhase::FailingOver => "FailingOver",
            ClusterPhase::Converged => "Converged",
        };
        f.write_str(s)
    }
}
