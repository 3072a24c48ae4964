//! Application-level cluster management.
//!
//! Everything here works against the live Redis cluster rather than
//! Kubernetes objects:
//!
//! - `address`: pod name to IP resolution
//! - `exec`: running the cluster tool inside a store pod
//! - `inspector`: reading the `CLUSTER NODES` table from a leader
//! - `commander`: cluster creation, follower attachment and failover
//!
//! Nothing is cached between reconcile passes. Every pass resolves
//! addresses and reads the table afresh.

pub mod address;
pub mod commander;
pub mod exec;
pub mod inspector;

use std::sync::Arc;

use kube::{Client, ResourceExt};
use thiserror::Error;

use crate::client::{RedisClientConfig, RedisConnector, StoreConnector, StoreError};
use crate::config::OperatorConfig;
use crate::crd::{NodeRole, RedisCluster};
use crate::resources::common::role_resource_name;
use crate::resources::statefulset::CLIENT_PORT;

pub use address::{KubeAddressResolver, NodeAddress, NodeAddressResolver};
pub use commander::{AttachReport, ClusterCommander, FailoverReport};
pub use exec::{ExecOutput, PodExecutor, RemoteCommandExecutor};
pub use inspector::TopologyInspector;

/// Errors from cluster-level operations.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// The pod does not exist (yet).
    #[error("pod {0} not found")]
    NotFound(InstanceRef),

    /// The pod exists but has no usable IP.
    #[error("pod {instance} has no usable address: {reason}")]
    NoAddress { instance: InstanceRef, reason: String },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Exec channel failure or non-zero exit. Captured output is kept for logging.
    #[error("command failed in {instance}: {message}")]
    Exec {
        instance: InstanceRef,
        message: String,
        stdout: String,
        stderr: String,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ClusterError {
    /// Pod missing or not yet scheduled. Expected while StatefulSets scale.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClusterError::NotFound(_) | ClusterError::NoAddress { .. })
    }
}

/// A pod identified by name. Resolved to an address on every use.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceRef {
    pub name: String,
    pub namespace: String,
}

impl InstanceRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Desired shape of one cluster, fixed for the duration of a reconcile pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterTarget {
    pub name: String,
    pub namespace: String,
    pub leaders: u32,
    pub followers: u32,
}

impl ClusterTarget {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        leaders: u32,
        followers: u32,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            leaders,
            followers,
        }
    }

    pub fn from_resource(cluster: &RedisCluster) -> Self {
        Self {
            name: cluster.name_any(),
            namespace: cluster.namespace().unwrap_or_else(|| "default".to_string()),
            leaders: u32::try_from(cluster.spec.effective_leader_count()).unwrap_or(0),
            followers: u32::try_from(cluster.spec.effective_follower_count()).unwrap_or(0),
        }
    }

    pub fn replicas(&self, role: NodeRole) -> u32 {
        match role {
            NodeRole::Leader => self.leaders,
            NodeRole::Follower => self.followers,
        }
    }

    pub fn desired_total(&self) -> usize {
        self.leaders as usize + self.followers as usize
    }

    /// Pod `index` of a role group: `<cluster>-<role>-<index>`.
    pub fn instance(&self, role: NodeRole, index: u32) -> InstanceRef {
        InstanceRef::new(
            format!("{}-{}", role_resource_name(&self.name, role), index),
            self.namespace.clone(),
        )
    }

    /// Leader 0, where cluster commands are run.
    pub fn bootstrap_instance(&self) -> InstanceRef {
        self.instance(NodeRole::Leader, 0)
    }
}

/// The collaborators needed to observe and mutate a cluster.
#[derive(Clone)]
pub struct ClusterToolkit {
    pub resolver: Arc<dyn NodeAddressResolver>,
    pub executor: Arc<dyn RemoteCommandExecutor>,
    pub store: Arc<dyn StoreConnector>,
    /// Binary invoked inside the store container, e.g. `redis-cli`.
    pub cluster_tool: String,
    pub store_port: u16,
}

impl ClusterToolkit {
    /// Toolkit backed by the Kubernetes API and real Redis connections.
    pub fn for_client(client: Client, config: &OperatorConfig) -> Self {
        Self {
            resolver: Arc::new(KubeAddressResolver::new(client.clone())),
            executor: Arc::new(PodExecutor::new(client)),
            store: Arc::new(RedisConnector::new(RedisClientConfig::default())),
            cluster_tool: config.cluster_tool.clone(),
            store_port: CLIENT_PORT,
        }
    }

    pub fn inspector(&self) -> TopologyInspector<'_> {
        TopologyInspector::new(self.resolver.as_ref(), self.store.as_ref(), self.store_port)
    }

    pub fn commander(&self) -> ClusterCommander<'_> {
        ClusterCommander::new(
            self.resolver.as_ref(),
            self.executor.as_ref(),
            self.store.as_ref(),
            &self.cluster_tool,
            self.store_port,
        )
    }
}
