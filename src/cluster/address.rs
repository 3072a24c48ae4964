//! Pod address resolution.

use std::net::IpAddr;
use std::str::FromStr;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tracing::{debug, instrument};

use super::{ClusterError, InstanceRef};

/// IP address of a store pod.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeAddress(IpAddr);

impl NodeAddress {
    pub fn new(ip: IpAddr) -> Self {
        Self(ip.to_canonical())
    }

    pub fn ip(&self) -> IpAddr {
        self.0
    }

    /// Bare address, as it appears inside `CLUSTER NODES` rows.
    pub fn host(&self) -> String {
        self.0.to_string()
    }

    /// `host:port`, bracketing IPv6 hosts.
    pub fn endpoint(&self, port: u16) -> String {
        match self.0 {
            IpAddr::V4(ip) => format!("{ip}:{port}"),
            IpAddr::V6(ip) => format!("[{ip}]:{port}"),
        }
    }
}

impl FromStr for NodeAddress {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<IpAddr>().map(Self::new)
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Looks up the current address of a pod.
///
/// Addresses change when pods restart, so callers resolve on every use.
#[async_trait]
pub trait NodeAddressResolver: Send + Sync {
    /// Fails with [`ClusterError::NotFound`] when the pod does not exist and
    /// [`ClusterError::NoAddress`] when it has not been assigned an IP yet.
    async fn resolve(&self, instance: &InstanceRef) -> Result<NodeAddress, ClusterError>;
}

/// Resolves addresses from `status.podIP`.
#[derive(Clone)]
pub struct KubeAddressResolver {
    client: Client,
}

impl KubeAddressResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeAddressResolver for KubeAddressResolver {
    #[instrument(skip(self), fields(pod = %instance))]
    async fn resolve(&self, instance: &InstanceRef) -> Result<NodeAddress, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &instance.namespace);
        let pod = pods
            .get_opt(&instance.name)
            .await?
            .ok_or_else(|| ClusterError::NotFound(instance.clone()))?;

        let address = pod_address(&pod).map_err(|reason| ClusterError::NoAddress {
            instance: instance.clone(),
            reason,
        })?;
        debug!(address = %address, "Resolved pod address");
        Ok(address)
    }
}

/// Extract the pod IP from a Pod object.
pub fn pod_address(pod: &Pod) -> Result<NodeAddress, String> {
    let ip = pod
        .status
        .as_ref()
        .and_then(|s| s.pod_ip.as_deref())
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| "pod has no IP assigned".to_string())?;
    ip.parse()
        .map_err(|e| format!("invalid pod IP {ip:?}: {e}"))
}
