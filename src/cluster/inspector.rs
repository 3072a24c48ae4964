//! Reads the live cluster membership table.

use tracing::{debug, instrument, warn};

use crate::client::{ClusterTopologySnapshot, StoreConnector};
use crate::crd::NodeRole;

use super::{ClusterError, ClusterTarget, InstanceRef, NodeAddressResolver};

/// Takes `CLUSTER NODES` snapshots from leader pods.
pub struct TopologyInspector<'a> {
    resolver: &'a dyn NodeAddressResolver,
    store: &'a dyn StoreConnector,
    port: u16,
}

impl<'a> TopologyInspector<'a> {
    pub fn new(
        resolver: &'a dyn NodeAddressResolver,
        store: &'a dyn StoreConnector,
        port: u16,
    ) -> Self {
        Self {
            resolver,
            store,
            port,
        }
    }

    /// Snapshot of the cluster as seen by leader 0.
    ///
    /// If leader 0 cannot be inspected, the remaining leaders are tried in
    /// index order. When no leader answers the result is an empty snapshot;
    /// failures are logged and never returned.
    #[instrument(skip(self, target), fields(cluster = %target.name, namespace = %target.namespace))]
    pub async fn snapshot(&self, target: &ClusterTarget) -> ClusterTopologySnapshot {
        for index in 0..target.leaders.max(1) {
            let instance = target.instance(NodeRole::Leader, index);
            match self.inspect(&instance).await {
                Ok(snapshot) => {
                    debug!(
                        pod = %instance.name,
                        nodes = snapshot.total_count(),
                        "Observed cluster topology"
                    );
                    return snapshot;
                }
                Err(e) if e.is_transient() => {
                    debug!(pod = %instance.name, error = %e, "Leader not inspectable yet");
                }
                Err(e) => {
                    warn!(pod = %instance.name, error = %e, "Failed to read cluster nodes");
                }
            }
        }
        ClusterTopologySnapshot::empty()
    }

    /// Snapshot as seen by one pod.
    pub async fn inspect(
        &self,
        instance: &InstanceRef,
    ) -> Result<ClusterTopologySnapshot, ClusterError> {
        let address = self.resolver.resolve(instance).await?;
        let session = self.store.connect(&address.host(), self.port).await?;
        let raw = session.cluster_nodes_raw().await;
        if let Err(e) = session.close().await {
            debug!(pod = %instance.name, error = %e, "Failed to close store session");
        }
        Ok(ClusterTopologySnapshot::parse(&raw?))
    }
}
