//! Cluster-mutating command sequences.
//!
//! Creation and follower attachment run the cluster tool inside leader 0.
//! Failover talks to every node directly over the store protocol.

use tracing::{debug, info, instrument, warn};

use crate::client::{ClusterTopologySnapshot, StoreConnector};
use crate::crd::NodeRole;

use super::{
    ClusterError, ClusterTarget, ExecOutput, InstanceRef, NodeAddressResolver,
    RemoteCommandExecutor,
};

/// `<tool> --cluster create <addr>... --cluster-yes`
pub fn create_command(tool: &str, endpoints: &[String]) -> Vec<String> {
    let mut argv = vec![tool.to_string(), "--cluster".to_string(), "create".to_string()];
    argv.extend(endpoints.iter().cloned());
    argv.push("--cluster-yes".to_string());
    argv
}

/// `<tool> --cluster add-node <follower> <leader> --cluster-slave`
pub fn add_node_command(tool: &str, follower: &str, leader: &str) -> Vec<String> {
    vec![
        tool.to_string(),
        "--cluster".to_string(),
        "add-node".to_string(),
        follower.to_string(),
        leader.to_string(),
        "--cluster-slave".to_string(),
    ]
}

/// Result of one follower attachment pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttachReport {
    /// Followers for which `add-node` succeeded.
    pub attached: Vec<String>,
    /// Followers already present in the snapshot.
    pub skipped: usize,
    /// Followers whose index has no leader to pair with.
    pub unpaired: usize,
    pub failed: usize,
}

/// Result of one failover pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailoverReport {
    pub reset: usize,
    /// Nodes where reset failed and the flush fallback succeeded.
    pub flushed: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ResetOutcome {
    Reset,
    Flushed,
}

/// Issues cluster-mutating commands against one cluster.
pub struct ClusterCommander<'a> {
    resolver: &'a dyn NodeAddressResolver,
    executor: &'a dyn RemoteCommandExecutor,
    store: &'a dyn StoreConnector,
    tool: &'a str,
    port: u16,
}

impl<'a> ClusterCommander<'a> {
    pub fn new(
        resolver: &'a dyn NodeAddressResolver,
        executor: &'a dyn RemoteCommandExecutor,
        store: &'a dyn StoreConnector,
        tool: &'a str,
        port: u16,
    ) -> Self {
        Self {
            resolver,
            executor,
            store,
            tool,
            port,
        }
    }

    async fn endpoint(&self, instance: &InstanceRef) -> Result<String, ClusterError> {
        Ok(self.resolver.resolve(instance).await?.endpoint(self.port))
    }

    /// Join every leader into a new cluster.
    ///
    /// All leader addresses must resolve; a missing leader aborts the attempt
    /// before anything is executed.
    #[instrument(skip(self, target), fields(cluster = %target.name, leaders = target.leaders))]
    pub async fn bootstrap(&self, target: &ClusterTarget) -> Result<ExecOutput, ClusterError> {
        let mut endpoints = Vec::with_capacity(target.leaders as usize);
        for index in 0..target.leaders {
            endpoints.push(self.endpoint(&target.instance(NodeRole::Leader, index)).await?);
        }

        let argv = create_command(self.tool, &endpoints);
        info!(command = ?argv, "Creating cluster");
        self.executor.exec(&target.bootstrap_instance(), &argv).await
    }

    /// Attach each follower to the leader with the same index.
    ///
    /// Followers whose address already appears in `snapshot` are skipped, so
    /// repeating the pass with the same snapshot issues no new joins.
    #[instrument(skip(self, target, snapshot), fields(cluster = %target.name, followers = target.followers))]
    pub async fn attach_followers(
        &self,
        target: &ClusterTarget,
        snapshot: &ClusterTopologySnapshot,
    ) -> AttachReport {
        let mut report = AttachReport::default();
        let bootstrap = target.bootstrap_instance();

        for index in 0..target.followers {
            let follower = target.instance(NodeRole::Follower, index);
            if index >= target.leaders {
                warn!(pod = %follower.name, "No leader with matching index, skipping follower");
                report.unpaired += 1;
                continue;
            }

            let follower_address = match self.resolver.resolve(&follower).await {
                Ok(address) => address,
                Err(e) => {
                    warn!(pod = %follower.name, error = %e, "Cannot resolve follower");
                    report.failed += 1;
                    continue;
                }
            };

            if snapshot.contains_host(&follower_address.host()) {
                debug!(pod = %follower.name, "Follower already in cluster");
                report.skipped += 1;
                continue;
            }

            let leader = target.instance(NodeRole::Leader, index);
            let leader_endpoint = match self.endpoint(&leader).await {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    warn!(pod = %leader.name, error = %e, "Cannot resolve paired leader");
                    report.failed += 1;
                    continue;
                }
            };

            let argv = add_node_command(
                self.tool,
                &follower_address.endpoint(self.port),
                &leader_endpoint,
            );
            info!(pod = %follower.name, leader = %leader.name, command = ?argv, "Attaching follower");

            match self.executor.exec(&bootstrap, &argv).await {
                Ok(_) => report.attached.push(follower.name),
                Err(e) => {
                    log_exec_failure(&e, "Failed to attach follower");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Reset every leader and follower so they can be rejoined.
    ///
    /// A node whose reset fails is flushed instead. This discards its data.
    #[instrument(skip(self, target), fields(cluster = %target.name))]
    pub async fn failover(&self, target: &ClusterTarget) -> FailoverReport {
        let mut report = FailoverReport::default();

        for role in NodeRole::ALL {
            for index in 0..target.replicas(role) {
                let instance = target.instance(role, index);
                info!(pod = %instance.name, "Resetting cluster state");
                match self.reset_instance(&instance).await {
                    Ok(ResetOutcome::Reset) => report.reset += 1,
                    Ok(ResetOutcome::Flushed) => report.flushed += 1,
                    Err(e) => {
                        warn!(pod = %instance.name, error = %e, "Failover of node failed");
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }

    async fn reset_instance(&self, instance: &InstanceRef) -> Result<ResetOutcome, ClusterError> {
        let address = self.resolver.resolve(instance).await?;
        let session = self.store.connect(&address.host(), self.port).await?;

        let outcome = match session.cluster_reset().await {
            Ok(()) => Ok(ResetOutcome::Reset),
            Err(e) => {
                warn!(pod = %instance.name, error = %e, "Cluster reset failed, flushing node");
                session
                    .flush_all()
                    .await
                    .map(|()| ResetOutcome::Flushed)
                    .map_err(ClusterError::from)
            }
        };

        if let Err(e) = session.close().await {
            debug!(pod = %instance.name, error = %e, "Failed to close store session");
        }
        outcome
    }
}

/// Log an exec failure together with whatever the command printed.
pub fn log_exec_failure(error: &ClusterError, message: &str) {
    match error {
        ClusterError::Exec {
            instance,
            message: cause,
            stdout,
            stderr,
        } => warn!(
            pod = %instance,
            cause = %cause,
            stdout = %stdout,
            stderr = %stderr,
            "{message}"
        ),
        other => warn!(error = %other, "{message}"),
    }
}
