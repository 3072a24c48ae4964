//! In-memory stand-ins for the cluster collaborators.
//!
//! Every fake records what it was asked to do so tests can assert on the
//! exact commands a pass issued.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use redis_cluster_operator::client::{StoreConnector, StoreError, StoreSession};
use redis_cluster_operator::cluster::{
    ClusterError, ClusterTarget, ClusterToolkit, ExecOutput, InstanceRef, NodeAddress,
    NodeAddressResolver, RemoteCommandExecutor,
};
use redis_cluster_operator::crd::NodeRole;
use redis_cluster_operator::resources::statefulset::CLIENT_PORT;

/// Resolves pod names from a fixed table. Unknown pods are `NotFound`.
#[derive(Default)]
pub struct FakeResolver {
    addresses: HashMap<String, NodeAddress>,
}

impl FakeResolver {
    pub fn insert(&mut self, pod: &str, ip: &str) {
        self.addresses.insert(pod.to_string(), ip.parse().unwrap());
    }

    /// Leader `i` at `10.0.0.<i+1>`, follower `i` at `10.0.1.<i+1>`.
    pub fn for_target(target: &ClusterTarget) -> Self {
        let mut resolver = Self::default();
        for index in 0..target.leaders {
            resolver.insert(
                &target.instance(NodeRole::Leader, index).name,
                &leader_ip(index),
            );
        }
        for index in 0..target.followers {
            resolver.insert(
                &target.instance(NodeRole::Follower, index).name,
                &follower_ip(index),
            );
        }
        resolver
    }

    pub fn remove(&mut self, pod: &str) {
        self.addresses.remove(pod);
    }
}

#[async_trait]
impl NodeAddressResolver for FakeResolver {
    async fn resolve(&self, instance: &InstanceRef) -> Result<NodeAddress, ClusterError> {
        self.addresses
            .get(&instance.name)
            .copied()
            .ok_or_else(|| ClusterError::NotFound(instance.clone()))
    }
}

pub fn leader_ip(index: u32) -> String {
    format!("10.0.0.{}", index + 1)
}

pub fn follower_ip(index: u32) -> String {
    format!("10.0.1.{}", index + 1)
}

/// Records every command; optionally fails all of them.
#[derive(Default)]
pub struct FakeExecutor {
    calls: Mutex<Vec<(InstanceRef, Vec<String>)>>,
    fail: bool,
}

impl FakeExecutor {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<(InstanceRef, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn argvs(&self) -> Vec<Vec<String>> {
        self.calls().into_iter().map(|(_, argv)| argv).collect()
    }
}

#[async_trait]
impl RemoteCommandExecutor for FakeExecutor {
    async fn exec(
        &self,
        instance: &InstanceRef,
        argv: &[String],
    ) -> Result<ExecOutput, ClusterError> {
        self.calls
            .lock()
            .unwrap()
            .push((instance.clone(), argv.to_vec()));
        if self.fail {
            return Err(ClusterError::Exec {
                instance: instance.clone(),
                message: "command terminated with exit code 1".to_string(),
                stdout: String::new(),
                stderr: "[ERR] Node is not empty".to_string(),
            });
        }
        Ok(ExecOutput {
            stdout: "[OK] All nodes agree about slots configuration.".to_string(),
            stderr: String::new(),
        })
    }
}

/// Store operations seen by [`FakeStore`], keyed by host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreCall {
    Connect(String),
    ClusterNodes(String),
    Reset(String),
    Flush(String),
    Close(String),
}

#[derive(Default)]
struct StoreBehaviour {
    tables: HashMap<String, String>,
    unreachable: HashSet<String>,
    reset_fails: HashSet<String>,
    flush_fails: HashSet<String>,
}

/// Serves canned `CLUSTER NODES` tables and records resets and flushes.
#[derive(Default)]
pub struct FakeStore {
    behaviour: StoreBehaviour,
    log: Arc<Mutex<Vec<StoreCall>>>,
}

impl FakeStore {
    pub fn table(mut self, host: &str, raw: &str) -> Self {
        self.behaviour
            .tables
            .insert(host.to_string(), raw.to_string());
        self
    }

    pub fn unreachable(mut self, host: &str) -> Self {
        self.behaviour.unreachable.insert(host.to_string());
        self
    }

    pub fn reset_fails(mut self, host: &str) -> Self {
        self.behaviour.reset_fails.insert(host.to_string());
        self
    }

    pub fn flush_fails(mut self, host: &str) -> Self {
        self.behaviour.flush_fails.insert(host.to_string());
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.log.lock().unwrap().clone()
    }

    pub fn resets(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Reset(host) => Some(host),
                _ => None,
            })
            .collect()
    }

    pub fn flushes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Flush(host) => Some(host),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl StoreConnector for FakeStore {
    async fn connect(&self, host: &str, _port: u16) -> Result<Box<dyn StoreSession>, StoreError> {
        self.log
            .lock()
            .unwrap()
            .push(StoreCall::Connect(host.to_string()));
        if self.behaviour.unreachable.contains(host) {
            return Err(StoreError::InvalidConfig(format!("{host} unreachable")));
        }
        Ok(Box::new(FakeSession {
            host: host.to_string(),
            table: self.behaviour.tables.get(host).cloned(),
            reset_fails: self.behaviour.reset_fails.contains(host),
            flush_fails: self.behaviour.flush_fails.contains(host),
            log: self.log.clone(),
        }))
    }
}

struct FakeSession {
    host: String,
    table: Option<String>,
    reset_fails: bool,
    flush_fails: bool,
    log: Arc<Mutex<Vec<StoreCall>>>,
}

impl FakeSession {
    fn record(&self, call: StoreCall) {
        self.log.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StoreSession for FakeSession {
    async fn cluster_nodes_raw(&self) -> Result<String, StoreError> {
        self.record(StoreCall::ClusterNodes(self.host.clone()));
        self.table
            .clone()
            .ok_or_else(|| StoreError::InvalidConfig("cluster support disabled".to_string()))
    }

    async fn cluster_reset(&self) -> Result<(), StoreError> {
        self.record(StoreCall::Reset(self.host.clone()));
        if self.reset_fails {
            return Err(StoreError::InvalidConfig("reset refused".to_string()));
        }
        Ok(())
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        self.record(StoreCall::Flush(self.host.clone()));
        if self.flush_fails {
            return Err(StoreError::InvalidConfig("flush refused".to_string()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.record(StoreCall::Close(self.host.clone()));
        Ok(())
    }
}

/// A toolkit over the given fakes, keeping handles for assertions.
pub struct Harness {
    pub toolkit: ClusterToolkit,
    pub executor: Arc<FakeExecutor>,
    pub store: Arc<FakeStore>,
}

impl Harness {
    pub fn new(resolver: FakeResolver, executor: FakeExecutor, store: FakeStore) -> Self {
        let executor = Arc::new(executor);
        let store = Arc::new(store);
        let toolkit = ClusterToolkit {
            resolver: Arc::new(resolver),
            executor: executor.clone(),
            store: store.clone(),
            cluster_tool: "redis-cli".to_string(),
            store_port: CLIENT_PORT,
        };
        Self {
            toolkit,
            executor,
            store,
        }
    }
}

/// One `CLUSTER NODES` row.
pub fn row(id: &str, ip: &str, flags: &str, link: &str) -> String {
    format!("{id} {ip}:6379@16379 {flags} - 0 1700000000000 1 {link}")
}

/// Rows for `leaders` healthy leaders at the default leader addresses.
pub fn leader_rows(leaders: u32) -> Vec<String> {
    (0..leaders)
        .map(|i| {
            let flags = if i == 0 { "myself,master" } else { "master" };
            row(&format!("leader{i}"), &leader_ip(i), flags, "connected")
        })
        .collect()
}

/// Rows for healthy followers at the default follower addresses.
pub fn follower_rows(indices: &[u32]) -> Vec<String> {
    indices
        .iter()
        .map(|&i| row(&format!("follower{i}"), &follower_ip(i), "slave", "connected"))
        .collect()
}
