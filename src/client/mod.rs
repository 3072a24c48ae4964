//! Redis client module.
//!
//! - `redis_client`: single-node sessions over the `fred` client, behind the
//!   [`StoreConnector`] / [`StoreSession`] seam so the inspector and failover
//!   path can run against fakes
//! - `types`: the parsed `CLUSTER NODES` table and queries over it

pub mod redis_client;
pub mod types;

pub use redis_client::{
    RedisClient, RedisClientConfig, RedisConnector, StoreConnector, StoreError, StoreSession,
};
pub use types::{ClusterTopologySnapshot, ParseError, TopologyRecord};
