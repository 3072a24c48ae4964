//! Custom Resource Definitions for redis-cluster-operator.
//!
//! - `RedisCluster`: leader/follower Redis cluster formed and healed by the operator
//! - `RedisSingle`: standalone Redis instance with ordered teardown

mod common;
mod redis_cluster;
mod redis_single;

pub use common::*;
pub use redis_cluster::*;
pub use redis_single::*;
