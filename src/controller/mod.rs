//! Controller module for redis-cluster-operator.
//!
//! Two controllers share the context, error and status helpers:
//! - RedisCluster: `cluster_reconciler` drives the `topology` pass
//! - RedisSingle: `single_reconciler` with finalizer-guarded teardown

pub mod common;
pub mod context;
pub mod error;
pub mod status;

pub mod cluster_reconciler;
pub mod topology;

pub mod single_reconciler;
