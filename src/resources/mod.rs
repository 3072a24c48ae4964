//! Resource generation module.
//!
//! Generates the Kubernetes objects owned by RedisCluster and RedisSingle.
//!
//! ## Resources Generated
//!
//! | Resource | Name | Purpose |
//! |----------|------|---------|
//! | StatefulSet | `<cluster>-<role>` or `<name>` | Stable pod identity |
//! | Headless Service | `<sts>-headless` | Pod DNS, governs the StatefulSet |
//! | Client Service | `<sts>` | Client access endpoint |

pub mod apply;
pub mod common;
pub mod services;
pub mod statefulset;

pub use apply::{apply, ensure_services, ensure_statefulset};
pub use common::{owner_reference, role_resource_name};
