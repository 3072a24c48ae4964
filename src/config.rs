//! Operator configuration from environment variables.

use tracing::warn;

/// Default port for `/healthz`, `/readyz` and `/metrics`.
pub const DEFAULT_HEALTH_PORT: u16 = 8080;
/// Default cluster tool binary inside the store image.
pub const DEFAULT_CLUSTER_TOOL: &str = "redis-cli";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Restrict both controllers to one namespace. `None` watches cluster-wide.
    pub watch_namespace: Option<String>,
    /// Leader election identity.
    pub pod_name: String,
    /// Namespace holding the leader election Lease.
    pub pod_namespace: String,
    pub health_port: u16,
    pub cluster_tool: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            pod_name: "unknown".to_string(),
            pod_namespace: "default".to_string(),
            health_port: DEFAULT_HEALTH_PORT,
            cluster_tool: DEFAULT_CLUSTER_TOOL.to_string(),
        }
    }
}

impl OperatorConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let pod_name = get("POD_NAME").unwrap_or_else(|| {
            warn!("POD_NAME not set, using hostname");
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        });
        let pod_namespace = get("POD_NAMESPACE").unwrap_or_else(|| {
            warn!("POD_NAMESPACE not set, using 'default'");
            "default".to_string()
        });

        Self {
            watch_namespace: get("WATCH_NAMESPACE"),
            pod_name,
            pod_namespace,
            health_port: parse_port(get("HEALTH_PORT"), "HEALTH_PORT", DEFAULT_HEALTH_PORT),
            cluster_tool: get("CLUSTER_TOOL").unwrap_or_else(|| DEFAULT_CLUSTER_TOOL.to_string()),
        }
    }
}

fn parse_port(value: Option<String>, key: &str, default: u16) -> u16 {
    match value {
        None => default,
        Some(raw) => match raw.trim().parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => {
                warn!(variable = key, value = %raw, default, "Invalid port, using default");
                default
            }
        },
    }
}
