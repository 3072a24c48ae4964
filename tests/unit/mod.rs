// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for redis-cluster-operator.
//!
//! These tests run without a Kubernetes cluster and cover CRD defaults,
//! generated manifests and error classification.

#[path = "../common/fixtures.rs"]
mod fixtures;

mod crd_tests {
    use kube::CustomResourceExt;
    use redis_cluster_operator::crd::{
        ClusterPhase, Condition, NodeRole, RedisCluster, RedisClusterSpec, RedisSingle,
    };

    #[test]
    fn test_phase_display_and_default() {
        assert_eq!(ClusterPhase::default(), ClusterPhase::Pending);
        assert_eq!(ClusterPhase::WaitingForReadiness.to_string(), "WaitingForReadiness");
        assert_eq!(ClusterPhase::Converged.to_string(), "Converged");
    }

    #[test]
    fn test_condition_ready() {
        let condition = Condition::ready(true, "Converged", "6 nodes in cluster", Some(1));
        assert_eq!(condition.r#type, "Ready");
        assert_eq!(condition.status, "True");
        assert_eq!(condition.observed_generation, Some(1));
        assert!(condition.is_true());
    }

    #[test]
    fn test_role_counts_fall_back_to_size() {
        let spec: RedisClusterSpec =
            serde_json::from_str(r#"{"size": 4, "kubernetesConfig": {"image": "redis:7.2"}}"#)
                .unwrap();
        assert_eq!(spec.effective_leader_count(), 4);
        assert_eq!(spec.effective_follower_count(), 4);
    }

    #[test]
    fn test_explicit_role_counts_win() {
        let spec: RedisClusterSpec = serde_json::from_str(
            r#"{
                "size": 3,
                "redisLeader": {"replicas": 5},
                "redisFollower": {"replicas": 0},
                "kubernetesConfig": {"image": "redis:7.2"}
            }"#,
        )
        .unwrap();
        assert_eq!(spec.effective_replicas(NodeRole::Leader), 5);
        assert_eq!(spec.effective_replicas(NodeRole::Follower), 0);
    }

    #[test]
    fn test_default_size_is_three() {
        let spec: RedisClusterSpec =
            serde_json::from_str(r#"{"kubernetesConfig": {"image": "redis:7.2"}}"#).unwrap();
        assert_eq!(spec.size, 3);
        assert_eq!(spec.effective_leader_count(), 3);
    }

    #[test]
    fn test_crds_are_namespaced_in_api_group() {
        let cluster = RedisCluster::crd();
        assert_eq!(cluster.spec.group, "redis.kubeops.dev");
        assert_eq!(cluster.spec.scope, "Namespaced");
        assert_eq!(cluster.spec.names.kind, "RedisCluster");

        let single = RedisSingle::crd();
        assert_eq!(single.spec.group, "redis.kubeops.dev");
        assert_eq!(single.spec.names.kind, "RedisSingle");
    }
}

mod manifest_tests {
    use super::fixtures::{RedisClusterBuilder, RedisSingleBuilder};
    use redis_cluster_operator::crd::NodeRole;
    use redis_cluster_operator::resources::services::{cluster_services, single_services};
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use redis_cluster_operator::resources::statefulset::{
        CLIENT_PORT, cluster_statefulset, single_statefulset,
    };

    #[test]
    fn test_role_statefulsets_use_their_own_config() {
        let cluster = RedisClusterBuilder::new("cache")
            .leader_config("leader-conf")
            .follower_config("follower-conf")
            .build();

        for (role, expected) in [
            (NodeRole::Leader, "leader-conf"),
            (NodeRole::Follower, "follower-conf"),
        ] {
            let sts = cluster_statefulset(&cluster, role);
            let volumes = sts.spec.unwrap().template.spec.unwrap().volumes.unwrap();
            let config_maps: Vec<_> = volumes
                .iter()
                .filter_map(|v| v.config_map.as_ref().map(|c| c.name.clone()))
                .collect();
            assert_eq!(config_maps, vec![expected.to_string()]);
        }
    }

    #[test]
    fn test_statefulset_labels_merge_owner_labels() {
        let cluster = RedisClusterBuilder::new("cache").label("team", "payments").build();
        let sts = cluster_statefulset(&cluster, NodeRole::Follower);
        let labels = sts.metadata.labels.unwrap();
        assert_eq!(labels["app"], "cache-follower");
        assert_eq!(labels["redis_setup_type"], "cluster");
        assert_eq!(labels["role"], "follower");
        assert_eq!(labels["team"], "payments");

        // Owner labels never leak into the selector.
        let selector = sts.spec.unwrap().selector.match_labels.unwrap();
        assert!(!selector.contains_key("team"));
    }

    #[test]
    fn test_owner_labels_keep_template_matching_selector() {
        let cluster = RedisClusterBuilder::new("cache")
            .label("app", "web")
            .label("role", "cache")
            .label("redis_setup_type", "other")
            .build();
        let single = RedisSingleBuilder::new("sessions")
            .label("app", "web")
            .build();

        for sts in [
            cluster_statefulset(&cluster, NodeRole::Leader),
            cluster_statefulset(&cluster, NodeRole::Follower),
            single_statefulset(&single),
        ] {
            let spec = sts.spec.unwrap();
            let selector = spec.selector.match_labels.unwrap();
            let template = spec.template.metadata.unwrap().labels.unwrap();
            for (key, value) in &selector {
                assert_eq!(template.get(key), Some(value), "template label {key}");
            }
        }
    }

    #[test]
    fn test_pods_listen_on_operator_port() {
        let cluster = RedisClusterBuilder::new("cache").build();
        let port = i32::from(CLIENT_PORT);

        let sts = cluster_statefulset(&cluster, NodeRole::Leader);
        let container = &sts.spec.unwrap().template.spec.unwrap().containers[0];
        let args = container.args.clone().unwrap();
        let flag = args.iter().position(|a| a == "--port").unwrap();
        assert_eq!(args[flag + 1], CLIENT_PORT.to_string());
        assert_eq!(container.ports.as_ref().unwrap()[0].container_port, port);

        for service in cluster_services(&cluster, NodeRole::Leader) {
            let service_port = &service.spec.unwrap().ports.unwrap()[0];
            assert_eq!(
                service_port.target_port,
                Some(IntOrString::Int(port))
            );
        }
    }

    #[test]
    fn test_statefulset_owner_reference() {
        let cluster = RedisClusterBuilder::new("cache").namespace("prod").build();
        let sts = cluster_statefulset(&cluster, NodeRole::Leader);
        let owner = &sts.metadata.owner_references.unwrap()[0];
        assert_eq!(owner.kind, "RedisCluster");
        assert_eq!(owner.name, "cache");
        assert_eq!(owner.uid, "cache-uid");
        assert_eq!(sts.metadata.namespace.as_deref(), Some("prod"));
    }

    #[test]
    fn test_node_selector_applied() {
        let cluster = RedisClusterBuilder::new("cache")
            .node_selector("disktype", "ssd")
            .build();
        let sts = cluster_statefulset(&cluster, NodeRole::Leader);
        let selector = sts.spec.unwrap().template.spec.unwrap().node_selector.unwrap();
        assert_eq!(selector["disktype"], "ssd");
    }

    #[test]
    fn test_single_pvc_name_matches_teardown() {
        let single = RedisSingleBuilder::new("sessions").storage("2Gi").build();
        let sts = single_statefulset(&single);
        let claim = &sts.spec.unwrap().volume_claim_templates.unwrap()[0];
        // Pod sessions-0 gets claim <template>-<pod> = sessions-sessions-0.
        assert_eq!(claim.metadata.name.as_deref(), Some("sessions"));
    }

    #[test]
    fn test_service_names() {
        let cluster = RedisClusterBuilder::new("cache").build();
        let names: Vec<_> = cluster_services(&cluster, NodeRole::Leader)
            .iter()
            .map(|s| s.metadata.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["cache-leader-headless", "cache-leader"]);

        let single = RedisSingleBuilder::new("sessions").build();
        let names: Vec<_> = single_services(&single)
            .iter()
            .map(|s| s.metadata.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["sessions-headless", "sessions"]);
    }
}

mod error_tests {
    use redis_cluster_operator::cluster::{ClusterError, InstanceRef};
    use redis_cluster_operator::controller::error::Error;
    use std::time::Duration;

    #[test]
    fn test_kube_not_found() {
        let err = Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        }));
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_server_error_requeue() {
        let err = Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "etcdserver: request timed out".to_string(),
            reason: "InternalError".to_string(),
            code: 500,
        }));
        assert!(err.is_retryable());
        assert_eq!(err.requeue_after(), Duration::from_secs(30));
    }

    #[test]
    fn test_validation_waits_for_spec_change() {
        let err = Error::Validation("spec.size must not be negative".to_string());
        assert!(!err.is_retryable());
        assert_eq!(err.requeue_after(), Duration::from_secs(300));
    }

    #[test]
    fn test_missing_pod_is_transient() {
        let err = ClusterError::NotFound(InstanceRef::new("cache-leader-0", "prod"));
        assert!(err.is_transient());
        let err = ClusterError::NoAddress {
            instance: InstanceRef::new("cache-leader-0", "prod"),
            reason: "pod has no IP".to_string(),
        };
        assert!(err.is_transient());
    }
}

mod config_tests {
    use redis_cluster_operator::OperatorConfig;

    #[test]
    fn test_default_config() {
        let config = OperatorConfig::default();
        assert_eq!(config.cluster_tool, "redis-cli");
        assert_eq!(config.health_port, 8080);
        assert!(config.watch_namespace.is_none());
    }
}
