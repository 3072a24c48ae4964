//! StatefulSet generation for Redis pods.
//!
//! One StatefulSet per cluster role group (`<cluster>-leader`,
//! `<cluster>-follower`) and one per standalone instance (`<name>`):
//! - Container named after the StatefulSet, so exec can find it
//! - Optional PVC template named after the StatefulSet
//! - Optional user ConfigMap included through `--include`

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, ExecAction,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{Resource, ResourceExt};

use crate::crd::{KubernetesConfig, NodeRole, RedisCluster, RedisSingle, StorageSpec};
use crate::resources::common::{
    SETUP_TYPE_CLUSTER, SETUP_TYPE_STANDALONE, headless_service_name, owned_meta,
    redis_annotations, redis_labels, role_resource_name, selector_labels,
};

/// Redis client port. The operator connects to pods on this port too.
pub const CLIENT_PORT: u16 = 6379;
/// Redis cluster bus port (client port + 10000)
pub const CLUSTER_BUS_PORT: u16 = 16379;

const DATA_PATH: &str = "/data";
const EXTERNAL_CONFIG_VOLUME: &str = "external-config";
const EXTERNAL_CONFIG_PATH: &str = "/etc/redis/external.conf.d";
const EXTERNAL_CONFIG_FILE: &str = "redis-additional.conf";

/// Inputs for one Redis StatefulSet.
#[derive(Clone, Debug)]
pub struct StatefulSetParams<'a> {
    pub name: String,
    pub setup_type: &'static str,
    pub role: &'a str,
    pub replicas: i32,
    pub kubernetes_config: &'a KubernetesConfig,
    pub storage: Option<&'a StorageSpec>,
    pub external_config: Option<&'a str>,
    pub node_selector: &'a BTreeMap<String, String>,
    pub cluster_enabled: bool,
}

/// StatefulSet for one role group of a RedisCluster.
pub fn cluster_statefulset(cluster: &RedisCluster, role: NodeRole) -> StatefulSet {
    let params = StatefulSetParams {
        name: role_resource_name(&cluster.name_any(), role),
        setup_type: SETUP_TYPE_CLUSTER,
        role: role.as_str(),
        replicas: cluster.spec.effective_replicas(role),
        kubernetes_config: &cluster.spec.kubernetes_config,
        storage: cluster.spec.storage.as_ref(),
        external_config: cluster.spec.external_config(role),
        node_selector: &cluster.spec.node_selector,
        cluster_enabled: true,
    };
    generate_statefulset(cluster, &params)
}

/// Single-replica StatefulSet for a RedisSingle.
pub fn single_statefulset(single: &RedisSingle) -> StatefulSet {
    let params = StatefulSetParams {
        name: single.name_any(),
        setup_type: SETUP_TYPE_STANDALONE,
        role: SETUP_TYPE_STANDALONE,
        replicas: 1,
        kubernetes_config: &single.spec.kubernetes_config,
        storage: single.spec.storage.as_ref(),
        external_config: single.spec.external_config(),
        node_selector: &single.spec.node_selector,
        cluster_enabled: false,
    };
    generate_statefulset(single, &params)
}

/// Generate a StatefulSet owned by `owner`.
pub fn generate_statefulset<K>(owner: &K, params: &StatefulSetParams<'_>) -> StatefulSet
where
    K: Resource<DynamicType = ()>,
{
    let labels = redis_labels(&params.name, params.setup_type, params.role, owner.labels());
    let annotations = redis_annotations(&params.name, owner.annotations());

    StatefulSet {
        metadata: owned_meta(owner, &params.name, labels.clone(), annotations.clone()),
        spec: Some(StatefulSetSpec {
            replicas: Some(params.replicas),
            service_name: Some(headless_service_name(&params.name)),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&params.name, params.setup_type, params.role)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    annotations: Some(annotations.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![generate_container(params)],
                    volumes: Some(generate_volumes(params)),
                    node_selector: if params.node_selector.is_empty() {
                        None
                    } else {
                        Some(params.node_selector.clone())
                    },
                    ..Default::default()
                }),
            },
            volume_claim_templates: params
                .storage
                .map(|storage| vec![generate_pvc_template(params, storage, labels, annotations)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn generate_container(params: &StatefulSetParams<'_>) -> Container {
    let mut ports = vec![ContainerPort {
        container_port: i32::from(CLIENT_PORT),
        name: Some("redis-client".to_string()),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }];
    if params.cluster_enabled {
        ports.push(ContainerPort {
            container_port: i32::from(CLUSTER_BUS_PORT),
            name: Some("redis-bus".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        });
    }

    let mut mounts = vec![VolumeMount {
        name: params.name.clone(),
        mount_path: DATA_PATH.to_string(),
        ..Default::default()
    }];
    if params.external_config.is_some() {
        mounts.push(VolumeMount {
            name: EXTERNAL_CONFIG_VOLUME.to_string(),
            mount_path: EXTERNAL_CONFIG_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    Container {
        name: params.name.clone(),
        image: Some(params.kubernetes_config.image.clone()),
        image_pull_policy: params.kubernetes_config.image_pull_policy.clone(),
        command: Some(vec!["redis-server".to_string()]),
        args: Some(server_args(params.cluster_enabled, params.external_config.is_some())),
        ports: Some(ports),
        resources: generate_resource_requirements(params.kubernetes_config),
        volume_mounts: Some(mounts),
        readiness_probe: Some(ping_probe(5)),
        liveness_probe: Some(ping_probe(15)),
        ..Default::default()
    }
}

/// Arguments passed to `redis-server`.
pub fn server_args(cluster_enabled: bool, include_external: bool) -> Vec<String> {
    let mut args = vec![
        "--port".to_string(),
        CLIENT_PORT.to_string(),
        "--dir".to_string(),
        DATA_PATH.to_string(),
    ];
    if cluster_enabled {
        args.extend([
            "--cluster-enabled".to_string(),
            "yes".to_string(),
            "--cluster-config-file".to_string(),
            format!("{DATA_PATH}/nodes.conf"),
        ]);
    }
    if include_external {
        args.extend([
            "--include".to_string(),
            format!("{EXTERNAL_CONFIG_PATH}/{EXTERNAL_CONFIG_FILE}"),
        ]);
    }
    args
}

fn ping_probe(initial_delay: i32) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec!["redis-cli".to_string(), "ping".to_string()]),
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

fn generate_resource_requirements(config: &KubernetesConfig) -> Option<ResourceRequirements> {
    let resources = config.resources.as_ref()?;
    let to_quantities = |list: &crate::crd::ResourceList| {
        list.to_map()
            .into_iter()
            .map(|(k, v)| (k, Quantity(v)))
            .collect::<BTreeMap<_, _>>()
    };
    Some(ResourceRequirements {
        requests: resources.requests.as_ref().map(to_quantities),
        limits: resources.limits.as_ref().map(to_quantities),
        ..Default::default()
    })
}

fn generate_volumes(params: &StatefulSetParams<'_>) -> Vec<Volume> {
    let mut volumes = Vec::new();

    // With storage the data volume comes from the claim template instead.
    if params.storage.is_none() {
        volumes.push(Volume {
            name: params.name.clone(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }

    if let Some(config_map) = params.external_config {
        volumes.push(Volume {
            name: EXTERNAL_CONFIG_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    volumes
}

fn generate_pvc_template(
    params: &StatefulSetParams<'_>,
    storage: &StorageSpec,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
) -> PersistentVolumeClaim {
    let template = &storage.volume_claim_template;
    let access_modes = if template.access_modes.is_empty() {
        vec!["ReadWriteOnce".to_string()]
    } else {
        template.access_modes.clone()
    };

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(params.name.clone()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(access_modes),
            storage_class_name: template.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(template.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
