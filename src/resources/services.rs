//! Service generation for Redis pods.
//!
//! Every StatefulSet gets two services:
//! - **Headless Service** `<name>-headless`: stable pod DNS, governs the StatefulSet
//! - **Client Service** `<name>`: ClusterIP endpoint for clients

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use crate::crd::{NodeRole, RedisCluster, RedisSingle};
use crate::resources::common::{
    SETUP_TYPE_CLUSTER, SETUP_TYPE_STANDALONE, headless_service_name, owned_meta,
    redis_annotations, redis_labels, role_resource_name, selector_labels,
};
use crate::resources::statefulset::CLIENT_PORT;

/// Which of the two services to generate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceKind {
    Headless,
    Client,
}

/// Both services of one cluster role group.
pub fn cluster_services(cluster: &RedisCluster, role: NodeRole) -> [Service; 2] {
    let name = role_resource_name(&cluster.name_any(), role);
    [ServiceKind::Headless, ServiceKind::Client]
        .map(|kind| generate_service(cluster, &name, SETUP_TYPE_CLUSTER, role.as_str(), kind))
}

/// Both services of a standalone instance.
pub fn single_services(single: &RedisSingle) -> [Service; 2] {
    let name = single.name_any();
    [ServiceKind::Headless, ServiceKind::Client].map(|kind| {
        generate_service(single, &name, SETUP_TYPE_STANDALONE, SETUP_TYPE_STANDALONE, kind)
    })
}

/// Generate one service selecting the pods of StatefulSet `app`.
pub fn generate_service<K>(
    owner: &K,
    app: &str,
    setup_type: &str,
    role: &str,
    kind: ServiceKind,
) -> Service
where
    K: Resource<DynamicType = ()>,
{
    let name = match kind {
        ServiceKind::Headless => headless_service_name(app),
        ServiceKind::Client => app.to_string(),
    };
    let labels = redis_labels(app, setup_type, role, owner.labels());
    let annotations = redis_annotations(app, owner.annotations());

    let spec = match kind {
        // Pods must resolve before they are ready so the cluster can form.
        ServiceKind::Headless => ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            ..Default::default()
        },
        ServiceKind::Client => ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        },
    };

    Service {
        metadata: owned_meta(owner, &name, labels, annotations),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(app, setup_type, role)),
            ports: Some(vec![ServicePort {
                port: i32::from(CLIENT_PORT),
                target_port: Some(IntOrString::Int(i32::from(CLIENT_PORT))),
                name: Some("redis-client".to_string()),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..spec
        }),
        ..Default::default()
    }
}
