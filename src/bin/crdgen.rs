//! Print the CustomResourceDefinitions as a multi-document YAML stream.

use kube::CustomResourceExt;
use redis_cluster_operator::crd::{RedisCluster, RedisSingle};

fn main() -> Result<(), serde_yaml::Error> {
    let documents = [
        serde_yaml::to_string(&RedisCluster::crd())?,
        serde_yaml::to_string(&RedisSingle::crd())?,
    ];
    print!("{}", documents.join("---\n"));
    Ok(())
}
