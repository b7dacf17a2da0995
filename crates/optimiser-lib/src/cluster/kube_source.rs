//! Snapshot assembly from the Kubernetes API and Prometheus

use super::prometheus::{by_instance, by_pod, scalar, PromClient, PromQueries, PromSample};
use super::quantity::{parse_bytes, parse_cpu_cores};
use super::ClusterStateSource;
use crate::models::{
    finite_or_zero, ClusterWide, NodeFacts, PodFacts, QosClass, Snapshot,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams};
use kube::Client;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Series returned by the configured queries
#[derive(Debug, Default)]
pub(crate) struct MetricSet {
    pub node_power: Vec<PromSample>,
    pub node_cpu_util: Vec<PromSample>,
    pub node_mem_util: Vec<PromSample>,
    pub pod_cpu: Vec<PromSample>,
    pub system_cpu: Vec<PromSample>,
}

/// Live cluster state from the API server plus Prometheus
pub struct KubeStateSource {
    client: Client,
    prom: PromClient,
    queries: PromQueries,
}

impl KubeStateSource {
    pub fn new(client: Client, prom: PromClient, queries: PromQueries) -> Self {
        Self {
            client,
            prom,
            queries,
        }
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .context("Failed to list nodes")?;
        Ok(list.items)
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .context("Failed to list pods")?;
        Ok(list.items)
    }
}

#[async_trait]
impl ClusterStateSource for KubeStateSource {
    async fn snapshot(&self) -> Result<Snapshot> {
        let (
            nodes,
            pods,
            node_power,
            node_cpu_util,
            node_mem_util,
            pod_cpu,
            system_cpu,
        ) = tokio::try_join!(
            self.list_nodes(),
            self.list_pods(),
            self.prom.query(&self.queries.node_power),
            self.prom.query(&self.queries.node_cpu_util),
            self.prom.query(&self.queries.node_mem_util),
            self.prom.query(&self.queries.pod_cpu),
            self.prom.query(&self.queries.system_cpu),
        )?;

        let metrics = MetricSet {
            node_power,
            node_cpu_util,
            node_mem_util,
            pod_cpu,
            system_cpu,
        };
        let snapshot = assemble(&nodes, &pods, &metrics);
        debug!(
            nodes = snapshot.nodes.len(),
            pods = snapshot.pods.len(),
            power_watts = snapshot.power(),
            "Captured cluster snapshot"
        );
        Ok(snapshot)
    }
}

/// Join API objects with metric series; missing values default to zero
pub(crate) fn assemble(nodes: &[Node], pods: &[Pod], metrics: &MetricSet) -> Snapshot {
    let power = by_instance(&metrics.node_power);
    let cpu_util = by_instance(&metrics.node_cpu_util);
    let mem_util = by_instance(&metrics.node_mem_util);
    let pod_cpu = by_pod(&metrics.pod_cpu);
    let lookup = |map: &HashMap<String, f64>, key: &str| {
        finite_or_zero(map.get(key).copied().unwrap_or(0.0))
    };

    let mut node_facts = BTreeMap::new();
    for node in nodes {
        let Some(name) = node.metadata.name.clone() else {
            continue;
        };
        node_facts.insert(
            name.clone(),
            NodeFacts {
                alloc_cpu_cores: allocatable(node, "cpu").and_then(parse_cpu_cores).unwrap_or(0.0),
                alloc_memory_bytes: allocatable(node, "memory").and_then(parse_bytes).unwrap_or(0),
                cpu_util: lookup(&cpu_util, &name),
                mem_util: lookup(&mem_util, &name),
                cpu_power_watts: lookup(&power, &name),
            },
        );
    }

    let mut pod_facts = BTreeMap::new();
    for pod in pods {
        let (Some(name), Some(namespace)) = (
            pod.metadata.name.clone(),
            pod.metadata.namespace.clone(),
        ) else {
            continue;
        };
        let key = pod
            .metadata
            .uid
            .clone()
            .unwrap_or_else(|| format!("{}/{}", namespace, name));
        let cores = lookup(&pod_cpu, &format!("{}/{}", namespace, name));

        pod_facts.insert(
            key,
            PodFacts {
                node: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
                cpu_millicores: cores * 1000.0,
                qos: QosClass::parse(pod.status.as_ref().and_then(|s| s.qos_class.as_deref())),
                name,
                namespace,
            },
        );
    }

    Snapshot {
        timestamp: Utc::now(),
        nodes: node_facts,
        pods: pod_facts,
        cluster_wide: ClusterWide {
            kube_system_cpu_overhead: scalar(&metrics.system_cpu),
        },
    }
}

fn allocatable<'a>(node: &'a Node, resource: &str) -> Option<&'a str> {
    node.status
        .as_ref()?
        .allocatable
        .as_ref()?
        .get(resource)
        .map(|q| q.0.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeStatus, PodSpec, PodStatus};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn node(name: &str, cpu: &str, memory: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                allocatable: Some(
                    [
                        ("cpu".to_string(), Quantity(cpu.to_string())),
                        ("memory".to_string(), Quantity(memory.to_string())),
                    ]
                    .into_iter()
                    .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn pod(uid: &str, name: &str, namespace: &str, node: Option<&str>, qos: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: node.map(str::to_string),
                ..Default::default()
            }),
            status: Some(PodStatus {
                qos_class: Some(qos.to_string()),
                ..Default::default()
            }),
        }
    }

    fn sample(labels: &[(&str, &str)], value: f64) -> PromSample {
        PromSample {
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value,
        }
    }

    #[test]
    fn test_assemble_joins_metrics() {
        let nodes = vec![node("n1", "3900m", "16Gi"), node("n2", "4", "1024Ki")];
        let pods = vec![
            pod("u1", "web-0", "default", Some("n1"), "Burstable"),
            pod("u2", "pending", "default", None, "BestEffort"),
        ];
        let metrics = MetricSet {
            node_power: vec![sample(&[("instance", "n1:9102")], 55.0)],
            node_cpu_util: vec![sample(&[("instance", "n1")], 0.4)],
            node_mem_util: vec![sample(&[("instance", "n2")], f64::NAN)],
            pod_cpu: vec![sample(&[("namespace", "default"), ("pod", "web-0")], 0.25)],
            system_cpu: vec![sample(&[], 0.3)],
        };

        let snapshot = assemble(&nodes, &pods, &metrics);

        let n1 = &snapshot.nodes["n1"];
        assert_eq!(n1.alloc_cpu_cores, 3.9);
        assert_eq!(n1.alloc_memory_bytes, 16 * 1024 * 1024 * 1024);
        assert_eq!(n1.cpu_power_watts, 55.0);
        assert_eq!(n1.cpu_util, 0.4);

        let n2 = &snapshot.nodes["n2"];
        assert_eq!(n2.alloc_memory_bytes, 1024 * 1024);
        assert_eq!(n2.cpu_power_watts, 0.0);
        assert_eq!(n2.mem_util, 0.0);

        let web = &snapshot.pods["u1"];
        assert_eq!(web.cpu_millicores, 250.0);
        assert_eq!(web.node.as_deref(), Some("n1"));
        assert_eq!(web.qos, QosClass::Burstable);
        assert_eq!(snapshot.pods["u2"].cpu_millicores, 0.0);
        assert!(snapshot.pods["u2"].node.is_none());

        assert_eq!(snapshot.cluster_wide.kube_system_cpu_overhead, Some(0.3));
        assert_eq!(snapshot.power(), 55.0);
    }

    #[test]
    fn test_assemble_tolerates_missing_fields() {
        let nameless = Node::default();
        let bad_quantity = node("n1", "plenty", "");
        let snapshot = assemble(&[nameless, bad_quantity], &[Pod::default()], &MetricSet::default());

        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes["n1"].alloc_cpu_cores, 0.0);
        assert_eq!(snapshot.nodes["n1"].alloc_memory_bytes, 0);
        assert!(snapshot.pods.is_empty());
        assert!(snapshot.cluster_wide.kube_system_cpu_overhead.is_none());
    }
}
