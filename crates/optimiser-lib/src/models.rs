//! Core data models for the energy optimiser

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Namespace whose pods are never evicted
pub const SYSTEM_NAMESPACE: &str = "kube-system";

/// Facts about a single node at capture time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeFacts {
    pub alloc_cpu_cores: f64,
    pub alloc_memory_bytes: u64,
    /// CPU utilisation ratio in [0, 1]
    pub cpu_util: f64,
    /// Memory utilisation ratio in [0, 1]
    pub mem_util: f64,
    pub cpu_power_watts: f64,
}

/// Pod quality-of-service class as reported by the kubelet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QosClass {
    Guaranteed,
    Burstable,
    #[default]
    BestEffort,
}

impl QosClass {
    /// Parse the `status.qosClass` string, defaulting to BestEffort
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("Guaranteed") => QosClass::Guaranteed,
            Some("Burstable") => QosClass::Burstable,
            _ => QosClass::BestEffort,
        }
    }
}

/// Facts about a single pod at capture time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodFacts {
    pub name: String,
    pub namespace: String,
    /// Assigned node, absent while the pod is pending
    pub node: Option<String>,
    pub cpu_millicores: f64,
    pub qos: QosClass,
}

impl PodFacts {
    pub fn is_system(&self) -> bool {
        self.namespace == SYSTEM_NAMESPACE
    }
}

/// Cluster-wide aggregates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterWide {
    /// CPU cores consumed by kube-system workloads
    pub kube_system_cpu_overhead: Option<f64>,
}

/// Point-in-time view of the cluster, captured once per cycle
///
/// Both maps are keyed and ordered by identifier: node name for `nodes`,
/// pod UID for `pods`. Either may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub nodes: BTreeMap<String, NodeFacts>,
    pub pods: BTreeMap<String, PodFacts>,
    pub cluster_wide: ClusterWide,
}

impl Snapshot {
    /// A snapshot of a cluster with no nodes and no pods
    pub fn empty() -> Self {
        Self {
            timestamp: Utc::now(),
            nodes: BTreeMap::new(),
            pods: BTreeMap::new(),
            cluster_wide: ClusterWide::default(),
        }
    }

    /// Total CPU power draw across all nodes, in watts
    pub fn power(&self) -> f64 {
        self.nodes
            .values()
            .map(|n| finite_or_zero(n.cpu_power_watts))
            .sum()
    }

    /// Pods currently assigned to `node`
    pub fn pods_on<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a PodFacts> + 'a {
        self.pods
            .values()
            .filter(move |p| p.node.as_deref() == Some(node))
    }
}

/// Replace NaN and infinities coming from upstream metrics with zero
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Coarse action category chosen by the family stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionFamily {
    DoNothing,
    Consolidate,
    Defragment,
    HardwareTune,
}

impl ActionFamily {
    /// Number of families; the family stage's action space
    pub const COUNT: usize = 4;

    pub const ALL: [ActionFamily; Self::COUNT] = [
        ActionFamily::DoNothing,
        ActionFamily::Consolidate,
        ActionFamily::Defragment,
        ActionFamily::HardwareTune,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn id(self) -> usize {
        match self {
            ActionFamily::DoNothing => 0,
            ActionFamily::Consolidate => 1,
            ActionFamily::Defragment => 2,
            ActionFamily::HardwareTune => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionFamily::DoNothing => "DO_NOTHING",
            ActionFamily::Consolidate => "CONSOLIDATE",
            ActionFamily::Defragment => "DEFRAGMENT",
            ActionFamily::HardwareTune => "HARDWARE_TUNE",
        }
    }
}

impl fmt::Display for ActionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved intent for one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub action: ActionFamily,
    /// Target node; `None` for DO_NOTHING or when no nodes were known
    pub target: Option<String>,
}

impl Suggestion {
    pub fn do_nothing() -> Self {
        Self {
            action: ActionFamily::DoNothing,
            target: None,
        }
    }

    /// The action that will actually take effect
    ///
    /// A family without a target node has nothing to act on.
    pub fn effective_action(&self) -> ActionFamily {
        match self.target {
            Some(_) => self.action,
            None => ActionFamily::DoNothing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(watts: f64) -> NodeFacts {
        NodeFacts {
            cpu_power_watts: watts,
            ..Default::default()
        }
    }

    #[test]
    fn test_targetless_suggestion_is_effectively_idle() {
        let idle = Suggestion {
            action: ActionFamily::Consolidate,
            target: None,
        };
        assert_eq!(idle.effective_action(), ActionFamily::DoNothing);

        let tune = Suggestion {
            action: ActionFamily::HardwareTune,
            target: Some("n1".to_string()),
        };
        assert_eq!(tune.effective_action(), ActionFamily::HardwareTune);
    }

    #[test]
    fn test_family_index_round_trip() {
        for (i, family) in ActionFamily::ALL.iter().enumerate() {
            assert_eq!(family.id(), i);
            assert_eq!(ActionFamily::from_index(i), Some(*family));
        }
        assert_eq!(ActionFamily::from_index(ActionFamily::COUNT), None);
    }

    #[test]
    fn test_family_serializes_as_screaming_case() {
        let json = serde_json::to_string(&ActionFamily::HardwareTune).unwrap();
        assert_eq!(json, "\"HARDWARE_TUNE\"");
    }

    #[test]
    fn test_snapshot_power_sums_nodes() {
        let mut snapshot = Snapshot::empty();
        assert_eq!(snapshot.power(), 0.0);

        snapshot.nodes.insert("a".to_string(), node(100.0));
        snapshot.nodes.insert("b".to_string(), node(42.5));
        snapshot.nodes.insert("c".to_string(), node(f64::NAN));
        assert!((snapshot.power() - 142.5).abs() < 1e-9);
    }

    #[test]
    fn test_pods_on_filters_by_node() {
        let mut snapshot = Snapshot::empty();
        for (uid, node) in [("u1", Some("n1")), ("u2", Some("n2")), ("u3", None)] {
            snapshot.pods.insert(
                uid.to_string(),
                PodFacts {
                    name: format!("pod-{}", uid),
                    namespace: "default".to_string(),
                    node: node.map(str::to_string),
                    cpu_millicores: 10.0,
                    qos: QosClass::BestEffort,
                },
            );
        }
        let names: Vec<_> = snapshot.pods_on("n1").map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["pod-u1"]);
    }

    #[test]
    fn test_qos_parse_defaults_to_best_effort() {
        assert_eq!(QosClass::parse(Some("Guaranteed")), QosClass::Guaranteed);
        assert_eq!(QosClass::parse(Some("Burstable")), QosClass::Burstable);
        assert_eq!(QosClass::parse(None), QosClass::BestEffort);
        assert_eq!(QosClass::parse(Some("weird")), QosClass::BestEffort);
    }
}
