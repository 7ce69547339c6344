use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::debug;

use super::base::object_name;
use super::Probe;
use crate::error::ProbeError;
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::parsing::{allocated_percent, parse_cpu_millicores, parse_memory_bytes, utilization_percent};
use crate::types::{Finding, Severity};

pub const NAME: &str = "capacity";
pub const ALLOCATION: &str = "allocation";
pub const UTILIZATION: &str = "utilization";

/// CPU (millicores) and memory (bytes) figures for one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resources {
    pub cpu: f64,
    pub memory: f64,
}

impl Resources {
    fn from_quantities(quantities: &BTreeMap<String, Quantity>) -> Option<Self> {
        Some(Self {
            cpu: parse_cpu_millicores(&quantities.get("cpu")?.0)?,
            memory: parse_memory_bytes(&quantities.get("memory")?.0)?,
        })
    }

    fn from_usage(usage: &BTreeMap<String, String>) -> Option<Self> {
        Some(Self {
            cpu: parse_cpu_millicores(usage.get("cpu")?)?,
            memory: parse_memory_bytes(usage.get("memory")?)?,
        })
    }
}

/// Capacity and allocatable of a node, when both are reported and parse.
pub fn node_baseline(node: &Node) -> Option<(Resources, Resources)> {
    let status = node.status.as_ref()?;
    let capacity = Resources::from_quantities(status.capacity.as_ref()?)?;
    let allocatable = Resources::from_quantities(status.allocatable.as_ref()?)?;
    Some((capacity, allocatable))
}

/// Reserved and live-used share of every node's CPU and memory.
pub struct CapacityProbe {
    threshold_percent: f64,
}

impl CapacityProbe {
    pub fn new(threshold_percent: f64) -> Self {
        Self { threshold_percent }
    }

    fn finding(&self, node: &str, check: &str, cpu: f64, memory: f64) -> Finding {
        let over = cpu >= self.threshold_percent || memory >= self.threshold_percent;
        let (severity, message) = if over {
            (
                Severity::Warning,
                format!("{} at or above {:.0}%", check, self.threshold_percent),
            )
        } else {
            (Severity::Ok, format!("{} within limits", check))
        };
        Finding::new(NAME, node, severity, message)
            .with_detail("check", check)
            .with_detail("cpu%", format!("{:.1}", cpu))
            .with_detail("memory%", format!("{:.1}", memory))
    }
}

#[async_trait]
impl Probe for CapacityProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn check(
        &self,
        inspector: &dyn ClusterInspector,
        _executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError> {
        let nodes = inspector.list_nodes().await?;
        let mut baselines = BTreeMap::new();
        for node in &nodes {
            let name = object_name(&node.metadata);
            match node_baseline(node) {
                Some(baseline) => {
                    baselines.insert(name, baseline);
                }
                None => debug!("node {} reports no usable capacity, skipping", name),
            }
        }

        let mut findings = Vec::new();
        for (name, (capacity, allocatable)) in &baselines {
            if let (Some(cpu), Some(memory)) = (
                allocated_percent(allocatable.cpu, capacity.cpu),
                allocated_percent(allocatable.memory, capacity.memory),
            ) {
                findings.push(self.finding(name, ALLOCATION, cpu, memory));
            }
        }

        for metrics in inspector.list_node_metrics().await? {
            let Some((capacity, _)) = baselines.get(&metrics.name) else {
                debug!("metrics for unknown node {}", metrics.name);
                continue;
            };
            let Some(usage) = Resources::from_usage(&metrics.usage) else {
                continue;
            };
            if let (Some(cpu), Some(memory)) = (
                utilization_percent(usage.cpu, capacity.cpu),
                utilization_percent(usage.memory, capacity.memory),
            ) {
                findings.push(self.finding(&metrics.name, UTILIZATION, cpu, memory));
            }
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use crate::inspector::{InspectorCall, MockInspector, NodeMetrics};
    use k8s_openapi::api::core::v1::NodeStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
        BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
        ])
    }

    fn node(name: &str, allocatable: (&str, &str)) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                capacity: Some(quantities("4", "16Gi")),
                allocatable: Some(quantities(allocatable.0, allocatable.1)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn metrics(name: &str, cpu: &str, memory: &str) -> NodeMetrics {
        NodeMetrics {
            name: name.to_string(),
            usage: BTreeMap::from([
                ("cpu".to_string(), cpu.to_string()),
                ("memory".to_string(), memory.to_string()),
            ]),
        }
    }

    #[tokio::test]
    async fn test_allocation_and_utilization() {
        let inspector = MockInspector::new()
            .with_node(node("worker-0", ("3500m", "15Gi")))
            .with_node(node("worker-1", ("500m", "15Gi")))
            .with_node_metrics(metrics("worker-0", "3400m", "2Gi"))
            .with_node_metrics(metrics("worker-1", "1", "4Gi"));
        let findings = CapacityProbe::new(80.0)
            .check(&inspector, &MockExecutor::new())
            .await
            .unwrap();

        assert_eq!(findings.len(), 4);
        let allocation: Vec<_> = findings
            .iter()
            .filter(|f| f.detail("check") == Some(ALLOCATION))
            .collect();
        assert_eq!(allocation[0].subject, "worker-0");
        assert_eq!(allocation[0].severity, Severity::Ok);
        assert_eq!(allocation[0].detail("cpu%"), Some("12.5"));
        assert_eq!(allocation[1].subject, "worker-1");
        assert_eq!(allocation[1].severity, Severity::Warning);
        assert_eq!(allocation[1].detail("cpu%"), Some("87.5"));

        let utilization: Vec<_> = findings
            .iter()
            .filter(|f| f.detail("check") == Some(UTILIZATION))
            .collect();
        assert_eq!(utilization[0].severity, Severity::Warning);
        assert_eq!(utilization[0].detail("cpu%"), Some("85.0"));
        assert_eq!(utilization[1].severity, Severity::Ok);
        assert_eq!(utilization[1].detail("memory%"), Some("25.0"));
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let inspector = MockInspector::new().with_node(node("worker-0", ("800m", "16Gi")));
        let findings = CapacityProbe::new(80.0)
            .check(&inspector, &MockExecutor::new())
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_metrics_failure_fails_probe() {
        let inspector = MockInspector::new()
            .with_node(node("worker-0", ("3", "12Gi")))
            .failing(InspectorCall::NodeMetrics);
        let result = CapacityProbe::new(80.0)
            .run(&inspector, &MockExecutor::new())
            .await;
        assert!(result.is_failed());
        assert!(result.findings.is_empty());
    }
}
