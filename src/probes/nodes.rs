use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;

use super::base::{object_name, TRUE};
use super::Probe;
use crate::error::ProbeError;
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::types::{Finding, Severity};

pub const NAME: &str = "nodes";
pub const UNSCHEDULABLE_TAINT: &str = "node.kubernetes.io/unschedulable";

/// Condition problems on a node: Ready not True, or any other condition True.
pub fn unhealthy_conditions(node: &Node) -> Vec<String> {
    let conditions = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default();

    let mut issues = Vec::new();
    match conditions.iter().find(|c| c.type_ == "Ready") {
        Some(ready) if ready.status == TRUE => {}
        Some(ready) => issues.push(format!("Ready={}", ready.status)),
        None => issues.push("Ready=Unknown".to_string()),
    }
    issues.extend(
        conditions
            .iter()
            .filter(|c| c.type_ != "Ready" && c.status == TRUE)
            .map(|c| format!("{}={}", c.type_, c.status)),
    );
    issues
}

/// Node readiness, pressure conditions and taints.
pub struct NodeProbe;

#[async_trait]
impl Probe for NodeProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn check(
        &self,
        inspector: &dyn ClusterInspector,
        _executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError> {
        let nodes = inspector.list_nodes().await?;
        let mut findings = Vec::new();

        for node in &nodes {
            let name = object_name(&node.metadata);
            let issues = unhealthy_conditions(node);
            if !issues.is_empty() {
                findings.push(
                    Finding::new(NAME, &name, Severity::Warning, "node is not healthy")
                        .with_detail("conditions", issues.join(", ")),
                );
            }

            let taints = node
                .spec
                .as_ref()
                .and_then(|s| s.taints.as_deref())
                .unwrap_or_default();
            for taint in taints {
                let rendered = match taint.value.as_deref() {
                    Some(v) if !v.is_empty() => format!("{}={}:{}", taint.key, v, taint.effect),
                    _ => format!("{}:{}", taint.key, taint.effect),
                };
                let finding = if taint.key == UNSCHEDULABLE_TAINT && taint.effect == "NoSchedule" {
                    Finding::new(NAME, &name, Severity::Warning, "node is cordoned")
                } else {
                    Finding::new(NAME, &name, Severity::Info, "node is tainted")
                };
                findings.push(finding.with_detail("taint", rendered));
            }
        }
        Ok(findings)
    }
}
