use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;

use super::base::object_name;
use super::Probe;
use crate::error::ProbeError;
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::types::{Finding, Severity};

pub const NAME: &str = "pods";
pub const FAILED_PODS: &str = "failedPods";
pub const POD_RESTART: &str = "podRestart";

const HEALTHY_PHASES: &[&str] = &["Running", "Succeeded"];

fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("Unknown")
}

/// Pods in a bad phase, and containers restarting more than the threshold.
pub struct PodHealthProbe {
    restart_threshold: i32,
}

impl PodHealthProbe {
    pub fn new(restart_threshold: i32) -> Self {
        Self { restart_threshold }
    }

    fn failed_pods(&self, pods: &[Pod]) -> Vec<Finding> {
        pods.iter()
            .filter(|p| !HEALTHY_PHASES.contains(&pod_phase(p)))
            .map(|p| {
                let phase = pod_phase(p);
                Finding::new(
                    NAME,
                    object_name(&p.metadata),
                    Severity::Warning,
                    format!("pod is {}", phase),
                )
                .with_detail("check", FAILED_PODS)
                .with_detail("namespace", p.metadata.namespace.clone().unwrap_or_default())
                .with_detail("phase", phase)
            })
            .collect()
    }

    fn restarting_containers(&self, pods: &[Pod]) -> Vec<Finding> {
        let mut findings = Vec::new();
        for pod in pods {
            let statuses = pod
                .status
                .as_ref()
                .and_then(|s| s.container_statuses.as_deref())
                .unwrap_or_default();
            for container in statuses
                .iter()
                .filter(|c| c.restart_count > self.restart_threshold)
            {
                findings.push(
                    Finding::new(
                        NAME,
                        object_name(&pod.metadata),
                        Severity::Warning,
                        format!(
                            "container {} restarted {} times",
                            container.name, container.restart_count
                        ),
                    )
                    .with_detail("check", POD_RESTART)
                    .with_detail("namespace", pod.metadata.namespace.clone().unwrap_or_default())
                    .with_detail("container", container.name.clone())
                    .with_detail("restarts", container.restart_count.to_string()),
                );
            }
        }
        findings
    }
}

#[async_trait]
impl Probe for PodHealthProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn check(
        &self,
        inspector: &dyn ClusterInspector,
        _executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError> {
        let pods = inspector.list_pods(None, None).await?;
        let mut findings = self.failed_pods(&pods);
        findings.extend(self.restarting_containers(&pods));
        Ok(findings)
    }
}
