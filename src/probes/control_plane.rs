use async_trait::async_trait;

use super::base::{check_liveness, object_name, LivenessTarget, TRUE};
use super::Probe;
use crate::error::ProbeError;
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::types::{Finding, Severity};

pub const API_READINESS: &str = "api-readiness";
pub const ETCD: &str = "etcd";

pub const OPENSHIFT_APISERVER: LivenessTarget = LivenessTarget {
    namespace: "openshift-apiserver",
    label_selector: "app=openshift-apiserver-a",
    container: "openshift-apiserver",
    command: &["curl", "-k", "-s", "https://localhost:8443/readyz"],
    expected: "ok",
};

pub const KUBE_APISERVER: LivenessTarget = LivenessTarget {
    namespace: "openshift-kube-apiserver",
    label_selector: "app=openshift-kube-apiserver",
    container: "kube-apiserver",
    command: &["curl", "-k", "-s", "https://localhost:6443/readyz"],
    expected: "ok",
};

pub const ETCD_MEMBER: LivenessTarget = LivenessTarget {
    namespace: "openshift-etcd",
    label_selector: "app=etcd",
    container: "etcd",
    command: &[
        "curl",
        "-k",
        "-s",
        "-o",
        "/dev/null",
        "-w",
        "%{http_code}",
        "https://localhost:9980/healthz",
    ],
    expected: "200",
};

/// Readiness of both API server deployments plus the legacy component statuses.
pub struct ApiReadinessProbe;

#[async_trait]
impl Probe for ApiReadinessProbe {
    fn name(&self) -> &'static str {
        API_READINESS
    }

    async fn check(
        &self,
        inspector: &dyn ClusterInspector,
        executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError> {
        let mut findings =
            check_liveness(API_READINESS, &OPENSHIFT_APISERVER, inspector, executor).await?;
        findings.extend(check_liveness(API_READINESS, &KUBE_APISERVER, inspector, executor).await?);

        for component in inspector.list_component_statuses().await? {
            let name = object_name(&component.metadata);
            let conditions = component.conditions.unwrap_or_default();
            let healthy = conditions
                .iter()
                .any(|c| c.type_ == "Healthy" && c.status == TRUE);
            if healthy {
                continue;
            }
            let reason = conditions
                .iter()
                .find(|c| c.type_ == "Healthy")
                .and_then(|c| c.error.clone().or_else(|| c.message.clone()))
                .unwrap_or_else(|| "no Healthy condition reported".to_string());
            findings.push(
                Finding::new(API_READINESS, name, Severity::Warning, "component is unhealthy")
                    .with_detail("reason", reason),
            );
        }
        Ok(findings)
    }
}

/// Health endpoint of every etcd member.
pub struct EtcdProbe;

#[async_trait]
impl Probe for EtcdProbe {
    fn name(&self) -> &'static str {
        ETCD
    }

    async fn check(
        &self,
        inspector: &dyn ClusterInspector,
        executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError> {
        check_liveness(ETCD, &ETCD_MEMBER, inspector, executor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use crate::inspector::{InspectorCall, MockInspector};
    use k8s_openapi::api::core::v1::{ComponentCondition, ComponentStatus, Pod};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn pod(target: &LivenessTarget, name: &str) -> Pod {
        let (key, value) = target.label_selector.split_once('=').unwrap();
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(target.namespace.to_string()),
                labels: Some(BTreeMap::from([(key.to_string(), value.to_string())])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_etcd_members() {
        let inspector = MockInspector::new()
            .with_pod(pod(&ETCD_MEMBER, "etcd-master-0"))
            .with_pod(pod(&ETCD_MEMBER, "etcd-master-1"));
        let executor = MockExecutor::new()
            .with_exec("openshift-etcd", "etcd-master-0", "etcd", "200")
            .with_exec("openshift-etcd", "etcd-master-1", "etcd", "503");

        let findings = EtcdProbe.check(&inspector, &executor).await.unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::Ok);
        assert_eq!(findings[1].severity, Severity::Warning);
        assert_eq!(findings[1].subject, "etcd-master-1");
        assert_eq!(findings[1].detail("response"), Some("503"));
    }

    #[tokio::test]
    async fn test_api_readiness_trims_output() {
        let inspector = MockInspector::new()
            .with_pod(pod(&OPENSHIFT_APISERVER, "apiserver-a"))
            .with_pod(pod(&KUBE_APISERVER, "kube-apiserver-master-0"));
        let executor = MockExecutor::new()
            .with_exec("openshift-apiserver", "apiserver-a", "openshift-apiserver", "ok\n")
            .with_exec(
                "openshift-kube-apiserver",
                "kube-apiserver-master-0",
                "kube-apiserver",
                "[-]etcd failed: reason withheld",
            );

        let findings = ApiReadinessProbe.check(&inspector, &executor).await.unwrap();
        let warnings: Vec<_> = findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
            .collect();
        assert_eq!(findings.len(), 2);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].subject, "kube-apiserver-master-0");
    }

    #[tokio::test]
    async fn test_unhealthy_component_status() {
        let component = ComponentStatus {
            metadata: ObjectMeta {
                name: Some("scheduler".to_string()),
                ..Default::default()
            },
            conditions: Some(vec![ComponentCondition {
                type_: "Healthy".to_string(),
                status: "False".to_string(),
                error: Some("connection refused".to_string()),
                ..Default::default()
            }]),
        };
        let inspector = MockInspector::new().with_component_status(component);
        let findings = ApiReadinessProbe
            .check(&inspector, &MockExecutor::new())
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].subject, "scheduler");
        assert_eq!(findings[0].detail("reason"), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_exec_failure_marks_member_not_ready() {
        let inspector = MockInspector::new()
            .with_pod(pod(&ETCD_MEMBER, "etcd-0"))
            .with_pod(pod(&ETCD_MEMBER, "etcd-1"))
            .with_pod(pod(&ETCD_MEMBER, "etcd-2"));
        let executor = MockExecutor::new()
            .with_exec("openshift-etcd", "etcd-0", "etcd", "200")
            .with_exec_error(
                "openshift-etcd",
                "etcd-1",
                "etcd",
                ProbeError::exec("openshift-etcd/etcd-1/etcd", "container not running"),
            )
            .with_exec("openshift-etcd", "etcd-2", "etcd", "200");

        let result = EtcdProbe.run(&inspector, &executor).await;
        assert!(!result.is_failed());
        assert_eq!(result.findings.len(), 3);
        assert_eq!(result.findings[0].severity, Severity::Ok);
        assert_eq!(result.findings[2].severity, Severity::Ok);

        let broken = &result.findings[1];
        assert_eq!(broken.subject, "etcd-1");
        assert_eq!(broken.severity, Severity::Warning);
        assert!(broken.detail("error").unwrap().contains("container not running"));
    }

    #[tokio::test]
    async fn test_pod_listing_failure_fails_probe() {
        let inspector = MockInspector::new().failing(InspectorCall::Pods);
        let result = EtcdProbe.run(&inspector, &MockExecutor::new()).await;
        assert!(result.is_failed());
        assert!(result.findings.is_empty());
    }
}
