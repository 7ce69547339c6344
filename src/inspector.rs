use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::api::core::v1::{ComponentStatus, Event, Node, Pod};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;

use crate::error::ProbeError;
use crate::openshift::{ClusterOperator, ClusterVersion, MachineConfigPool, Route};

/// Result of a self subject access review.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccessReview {
    pub allowed: bool,
    pub reason: Option<String>,
}

/// Live usage of one node as reported by the metrics API.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeMetrics {
    pub name: String,
    pub usage: BTreeMap<String, String>,
}

/// Read-only access to the cluster's control-plane API.
#[async_trait]
pub trait ClusterInspector: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<Node>, ProbeError>;

    /// Pods across all namespaces unless `namespace` is given; `label_selector`
    /// uses the `key=value[,key=value]` form.
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ProbeError>;

    async fn list_events(&self) -> Result<Vec<Event>, ProbeError>;

    async fn list_certificate_signing_requests(
        &self,
    ) -> Result<Vec<CertificateSigningRequest>, ProbeError>;

    async fn list_pod_disruption_budgets(&self) -> Result<Vec<PodDisruptionBudget>, ProbeError>;

    async fn list_component_statuses(&self) -> Result<Vec<ComponentStatus>, ProbeError>;

    async fn list_cluster_operators(&self) -> Result<Vec<ClusterOperator>, ProbeError>;

    async fn get_cluster_version(&self) -> Result<ClusterVersion, ProbeError>;

    async fn list_machine_config_pools(&self) -> Result<Vec<MachineConfigPool>, ProbeError>;

    async fn list_node_metrics(&self) -> Result<Vec<NodeMetrics>, ProbeError>;

    async fn self_access_review(
        &self,
        verb: &str,
        group: &str,
        resource: &str,
    ) -> Result<AccessReview, ProbeError>;

    async fn get_route(&self, namespace: &str, name: &str) -> Result<Route, ProbeError>;
}

/// Inspector calls that [`MockInspector`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InspectorCall {
    Nodes,
    Pods,
    Events,
    CertificateSigningRequests,
    PodDisruptionBudgets,
    ComponentStatuses,
    ClusterOperators,
    ClusterVersion,
    MachineConfigPools,
    NodeMetrics,
    AccessReview,
    Route,
}

/// In-memory inspector for tests and dry runs.
#[derive(Debug, Clone)]
pub struct MockInspector {
    pub nodes: Vec<Node>,
    pub pods: Vec<Pod>,
    pub events: Vec<Event>,
    pub csrs: Vec<CertificateSigningRequest>,
    pub pdbs: Vec<PodDisruptionBudget>,
    pub component_statuses: Vec<ComponentStatus>,
    pub cluster_operators: Vec<ClusterOperator>,
    pub cluster_version: Option<ClusterVersion>,
    pub machine_config_pools: Vec<MachineConfigPool>,
    pub node_metrics: Vec<NodeMetrics>,
    pub access: AccessReview,
    pub routes: Vec<Route>,
    failing: HashSet<InspectorCall>,
}

impl Default for MockInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInspector {
    /// An empty cluster where the caller is cluster-admin.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            pods: Vec::new(),
            events: Vec::new(),
            csrs: Vec::new(),
            pdbs: Vec::new(),
            component_statuses: Vec::new(),
            cluster_operators: Vec::new(),
            cluster_version: None,
            machine_config_pools: Vec::new(),
            node_metrics: Vec::new(),
            access: AccessReview {
                allowed: true,
                reason: None,
            },
            routes: Vec::new(),
            failing: HashSet::new(),
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.pods.push(pod);
        self
    }

    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_csr(mut self, csr: CertificateSigningRequest) -> Self {
        self.csrs.push(csr);
        self
    }

    pub fn with_pdb(mut self, pdb: PodDisruptionBudget) -> Self {
        self.pdbs.push(pdb);
        self
    }

    pub fn with_component_status(mut self, status: ComponentStatus) -> Self {
        self.component_statuses.push(status);
        self
    }

    pub fn with_cluster_operator(mut self, operator: ClusterOperator) -> Self {
        self.cluster_operators.push(operator);
        self
    }

    pub fn with_cluster_version(mut self, version: ClusterVersion) -> Self {
        self.cluster_version = Some(version);
        self
    }

    pub fn with_machine_config_pool(mut self, pool: MachineConfigPool) -> Self {
        self.machine_config_pools.push(pool);
        self
    }

    pub fn with_node_metrics(mut self, metrics: NodeMetrics) -> Self {
        self.node_metrics.push(metrics);
        self
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn deny_admin(mut self, reason: &str) -> Self {
        self.access = AccessReview {
            allowed: false,
            reason: Some(reason.to_string()),
        };
        self
    }

    /// Make every call of this kind fail with a transport error.
    pub fn failing(mut self, call: InspectorCall) -> Self {
        self.failing.insert(call);
        self
    }

    fn check(&self, call: InspectorCall) -> Result<(), ProbeError> {
        if self.failing.contains(&call) {
            return Err(ProbeError::Api(format!(
                "simulated transport error for {:?}",
                call
            )));
        }
        Ok(())
    }
}

fn labels_match(pod: &Pod, selector: &str) -> bool {
    let labels = pod.metadata.labels.as_ref();
    selector
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels
                .and_then(|l| l.get(key.trim()))
                .map(|v| v == value.trim())
                .unwrap_or(false),
            None => labels.map(|l| l.contains_key(term)).unwrap_or(false),
        })
}

#[async_trait]
impl ClusterInspector for MockInspector {
    async fn list_nodes(&self) -> Result<Vec<Node>, ProbeError> {
        self.check(InspectorCall::Nodes)?;
        Ok(self.nodes.clone())
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ProbeError> {
        self.check(InspectorCall::Pods)?;
        Ok(self
            .pods
            .iter()
            .filter(|p| match namespace {
                Some(ns) => p.metadata.namespace.as_deref() == Some(ns),
                None => true,
            })
            .filter(|p| label_selector.map(|s| labels_match(p, s)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn list_events(&self) -> Result<Vec<Event>, ProbeError> {
        self.check(InspectorCall::Events)?;
        Ok(self.events.clone())
    }

    async fn list_certificate_signing_requests(
        &self,
    ) -> Result<Vec<CertificateSigningRequest>, ProbeError> {
        self.check(InspectorCall::CertificateSigningRequests)?;
        Ok(self.csrs.clone())
    }

    async fn list_pod_disruption_budgets(&self) -> Result<Vec<PodDisruptionBudget>, ProbeError> {
        self.check(InspectorCall::PodDisruptionBudgets)?;
        Ok(self.pdbs.clone())
    }

    async fn list_component_statuses(&self) -> Result<Vec<ComponentStatus>, ProbeError> {
        self.check(InspectorCall::ComponentStatuses)?;
        Ok(self.component_statuses.clone())
    }

    async fn list_cluster_operators(&self) -> Result<Vec<ClusterOperator>, ProbeError> {
        self.check(InspectorCall::ClusterOperators)?;
        Ok(self.cluster_operators.clone())
    }

    async fn get_cluster_version(&self) -> Result<ClusterVersion, ProbeError> {
        self.check(InspectorCall::ClusterVersion)?;
        self.cluster_version
            .clone()
            .ok_or_else(|| ProbeError::Api("clusterversions \"version\" not found".to_string()))
    }

    async fn list_machine_config_pools(&self) -> Result<Vec<MachineConfigPool>, ProbeError> {
        self.check(InspectorCall::MachineConfigPools)?;
        Ok(self.machine_config_pools.clone())
    }

    async fn list_node_metrics(&self) -> Result<Vec<NodeMetrics>, ProbeError> {
        self.check(InspectorCall::NodeMetrics)?;
        Ok(self.node_metrics.clone())
    }

    async fn self_access_review(
        &self,
        _verb: &str,
        _group: &str,
        _resource: &str,
    ) -> Result<AccessReview, ProbeError> {
        self.check(InspectorCall::AccessReview)?;
        Ok(self.access.clone())
    }

    async fn get_route(&self, namespace: &str, name: &str) -> Result<Route, ProbeError> {
        self.check(InspectorCall::Route)?;
        self.routes
            .iter()
            .find(|r| {
                r.metadata.name == name && r.metadata.namespace.as_deref() == Some(namespace)
            })
            .cloned()
            .ok_or_else(|| {
                ProbeError::Api(format!("routes \"{}\" not found in {}", name, namespace))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(namespace: &str, name: &str, app: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_pods_filters() {
        let inspector = MockInspector::new()
            .with_pod(pod("openshift-etcd", "etcd-0", "etcd"))
            .with_pod(pod("openshift-etcd", "guard-0", "guard"))
            .with_pod(pod("default", "web-0", "etcd"));

        let all = inspector.list_pods(None, None).await.unwrap();
        assert_eq!(all.len(), 3);

        let etcd = inspector
            .list_pods(Some("openshift-etcd"), Some("app=etcd"))
            .await
            .unwrap();
        assert_eq!(etcd.len(), 1);
        assert_eq!(etcd[0].metadata.name.as_deref(), Some("etcd-0"));

        let keyed = inspector.list_pods(None, Some("app")).await.unwrap();
        assert_eq!(keyed.len(), 3);
    }

    #[tokio::test]
    async fn test_failing_call() {
        let inspector = MockInspector::new().failing(InspectorCall::PodDisruptionBudgets);
        assert!(inspector.list_pod_disruption_budgets().await.is_err());
        assert!(inspector.list_nodes().await.is_ok());
    }

    #[tokio::test]
    async fn test_access_review_default_allows() {
        let inspector = MockInspector::new();
        assert!(inspector.self_access_review("*", "*", "*").await.unwrap().allowed);

        let denied = MockInspector::new().deny_admin("forbidden");
        let review = denied.self_access_review("*", "*", "*").await.unwrap();
        assert!(!review.allowed);
        assert_eq!(review.reason.as_deref(), Some("forbidden"));
    }
}
