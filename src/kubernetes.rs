use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::api::core::v1::{ComponentStatus, Event, Node, Pod};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::{
    Api, AttachParams, DeleteParams, DynamicObject, ListParams, LogParams, PostParams,
};
use kube::discovery::ApiResource;
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::error::ProbeError;
use crate::executor::{HttpFetcher, RemoteExecutor};
use crate::inspector::{AccessReview, ClusterInspector, NodeMetrics};
use crate::openshift::{
    cluster_operator_api, cluster_version_api, machine_config_pool_api, route_api,
    ClusterOperator, ClusterVersion, MachineConfigPool, Route,
};

/// [`ClusterInspector`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeInspector {
    client: Client,
}

impl KubeInspector {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn list_all<K>(&self) -> Result<Vec<K>, ProbeError>
    where
        K: kube::Resource + Clone + DeserializeOwned + std::fmt::Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_dynamic<T: DeserializeOwned>(&self, ar: &ApiResource) -> Result<Vec<T>, ProbeError> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), ar);
        let list = api.list(&ListParams::default()).await?;
        list.items
            .into_iter()
            .map(|obj| decode_dynamic(&ar.kind, obj))
            .collect()
    }
}

fn decode_dynamic<T: DeserializeOwned>(kind: &str, obj: DynamicObject) -> Result<T, ProbeError> {
    let value = serde_json::to_value(&obj).map_err(|e| ProbeError::decode(kind, e))?;
    serde_json::from_value(value).map_err(|e| ProbeError::decode(kind, e))
}

#[derive(Debug, Deserialize)]
struct NodeMetricsItem {
    metadata: serde_json::Value,
    #[serde(default)]
    usage: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct NodeMetricsList {
    items: Vec<NodeMetricsItem>,
}

#[async_trait]
impl ClusterInspector for KubeInspector {
    async fn list_nodes(&self) -> Result<Vec<Node>, ProbeError> {
        self.list_all::<Node>().await
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ProbeError> {
        let api: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        Ok(api.list(&params).await?.items)
    }

    async fn list_events(&self) -> Result<Vec<Event>, ProbeError> {
        self.list_all::<Event>().await
    }

    async fn list_certificate_signing_requests(
        &self,
    ) -> Result<Vec<CertificateSigningRequest>, ProbeError> {
        self.list_all::<CertificateSigningRequest>().await
    }

    async fn list_pod_disruption_budgets(&self) -> Result<Vec<PodDisruptionBudget>, ProbeError> {
        self.list_all::<PodDisruptionBudget>().await
    }

    async fn list_component_statuses(&self) -> Result<Vec<ComponentStatus>, ProbeError> {
        self.list_all::<ComponentStatus>().await
    }

    async fn list_cluster_operators(&self) -> Result<Vec<ClusterOperator>, ProbeError> {
        self.list_dynamic(&cluster_operator_api()).await
    }

    async fn get_cluster_version(&self) -> Result<ClusterVersion, ProbeError> {
        let ar = cluster_version_api();
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let obj = api.get("version").await?;
        decode_dynamic(&ar.kind, obj)
    }

    async fn list_machine_config_pools(&self) -> Result<Vec<MachineConfigPool>, ProbeError> {
        self.list_dynamic(&machine_config_pool_api()).await
    }

    async fn list_node_metrics(&self) -> Result<Vec<NodeMetrics>, ProbeError> {
        let req = http::Request::builder()
            .method("GET")
            .uri("/apis/metrics.k8s.io/v1beta1/nodes")
            .body(Vec::new())
            .map_err(|e| ProbeError::Api(format!("build request: {}", e)))?;
        let list: NodeMetricsList = self.client.request(req).await?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|item| {
                let name = item.metadata.get("name").and_then(|v| v.as_str())?.to_string();
                Some(NodeMetrics {
                    name,
                    usage: item.usage,
                })
            })
            .collect())
    }

    async fn self_access_review(
        &self,
        verb: &str,
        group: &str,
        resource: &str,
    ) -> Result<AccessReview, ProbeError> {
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    verb: Some(verb.to_string()),
                    group: Some(group.to_string()),
                    resource: Some(resource.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let api: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());
        let created = api.create(&PostParams::default(), &review).await?;
        let status = created.status.unwrap_or_default();
        Ok(AccessReview {
            allowed: status.allowed,
            reason: status.reason,
        })
    }

    async fn get_route(&self, namespace: &str, name: &str) -> Result<Route, ProbeError> {
        let ar = route_api();
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        let obj = api.get(name).await?;
        decode_dynamic(&ar.kind, obj)
    }
}

/// How long a test pod may take to finish before it is abandoned.
pub const DEFAULT_COMPLETION_DEADLINE: Duration = Duration::from_secs(40);

/// [`RemoteExecutor`] using the pod exec subresource for in-pod commands and
/// [`HttpFetcher`] for outbound requests.
#[derive(Clone)]
pub struct KubeExecutor {
    client: Client,
    http: HttpFetcher,
    poll_interval: Duration,
    completion_deadline: Duration,
}

impl KubeExecutor {
    pub fn new(client: Client, http: HttpFetcher) -> Self {
        Self {
            client,
            http,
            poll_interval: Duration::from_secs(2),
            completion_deadline: DEFAULT_COMPLETION_DEADLINE,
        }
    }

    /// Keep this well under the probe timeout; the network probe runs two pods.
    pub fn with_completion_deadline(mut self, deadline: Duration) -> Self {
        self.completion_deadline = deadline;
        self
    }

    async fn delete_and_wait(&self, pods: &Api<Pod>, name: &str) -> Result<(), ProbeError> {
        if pods.get_opt(name).await?.is_none() {
            return Ok(());
        }
        debug!("removing leftover pod {}", name);
        pods.delete(name, &DeleteParams::default()).await?;
        while pods.get_opt(name).await?.is_some() {
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }

    async fn wait_for_completion(&self, pods: &Api<Pod>, name: &str) -> Result<String, ProbeError> {
        loop {
            let pod = pods.get(name).await?;
            let phase = pod
                .status
                .as_ref()
                .and_then(|s| s.phase.clone())
                .unwrap_or_default();
            if phase == "Succeeded" || phase == "Failed" {
                return Ok(phase);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Run `fut`, turning an expired deadline into [`ProbeError::Timeout`].
pub async fn within_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, ProbeError>
where
    F: std::future::Future<Output = Result<T, ProbeError>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .unwrap_or(Err(ProbeError::Timeout(deadline)))
}

/// Deletes a created pod when dropped while still armed, so a run cancelled
/// mid-wait does not leave it behind.
struct PodCleanup {
    pods: Api<Pod>,
    name: Option<String>,
}

impl PodCleanup {
    fn new(pods: Api<Pod>, name: &str) -> Self {
        Self {
            pods,
            name: Some(name.to_string()),
        }
    }

    async fn finish(mut self) {
        if let Some(name) = self.name.take() {
            if let Err(e) = self.pods.delete(&name, &DeleteParams::default()).await {
                warn!("could not remove pod {}: {}", name, e);
            }
        }
    }
}

impl Drop for PodCleanup {
    fn drop(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pods = self.pods.clone();
                handle.spawn(async move {
                    if let Err(e) = pods.delete(&name, &DeleteParams::default()).await {
                        warn!("could not remove abandoned pod {}: {}", name, e);
                    }
                });
            }
            Err(_) => warn!("pod {} abandoned without cleanup", name),
        }
    }
}

fn ephemeral_pod(name: &str, image: &str, script: &str) -> Result<Pod, ProbeError> {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "labels": {"app.kubernetes.io/managed-by": "kube-health-auditor"}
        },
        "spec": {
            "restartPolicy": "Never",
            "containers": [{
                "name": name,
                "image": image,
                "command": ["/bin/bash", "-c", script]
            }]
        }
    }))
    .map_err(|e| ProbeError::decode("ephemeral pod", e))
}

#[async_trait]
impl RemoteExecutor for KubeExecutor {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[&str],
    ) -> Result<String, ProbeError> {
        let target = format!("{}/{}/{}", namespace, pod, container);
        debug!("exec in {}: {:?}", target, command);
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::default().container(container).stderr(false);
        let mut attached = pods
            .exec(pod, command.to_vec(), &params)
            .await
            .map_err(|e| ProbeError::exec(&target, e))?;

        let mut stdout = String::new();
        if let Some(mut reader) = attached.stdout() {
            reader
                .read_to_string(&mut stdout)
                .await
                .map_err(|e| ProbeError::exec(&target, e))?;
        }
        attached
            .join()
            .await
            .map_err(|e| ProbeError::exec(&target, e))?;
        Ok(stdout)
    }

    async fn http_get(&self, url: &str, bearer: Option<&str>) -> Result<String, ProbeError> {
        self.http.get(url, bearer).await
    }

    async fn run_ephemeral(
        &self,
        namespace: &str,
        name: &str,
        image: &str,
        script: &str,
    ) -> Result<String, ProbeError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        self.delete_and_wait(&pods, name).await?;

        pods.create(&PostParams::default(), &ephemeral_pod(name, image, script)?)
            .await?;
        let cleanup = PodCleanup::new(pods.clone(), name);
        let outcome =
            within_deadline(self.completion_deadline, self.wait_for_completion(&pods, name)).await;
        let logs = match outcome {
            Ok(phase) => {
                debug!("pod {}/{} finished with phase {}", namespace, name, phase);
                pods.logs(name, &LogParams::default())
                    .await
                    .map_err(ProbeError::from)
            }
            Err(e) => Err(e),
        };

        cleanup.finish().await;
        logs
    }
}
