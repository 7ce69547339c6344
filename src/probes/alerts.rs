use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::Probe;
use crate::error::ProbeError;
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::types::{Finding, Severity};

pub const NAME: &str = "alerts";
pub const MONITORING_NAMESPACE: &str = "openshift-monitoring";
pub const ALERTMANAGER_ROUTE: &str = "alertmanager-main";

const FIRING_STATES: &[&str] = &["active", "firing"];

#[derive(Debug, Deserialize)]
pub struct AlertResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Vec<Alert>,
}

#[derive(Debug, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub labels: AlertLabels,
    #[serde(default)]
    pub status: AlertStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertLabels {
    #[serde(default)]
    pub alertname: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub severity: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertStatus {
    #[serde(default)]
    pub state: String,
}

/// Alerts currently firing in the cluster's Alertmanager.
pub struct AlertsProbe {
    bearer: Option<String>,
    ignored: Vec<String>,
}

impl AlertsProbe {
    /// `ignored` names alerts never reported, such as the always-on `Watchdog`.
    pub fn new(bearer: Option<String>, ignored: Vec<String>) -> Self {
        Self { bearer, ignored }
    }
}

#[async_trait]
impl Probe for AlertsProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn check(
        &self,
        inspector: &dyn ClusterInspector,
        executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError> {
        let route = inspector
            .get_route(MONITORING_NAMESPACE, ALERTMANAGER_ROUTE)
            .await?;
        if route.spec.host.is_empty() {
            return Err(ProbeError::Missing(format!(
                "host of route {}/{}",
                MONITORING_NAMESPACE, ALERTMANAGER_ROUTE
            )));
        }
        let url = format!("https://{}/api/v1/alerts", route.spec.host);
        let body = executor.http_get(&url, self.bearer.as_deref()).await?;
        let response: AlertResponse =
            serde_json::from_str(&body).map_err(|e| ProbeError::decode("alert list", e))?;
        debug!(
            "alertmanager answered '{}' with {} alert(s)",
            response.status,
            response.data.len()
        );

        let findings: Vec<Finding> = response
            .data
            .iter()
            .filter(|a| FIRING_STATES.contains(&a.status.state.as_str()))
            .filter(|a| !self.ignored.iter().any(|i| i == &a.labels.alertname))
            .map(|a| {
                Finding::new(NAME, &a.labels.alertname, Severity::Warning, "alert is firing")
                    .with_detail("namespace", a.labels.namespace.clone())
                    .with_detail("severity", a.labels.severity.clone())
                    .with_detail("state", a.status.state.clone())
            })
            .collect();

        if findings.is_empty() {
            return Ok(vec![Finding::new(
                NAME,
                "alertmanager",
                Severity::Ok,
                "no alerts in firing state",
            )]);
        }
        Ok(findings)
    }
}
