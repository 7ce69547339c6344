use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, warn};

use crate::error::ProbeError;
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::openshift::StatusCondition;
use crate::types::{Finding, Severity};

pub const TRUE: &str = "True";
pub const FALSE: &str = "False";

const DEGRADED_CONDITIONS: &[&str] = &["Degraded", "NodeDegraded", "NodeDegrade", "RenderDegraded"];
const IN_FLIGHT_CONDITIONS: &[&str] = &["Progressing", "Updating"];

pub fn object_name(meta: &ObjectMeta) -> String {
    meta.name.clone().unwrap_or_else(|| "<unnamed>".to_string())
}

pub fn namespaced_name(meta: &ObjectMeta) -> String {
    match meta.namespace.as_deref() {
        Some(ns) => format!("{}/{}", ns, object_name(meta)),
        None => object_name(meta),
    }
}

/// Conditions of an operator or pool that warrant attention, as `Type=Status`.
///
/// Degraded variants set to True, Available set to False, and an in-flight
/// rollout (Progressing/Updating True) are all flagged.
pub fn condition_issues(conditions: &[StatusCondition]) -> Vec<String> {
    conditions
        .iter()
        .filter(|c| {
            let t = c.type_.as_str();
            (DEGRADED_CONDITIONS.contains(&t) && c.status == TRUE)
                || (t == "Available" && c.status == FALSE)
                || (IN_FLIGHT_CONDITIONS.contains(&t) && c.status == TRUE)
        })
        .map(|c| format!("{}={}", c.type_, c.status))
        .collect()
}

/// Status of the first condition of `type_`, or `"Unknown"`.
pub fn condition_status<'a>(conditions: &'a [StatusCondition], type_: &str) -> &'a str {
    conditions
        .iter()
        .find(|c| c.type_ == type_)
        .map(|c| c.status.as_str())
        .unwrap_or("Unknown")
}

/// Pods selected by label whose container must answer a local health endpoint.
#[derive(Debug, Clone, Copy)]
pub struct LivenessTarget {
    pub namespace: &'static str,
    pub label_selector: &'static str,
    pub container: &'static str,
    pub command: &'static [&'static str],
    pub expected: &'static str,
}

/// Exec the target's command in every matching pod; a response other than
/// `expected`, or a pod that cannot be exec'd into, is a Warning keyed by pod
/// name. Only a failed pod listing fails the check.
pub async fn check_liveness(
    probe: &str,
    target: &LivenessTarget,
    inspector: &dyn ClusterInspector,
    executor: &dyn RemoteExecutor,
) -> Result<Vec<Finding>, ProbeError> {
    let pods = inspector
        .list_pods(Some(target.namespace), Some(target.label_selector))
        .await?;
    debug!(
        "{}: {} pod(s) match {} in {}",
        probe,
        pods.len(),
        target.label_selector,
        target.namespace
    );

    let mut findings = Vec::with_capacity(pods.len());
    for pod in &pods {
        let name = object_name(&pod.metadata);
        let finding = match executor
            .exec(target.namespace, &name, target.container, target.command)
            .await
        {
            Ok(stdout) => {
                let response = stdout.trim();
                let finding = if response == target.expected {
                    Finding::new(probe, &name, Severity::Ok, "ready")
                } else {
                    Finding::new(
                        probe,
                        &name,
                        Severity::Warning,
                        format!("not ready: expected '{}', got '{}'", target.expected, response),
                    )
                };
                finding.with_detail("response", response)
            }
            Err(e) => {
                warn!("{}: exec in {} failed: {}", probe, name, e);
                Finding::new(probe, &name, Severity::Warning, "not ready: health command could not run")
                    .with_detail("error", e.to_string())
            }
        };
        findings.push(finding.with_detail("namespace", target.namespace));
    }
    Ok(findings)
}
