use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::base::namespaced_name;
use super::Probe;
use crate::error::ProbeError;
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::types::{Finding, Severity};

pub const NAME: &str = "disruption-budgets";

/// True when `maxUnavailable` forbids every voluntary eviction.
pub fn blocks_eviction(max_unavailable: Option<&IntOrString>) -> bool {
    match max_unavailable {
        Some(IntOrString::Int(n)) => *n == 0,
        Some(IntOrString::String(s)) => s.trim() == "0%",
        None => false,
    }
}

fn describe(value: &IntOrString) -> String {
    match value {
        IntOrString::Int(n) => n.to_string(),
        IntOrString::String(s) => s.clone(),
    }
}

/// Disruption budgets that would stall node drains during maintenance.
pub struct DisruptionBudgetProbe;

#[async_trait]
impl Probe for DisruptionBudgetProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn check(
        &self,
        inspector: &dyn ClusterInspector,
        _executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError> {
        let budgets = inspector.list_pod_disruption_budgets().await?;
        Ok(budgets
            .iter()
            .filter_map(|pdb| {
                let max = pdb.spec.as_ref()?.max_unavailable.as_ref()?;
                if !blocks_eviction(Some(max)) {
                    return None;
                }
                Some(
                    Finding::new(
                        NAME,
                        namespaced_name(&pdb.metadata),
                        Severity::Warning,
                        "maxUnavailable allows no disruptions",
                    )
                    .with_detail("maxUnavailable", describe(max)),
                )
            })
            .collect())
    }
}
