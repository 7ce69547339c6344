use async_trait::async_trait;
use tracing::debug;

use super::base::{condition_issues, condition_status};
use super::Probe;
use crate::error::ProbeError;
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::openshift::StatusCondition;
use crate::types::{Finding, Severity};

pub const CLUSTER_OPERATORS: &str = "cluster-operators";
pub const MACHINE_CONFIG_POOLS: &str = "machine-config-pools";

fn condition_finding(
    probe: &str,
    subject: &str,
    conditions: &[StatusCondition],
    in_flight: &str,
) -> Option<Finding> {
    let issues = condition_issues(conditions);
    if issues.is_empty() {
        return None;
    }
    Some(
        Finding::new(probe, subject, Severity::Warning, issues.join(", "))
            .with_detail("available", condition_status(conditions, "Available"))
            .with_detail(in_flight.to_lowercase(), condition_status(conditions, in_flight))
            .with_detail("degraded", condition_status(conditions, "Degraded")),
    )
}

/// Operators that are degraded, unavailable, or mid-rollout.
pub struct ClusterOperatorProbe;

#[async_trait]
impl Probe for ClusterOperatorProbe {
    fn name(&self) -> &'static str {
        CLUSTER_OPERATORS
    }

    async fn check(
        &self,
        inspector: &dyn ClusterInspector,
        _executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError> {
        let operators = inspector.list_cluster_operators().await?;
        debug!("checking {} cluster operators", operators.len());
        Ok(operators
            .iter()
            .filter_map(|op| {
                condition_finding(
                    CLUSTER_OPERATORS,
                    &op.metadata.name,
                    &op.status.conditions,
                    "Progressing",
                )
            })
            .collect())
    }
}

/// Machine-config pools with degraded nodes or an update in flight.
pub struct MachineConfigPoolProbe;

#[async_trait]
impl Probe for MachineConfigPoolProbe {
    fn name(&self) -> &'static str {
        MACHINE_CONFIG_POOLS
    }

    async fn check(
        &self,
        inspector: &dyn ClusterInspector,
        _executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError> {
        let pools = inspector.list_machine_config_pools().await?;
        Ok(pools
            .iter()
            .filter_map(|pool| {
                let status = &pool.status;
                condition_finding(
                    MACHINE_CONFIG_POOLS,
                    &pool.metadata.name,
                    &status.conditions,
                    "Updating",
                )
                .map(|f| {
                    f.with_detail("machines", status.machine_count.to_string())
                        .with_detail("ready", status.ready_machine_count.to_string())
                        .with_detail("updated", status.updated_machine_count.to_string())
                        .with_detail("degradedMachines", status.degraded_machine_count.to_string())
                })
            })
            .collect())
    }
}
