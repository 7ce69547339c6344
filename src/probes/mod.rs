// Diagnostic probes, one module per probe family
pub mod base;
pub mod admin;
pub mod control_plane;
pub mod operators;
pub mod certificates;
pub mod nodes;
pub mod network;
pub mod capacity;
pub mod alerts;
pub mod version;
pub mod pods;
pub mod disruption;
pub mod events;

use async_trait::async_trait;

use crate::config::AuditConfig;
use crate::error::ProbeError;
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::types::{Finding, ProbeResult};

pub use admin::AdminGateProbe;
pub use alerts::AlertsProbe;
pub use capacity::CapacityProbe;
pub use certificates::CertificateRequestProbe;
pub use control_plane::{ApiReadinessProbe, EtcdProbe};
pub use disruption::DisruptionBudgetProbe;
pub use events::EventProbe;
pub use network::NetworkProbe;
pub use nodes::NodeProbe;
pub use operators::{ClusterOperatorProbe, MachineConfigPoolProbe};
pub use pods::PodHealthProbe;
pub use version::VersionLagProbe;

/// A single independent diagnostic check.
#[async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &'static str;

    /// Gate probes run before all others; a Fatal finding or an error from a
    /// gate aborts the whole run.
    fn is_gate(&self) -> bool {
        false
    }

    async fn check(
        &self,
        inspector: &dyn ClusterInspector,
        executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError>;

    async fn run(
        &self,
        inspector: &dyn ClusterInspector,
        executor: &dyn RemoteExecutor,
    ) -> ProbeResult {
        match self.check(inspector, executor).await {
            Ok(findings) => ProbeResult::completed(self.name(), findings),
            Err(e) => ProbeResult::failed(self.name(), e),
        }
    }
}

/// The standard battery, in execution order: privilege gate, control plane,
/// nodes and network, cluster-wide, then namespace-scoped checks.
pub fn default_probes(config: &AuditConfig) -> Vec<Box<dyn Probe>> {
    vec![
        Box::new(AdminGateProbe),
        Box::new(ClusterOperatorProbe),
        Box::new(ApiReadinessProbe),
        Box::new(EtcdProbe),
        Box::new(MachineConfigPoolProbe),
        Box::new(CertificateRequestProbe),
        Box::new(NodeProbe),
        Box::new(NetworkProbe::new(config.network.clone())),
        Box::new(CapacityProbe::new(config.capacity_threshold_percent)),
        Box::new(AlertsProbe::new(
            config.bearer_token.clone(),
            config.ignored_alerts.clone(),
        )),
        Box::new(VersionLagProbe::new(config.channel_graph_url.clone())),
        Box::new(PodHealthProbe::new(config.container_restart_threshold)),
        Box::new(DisruptionBudgetProbe),
        Box::new(EventProbe),
    ]
}
