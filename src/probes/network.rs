use async_trait::async_trait;
use tracing::debug;

use super::Probe;
use crate::config::NetworkTestConfig;
use crate::error::ProbeError;
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::types::{Finding, Severity};

pub const NAME: &str = "network";
pub const EGRESS_WORKLOAD: &str = "egress-tester";
pub const DNS_WORKLOAD: &str = "dns-tester";

const SUCCESS_MARKER: &str = "OK";

/// Upper bounds for the test commands, so a silently dropped connection
/// fails inside the pod instead of outliving the probe.
const CURL_CONNECT_TIMEOUT_SECS: u32 = 10;
const CURL_MAX_TIME_SECS: u32 = 20;
const DIG_TIME_SECS: u32 = 5;
const DIG_TRIES: u32 = 2;

/// One network test, run in its own short-lived pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    Dns,
    Egress,
}

impl Workload {
    /// Pod name of the workload.
    pub fn name(self) -> &'static str {
        match self {
            Workload::Dns => DNS_WORKLOAD,
            Workload::Egress => EGRESS_WORKLOAD,
        }
    }

    /// Shell script that prints the success marker only when the check passes.
    pub fn script(self, target: &str) -> String {
        match self {
            Workload::Dns => format!(
                "sleep 3 && dig +short +time={} +tries={} {} >/dev/null 2>&1 && echo {}",
                DIG_TIME_SECS, DIG_TRIES, target, SUCCESS_MARKER
            ),
            Workload::Egress => format!(
                "curl -sS --connect-timeout {} --max-time {} https://{} >/dev/null 2>&1 && echo {}",
                CURL_CONNECT_TIMEOUT_SECS, CURL_MAX_TIME_SECS, target, SUCCESS_MARKER
            ),
        }
    }
}

/// Egress reachability and external DNS resolution, each tested from a
/// short-lived pod.
pub struct NetworkProbe {
    config: NetworkTestConfig,
}

impl NetworkProbe {
    pub fn new(config: NetworkTestConfig) -> Self {
        Self { config }
    }

    async fn run_workload(
        &self,
        executor: &dyn RemoteExecutor,
        workload: Workload,
        passed: &str,
        failed: &str,
    ) -> Result<Finding, ProbeError> {
        let script = workload.script(&self.config.target);
        debug!("running {} in {}", workload.name(), self.config.namespace);
        let logs = executor
            .run_ephemeral(&self.config.namespace, workload.name(), &self.config.image, &script)
            .await?;
        let finding = if logs.contains(SUCCESS_MARKER) {
            Finding::new(NAME, workload.name(), Severity::Ok, passed)
        } else {
            Finding::new(NAME, workload.name(), Severity::Warning, failed)
        };
        Ok(finding.with_detail("target", self.config.target.clone()))
    }
}

#[async_trait]
impl Probe for NetworkProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn check(
        &self,
        _inspector: &dyn ClusterInspector,
        executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError> {
        let dns = self
            .run_workload(
                executor,
                Workload::Dns,
                "DNS resolves external names",
                "DNS cannot resolve external names",
            )
            .await?;
        let egress = self
            .run_workload(
                executor,
                Workload::Egress,
                "internet is reachable",
                "internet is not reachable",
            )
            .await?;
        Ok(vec![dns, egress])
    }
}
