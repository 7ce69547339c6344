use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::Utc;
use futures::{stream, FutureExt, StreamExt};
use tracing::{debug, info, warn};

use crate::config::AuditConfig;
use crate::error::{AuditError, ProbeError};
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::probes::Probe;
use crate::report::RunSummary;
use crate::types::{ProbeResult, Severity};

/// Runs probes against shared read-only collaborators and folds the results
pub struct ProbeRunner<'a> {
    inspector: &'a dyn ClusterInspector,
    executor: &'a dyn RemoteExecutor,
    timeout: Duration,
    concurrency: usize,
    error_floor: Severity,
}

impl<'a> ProbeRunner<'a> {
    pub fn new(
        inspector: &'a dyn ClusterInspector,
        executor: &'a dyn RemoteExecutor,
        config: &AuditConfig,
    ) -> Self {
        Self {
            inspector,
            executor,
            timeout: config.probe_timeout,
            concurrency: config.concurrency.max(1),
            error_floor: config.probe_error_severity,
        }
    }

    /// Gate probes first, one at a time; then everything else with bounded
    /// concurrency. Results come back in registration order.
    pub async fn execute(&self, probes: &[Box<dyn Probe>]) -> Result<RunSummary, AuditError> {
        let started_at = Utc::now();
        let mut results: Vec<(usize, ProbeResult)> = Vec::with_capacity(probes.len());

        for (index, probe) in probes.iter().enumerate().filter(|(_, p)| p.is_gate()) {
            let result = self.run_guarded(probe.as_ref()).await;
            if let Some(err) = &result.error {
                return Err(AuditError::AdminGate(err.clone()));
            }
            if let Some(fatal) = result.findings.iter().find(|f| f.severity == Severity::Fatal) {
                let reason = fatal.detail("reason").unwrap_or(&fatal.message).to_string();
                return Err(AuditError::NotClusterAdmin { reason });
            }
            results.push((index, result));
        }

        let remaining: Vec<(usize, ProbeResult)> = stream::iter(
            probes.iter().enumerate().filter(|(_, p)| !p.is_gate()),
        )
        .map(|(index, probe)| async move { (index, self.run_guarded(probe.as_ref()).await) })
        .buffered(self.concurrency)
        .collect()
        .await;
        results.extend(remaining);
        results.sort_by_key(|(index, _)| *index);

        let summary = RunSummary::aggregate(
            results.into_iter().map(|(_, r)| r).collect(),
            self.error_floor,
            started_at,
            Utc::now(),
        );
        info!(
            "{} probe(s) finished, overall {}",
            summary.results.len(),
            summary.overall_severity
        );
        Ok(summary)
    }

    /// Like [`execute`](Self::execute), abandoning the run when `shutdown` resolves first.
    pub async fn execute_until<F>(
        &self,
        probes: &[Box<dyn Probe>],
        shutdown: F,
    ) -> Result<RunSummary, AuditError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.execute(probes) => result,
            _ = shutdown => {
                warn!("shutdown requested, abandoning in-flight probes");
                Err(AuditError::Cancelled)
            }
        }
    }

    /// A probe that times out or panics becomes a failed result instead of
    /// taking the run down.
    async fn run_guarded(&self, probe: &dyn Probe) -> ProbeResult {
        let name = probe.name();
        debug!(probe = name, "probe started");
        let guarded = AssertUnwindSafe(probe.run(self.inspector, self.executor)).catch_unwind();
        let result = match tokio::time::timeout(self.timeout, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => {
                ProbeResult::failed(name, ProbeError::Panicked(panic_message(payload.as_ref())))
            }
            Err(_) => ProbeResult::failed(name, ProbeError::Timeout(self.timeout)),
        };
        match &result.error {
            Some(err) => warn!(probe = name, error = %err, "probe failed"),
            None => debug!(probe = name, findings = result.findings.len(), "probe completed"),
        }
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use crate::inspector::MockInspector;
    use crate::probes::AdminGateProbe;
    use crate::types::Finding;
    use async_trait::async_trait;

    /// Probe with a fixed outcome after an optional delay.
    struct Scripted {
        name: &'static str,
        delay: Duration,
        severity: Option<Severity>,
    }

    impl Scripted {
        fn boxed(name: &'static str, delay_ms: u64, severity: Option<Severity>) -> Box<dyn Probe> {
            Box::new(Self {
                name,
                delay: Duration::from_millis(delay_ms),
                severity,
            })
        }
    }

    #[async_trait]
    impl Probe for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn check(
            &self,
            _inspector: &dyn ClusterInspector,
            _executor: &dyn RemoteExecutor,
        ) -> Result<Vec<Finding>, ProbeError> {
            tokio::time::sleep(self.delay).await;
            match self.severity {
                Some(severity) => Ok(vec![Finding::new(self.name, "subject", severity, "scripted")]),
                None => Err(ProbeError::Api("scripted failure".to_string())),
            }
        }
    }

    struct Panicking;

    #[async_trait]
    impl Probe for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn check(
            &self,
            _inspector: &dyn ClusterInspector,
            _executor: &dyn RemoteExecutor,
        ) -> Result<Vec<Finding>, ProbeError> {
            panic!("index out of range");
        }
    }

    fn config(timeout_ms: u64) -> AuditConfig {
        AuditConfig {
            probe_timeout: Duration::from_millis(timeout_ms),
            ..AuditConfig::default()
        }
    }

    #[tokio::test]
    async fn test_results_keep_registration_order() {
        let (inspector, executor) = (MockInspector::new(), MockExecutor::new());
        let probes = vec![
            Box::new(AdminGateProbe) as Box<dyn Probe>,
            Scripted::boxed("slow", 50, Some(Severity::Ok)),
            Scripted::boxed("fast", 0, Some(Severity::Info)),
        ];
        let summary = ProbeRunner::new(&inspector, &executor, &config(5_000))
            .execute(&probes)
            .await
            .unwrap();
        let names: Vec<&str> = summary.results.iter().map(|r| r.probe.as_str()).collect();
        assert_eq!(names, vec!["cluster-admin", "slow", "fast"]);
        assert_eq!(summary.overall_severity, Severity::Info);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let (inspector, executor) = (MockInspector::new(), MockExecutor::new());
        let probes = vec![
            Scripted::boxed("broken", 0, None),
            Scripted::boxed("healthy", 0, Some(Severity::Ok)),
        ];
        let summary = ProbeRunner::new(&inspector, &executor, &config(5_000))
            .execute(&probes)
            .await
            .unwrap();
        assert!(summary.result("broken").unwrap().is_failed());
        assert!(!summary.result("healthy").unwrap().is_failed());
        assert_eq!(summary.overall_severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_timeout_becomes_probe_error() {
        let (inspector, executor) = (MockInspector::new(), MockExecutor::new());
        let probes = vec![Scripted::boxed("hung", 10_000, Some(Severity::Ok))];
        let summary = ProbeRunner::new(&inspector, &executor, &config(20))
            .execute(&probes)
            .await
            .unwrap();
        assert!(matches!(
            summary.results[0].error,
            Some(ProbeError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_panic_becomes_probe_error() {
        let (inspector, executor) = (MockInspector::new(), MockExecutor::new());
        let probes = vec![
            Box::new(Panicking) as Box<dyn Probe>,
            Scripted::boxed("after", 0, Some(Severity::Ok)),
        ];
        let summary = ProbeRunner::new(&inspector, &executor, &config(5_000))
            .execute(&probes)
            .await
            .unwrap();
        assert_eq!(
            summary.results[0].error,
            Some(ProbeError::Panicked("index out of range".to_string()))
        );
        assert!(!summary.results[1].is_failed());
    }

    #[tokio::test]
    async fn test_gate_denial_aborts_run() {
        let inspector = MockInspector::new().deny_admin("forbidden");
        let executor = MockExecutor::new();
        let probes = vec![
            Box::new(AdminGateProbe) as Box<dyn Probe>,
            Scripted::boxed("never", 0, Some(Severity::Ok)),
        ];
        let err = ProbeRunner::new(&inspector, &executor, &config(5_000))
            .execute(&probes)
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::NotClusterAdmin { ref reason } if reason == "forbidden"));
    }

    #[tokio::test]
    async fn test_gate_error_aborts_run() {
        let inspector = MockInspector::new().failing(crate::inspector::InspectorCall::AccessReview);
        let executor = MockExecutor::new();
        let probes = vec![Box::new(AdminGateProbe) as Box<dyn Probe>];
        let err = ProbeRunner::new(&inspector, &executor, &config(5_000))
            .execute(&probes)
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::AdminGate(ProbeError::Api(_))));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_run() {
        let (inspector, executor) = (MockInspector::new(), MockExecutor::new());
        let probes = vec![Scripted::boxed("hung", 10_000, Some(Severity::Ok))];
        let err = ProbeRunner::new(&inspector, &executor, &config(60_000))
            .execute_until(&probes, tokio::time::sleep(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Cancelled));
    }

    #[test]
    fn test_sequential_run_blocks_on() {
        let (inspector, executor) = (MockInspector::new(), MockExecutor::new());
        let probes = vec![Scripted::boxed("only", 0, Some(Severity::Warning))];
        let cfg = AuditConfig {
            concurrency: 1,
            ..config(5_000)
        };
        let summary = tokio_test::block_on(
            ProbeRunner::new(&inspector, &executor, &cfg).execute(&probes),
        )
        .unwrap();
        assert_eq!(summary.overall_severity, Severity::Warning);
    }
}
