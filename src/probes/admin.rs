use async_trait::async_trait;
use tracing::info;

use super::Probe;
use crate::error::ProbeError;
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::types::{Finding, Severity};

pub const NAME: &str = "cluster-admin";

/// Verifies the caller may do anything on any resource. Everything else
/// depends on that access, so this is the run's gate.
pub struct AdminGateProbe;

#[async_trait]
impl Probe for AdminGateProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_gate(&self) -> bool {
        true
    }

    async fn check(
        &self,
        inspector: &dyn ClusterInspector,
        _executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError> {
        let review = inspector.self_access_review("*", "*", "*").await?;
        if review.allowed {
            info!("user is cluster-admin");
            return Ok(vec![Finding::new(NAME, "user", Severity::Ok, "user is cluster-admin")]);
        }
        let reason = review
            .reason
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "access review denied".to_string());
        Ok(vec![Finding::new(
            NAME,
            "user",
            Severity::Fatal,
            "user is not a cluster-admin",
        )
        .with_detail("reason", reason)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use crate::inspector::{InspectorCall, MockInspector};

    #[tokio::test]
    async fn test_admin_allowed() {
        let findings = AdminGateProbe
            .check(&MockInspector::new(), &MockExecutor::new())
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Ok);
    }

    #[tokio::test]
    async fn test_admin_denied_is_fatal() {
        let inspector = MockInspector::new().deny_admin("no RBAC policy matched");
        let findings = AdminGateProbe
            .check(&inspector, &MockExecutor::new())
            .await
            .unwrap();
        assert_eq!(findings[0].severity, Severity::Fatal);
        assert_eq!(findings[0].detail("reason"), Some("no RBAC policy matched"));
    }

    #[tokio::test]
    async fn test_review_failure_is_error() {
        let inspector = MockInspector::new().failing(InspectorCall::AccessReview);
        let result = AdminGateProbe.run(&inspector, &MockExecutor::new()).await;
        assert!(result.is_failed());
        assert!(result.findings.is_empty());
    }
}
