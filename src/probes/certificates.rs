use async_trait::async_trait;

use super::base::{object_name, TRUE};
use super::Probe;
use crate::error::ProbeError;
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::types::{Finding, Severity};

pub const NAME: &str = "certificate-requests";

/// Certificate signing requests that were never approved.
pub struct CertificateRequestProbe;

#[async_trait]
impl Probe for CertificateRequestProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn check(
        &self,
        inspector: &dyn ClusterInspector,
        _executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError> {
        let csrs = inspector.list_certificate_signing_requests().await?;
        let mut findings = Vec::new();
        for csr in &csrs {
            let conditions = csr
                .status
                .as_ref()
                .and_then(|s| s.conditions.clone())
                .unwrap_or_default();
            let approved = conditions
                .iter()
                .any(|c| c.type_ == "Approved" && c.status == TRUE);
            if approved {
                continue;
            }
            let message = if conditions.is_empty() {
                "request is pending"
            } else {
                "request is not approved"
            };
            let state = conditions
                .iter()
                .map(|c| format!("{}={}", c.type_, c.status))
                .collect::<Vec<_>>()
                .join(", ");
            findings.push(
                Finding::new(NAME, object_name(&csr.metadata), Severity::Warning, message)
                    .with_detail("signer", csr.spec.signer_name.clone())
                    .with_detail("conditions", if state.is_empty() { "none".to_string() } else { state }),
            );
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use crate::inspector::MockInspector;
    use k8s_openapi::api::certificates::v1::{
        CertificateSigningRequest, CertificateSigningRequestCondition,
        CertificateSigningRequestStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn csr(name: &str, conditions: Option<Vec<(&str, &str)>>) -> CertificateSigningRequest {
        CertificateSigningRequest {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(CertificateSigningRequestStatus {
                conditions: conditions.map(|cs| {
                    cs.into_iter()
                        .map(|(t, s)| CertificateSigningRequestCondition {
                            type_: t.to_string(),
                            status: s.to_string(),
                            ..Default::default()
                        })
                        .collect()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unapproved_requests() {
        let inspector = MockInspector::new()
            .with_csr(csr("csr-approved", Some(vec![("Approved", "True")])))
            .with_csr(csr("csr-pending", None))
            .with_csr(csr("csr-denied", Some(vec![("Denied", "True")])));
        let findings = CertificateRequestProbe
            .check(&inspector, &MockExecutor::new())
            .await
            .unwrap();
        let subjects: Vec<&str> = findings.iter().map(|f| f.subject.as_str()).collect();
        assert_eq!(subjects, vec!["csr-pending", "csr-denied"]);
        assert_eq!(findings[0].message, "request is pending");
        assert_eq!(findings[0].detail("conditions"), Some("none"));
        assert_eq!(findings[1].detail("conditions"), Some("Denied=True"));
    }
}
