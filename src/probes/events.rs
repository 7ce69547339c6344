use async_trait::async_trait;

use super::Probe;
use crate::error::ProbeError;
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::parsing::truncate_message;
use crate::types::{Finding, Severity};

pub const NAME: &str = "events";
pub const MESSAGE_DISPLAY_CHARS: usize = 80;

/// Every event of type Warning across all namespaces.
pub struct EventProbe;

#[async_trait]
impl Probe for EventProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn check(
        &self,
        inspector: &dyn ClusterInspector,
        _executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError> {
        let events = inspector.list_events().await?;
        Ok(events
            .iter()
            .filter(|e| e.type_.as_deref() == Some("Warning"))
            .map(|e| {
                let object = &e.involved_object;
                let kind = object.kind.clone().unwrap_or_default();
                let name = object.name.clone().unwrap_or_default();
                let namespace = object
                    .namespace
                    .clone()
                    .or_else(|| e.metadata.namespace.clone())
                    .unwrap_or_default();
                let message = e.message.clone().unwrap_or_default();
                Finding::new(
                    NAME,
                    format!("{}/{}", kind, name),
                    Severity::Warning,
                    truncate_message(message.trim(), MESSAGE_DISPLAY_CHARS),
                )
                .with_detail("namespace", namespace)
                .with_detail("kind", kind)
                .with_detail("name", name)
                .with_detail("reason", e.reason.clone().unwrap_or_default())
                .with_detail("message", message)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use crate::inspector::MockInspector;
    use k8s_openapi::api::core::v1::{Event, ObjectReference};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn event(type_: &str, message: &str) -> Event {
        Event {
            metadata: ObjectMeta {
                name: Some("web-0.17a".to_string()),
                namespace: Some("shop".to_string()),
                ..Default::default()
            },
            type_: Some(type_.to_string()),
            reason: Some("BackOff".to_string()),
            message: Some(message.to_string()),
            involved_object: ObjectReference {
                kind: Some("Pod".to_string()),
                name: Some("web-0".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_warning_events_only() {
        let long = "Back-off restarting failed container app in pod web-0_shop(1234) because the image could not be pulled";
        let inspector = MockInspector::new()
            .with_event(event("Normal", "Pulled image"))
            .with_event(event("Warning", long));
        let findings = EventProbe.check(&inspector, &MockExecutor::new()).await.unwrap();

        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.subject, "Pod/web-0");
        assert_eq!(finding.message.chars().count(), MESSAGE_DISPLAY_CHARS + 3);
        assert!(finding.message.ends_with("..."));
        assert_eq!(finding.detail("message"), Some(long));
        assert_eq!(finding.detail("namespace"), Some("shop"));
        assert_eq!(finding.detail("reason"), Some("BackOff"));
    }
}
