use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::Probe;
use crate::error::ProbeError;
use crate::executor::RemoteExecutor;
use crate::inspector::ClusterInspector;
use crate::parsing::{parse_channel, Channel};
use crate::types::{Finding, Severity};

pub const NAME: &str = "version";

/// Upper bound on channel lookups in one search; every minor release of a
/// major lies within it.
pub const MAX_CHANNEL_LOOKUPS: u32 = 98;

/// A cluster this many minor releases behind is at risk of losing support.
pub const LAG_WARNING_MINORS: u32 = 3;

#[derive(Debug, Deserialize)]
struct GraphResponse {
    #[serde(default)]
    nodes: Vec<serde_json::Value>,
}

/// Progress of one channel search.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelProbeState<'a> {
    pub current: Channel<'a>,
    pub candidate: Channel<'a>,
    pub last_with_nodes: Option<Channel<'a>>,
}

impl<'a> ChannelProbeState<'a> {
    pub fn new(current: Channel<'a>) -> Self {
        Self {
            current,
            candidate: current,
            last_with_nodes: None,
        }
    }

    /// Newest channel known to exist; the current one when nothing newer was found.
    pub fn latest(&self) -> Channel<'a> {
        self.last_with_nodes.unwrap_or(self.current)
    }
}

/// Graph query URL for a channel, appended to whatever query the base URL carries.
pub fn channel_url(graph_url: &str, channel: &Channel<'_>) -> String {
    let separator = if graph_url.contains('?') { '&' } else { '?' };
    format!("{}{}channel={}", graph_url, separator, channel)
}

async fn channel_exists(
    executor: &dyn RemoteExecutor,
    graph_url: &str,
    channel: &Channel<'_>,
) -> Result<bool, ProbeError> {
    let body = executor.http_get(&channel_url(graph_url, channel), None).await?;
    let graph: GraphResponse = serde_json::from_str(&body)
        .map_err(|e| ProbeError::decode(format!("upgrade graph for {}", channel), e))?;
    Ok(!graph.nodes.is_empty())
}

/// Walk minor releases upward from `current` until the graph reports a
/// channel without nodes. Any failed lookup aborts the search, since it
/// cannot be read as "channel absent".
pub async fn find_latest_channel<'a>(
    executor: &dyn RemoteExecutor,
    graph_url: &str,
    current: Channel<'a>,
) -> Result<ChannelProbeState<'a>, ProbeError> {
    let mut state = ChannelProbeState::new(current);
    for step in 1..=MAX_CHANNEL_LOOKUPS {
        state.candidate = current.ahead(step)?;
        if !channel_exists(executor, graph_url, &state.candidate).await? {
            debug!("{} has no releases, search stops", state.candidate);
            return Ok(state);
        }
        state.last_with_nodes = Some(state.candidate);
    }
    Err(ProbeError::ChannelSearchExhausted {
        from: current.to_string(),
        queries: MAX_CHANNEL_LOOKUPS,
    })
}

/// How far the cluster's channel trails the newest one in its family.
pub struct VersionLagProbe {
    graph_url: String,
}

impl VersionLagProbe {
    pub fn new(graph_url: impl Into<String>) -> Self {
        Self {
            graph_url: graph_url.into(),
        }
    }
}

#[async_trait]
impl Probe for VersionLagProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn check(
        &self,
        inspector: &dyn ClusterInspector,
        executor: &dyn RemoteExecutor,
    ) -> Result<Vec<Finding>, ProbeError> {
        let version = inspector.get_cluster_version().await?;
        let raw = version
            .spec
            .channel
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProbeError::Missing("clusterversion spec.channel".to_string()))?;
        let current = parse_channel(raw)?;

        let state = find_latest_channel(executor, &self.graph_url, current).await?;
        let latest = state.latest();
        let behind = latest.minor - current.minor;
        info!("cluster channel {} trails {} by {} minor(s)", current, latest, behind);

        let desired = &version.status.desired.version;
        let (severity, message) = if behind >= LAG_WARNING_MINORS {
            (
                Severity::Warning,
                format!(
                    "version {} is more than 2 minor releases behind {} and may be near end of life",
                    desired,
                    latest.release()
                ),
            )
        } else {
            (
                Severity::Ok,
                format!(
                    "version {} is within 2 minor releases of {}",
                    desired,
                    latest.release()
                ),
            )
        };
        let subject = if version.spec.cluster_id.is_empty() {
            version.metadata.name.clone()
        } else {
            version.spec.cluster_id.clone()
        };
        Ok(vec![Finding::new(NAME, subject, severity, message)
            .with_detail("clusterID", version.spec.cluster_id.clone())
            .with_detail("version", desired.clone())
            .with_detail("currentChannel", current.to_string())
            .with_detail("latestChannel", latest.to_string())
            .with_detail("lag", format!("{:.2}", f64::from(behind) / 100.0))
            .with_detail("minorsBehind", behind.to_string())])
    }
}
