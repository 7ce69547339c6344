//! Typed views over the OpenShift objects the probes read.
//!
//! Only the fields the probes consume are modelled; everything else in the
//! object is ignored on decode.

use kube::discovery::ApiResource;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ObjectName {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusCondition {
    pub fn new(type_: &str, status: &str) -> Self {
        Self {
            type_: type_.to_string(),
            status: status.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ConditionedStatus {
    #[serde(default)]
    pub conditions: Vec<StatusCondition>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ClusterOperator {
    pub metadata: ObjectName,
    #[serde(default)]
    pub status: ConditionedStatus,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolStatus {
    #[serde(default)]
    pub conditions: Vec<StatusCondition>,
    #[serde(default)]
    pub machine_count: i64,
    #[serde(default)]
    pub ready_machine_count: i64,
    #[serde(default)]
    pub updated_machine_count: i64,
    #[serde(default)]
    pub degraded_machine_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MachineConfigPool {
    pub metadata: ObjectName,
    #[serde(default)]
    pub status: MachineConfigPoolStatus,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersionSpec {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(rename = "clusterID", default)]
    pub cluster_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Release {
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ClusterVersionStatus {
    #[serde(default)]
    pub desired: Release,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ClusterVersion {
    pub metadata: ObjectName,
    #[serde(default)]
    pub spec: ClusterVersionSpec,
    #[serde(default)]
    pub status: ClusterVersionStatus,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RouteSpec {
    #[serde(default)]
    pub host: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Route {
    pub metadata: ObjectName,
    #[serde(default)]
    pub spec: RouteSpec,
}

fn api_resource(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    ApiResource {
        group: group.to_string(),
        version: version.to_string(),
        api_version: format!("{}/{}", group, version),
        kind: kind.to_string(),
        plural: plural.to_string(),
    }
}

pub fn cluster_operator_api() -> ApiResource {
    api_resource("config.openshift.io", "v1", "ClusterOperator", "clusteroperators")
}

pub fn cluster_version_api() -> ApiResource {
    api_resource("config.openshift.io", "v1", "ClusterVersion", "clusterversions")
}

pub fn machine_config_pool_api() -> ApiResource {
    api_resource(
        "machineconfiguration.openshift.io",
        "v1",
        "MachineConfigPool",
        "machineconfigpools",
    )
}

pub fn route_api() -> ApiResource {
    api_resource("route.openshift.io", "v1", "Route", "routes")
}
