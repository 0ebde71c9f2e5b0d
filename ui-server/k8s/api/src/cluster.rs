use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ClusterStatusResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatusResponse {
    pub phase: ClusterPhase,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_managers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_api: Option<CapiClusterInfo>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum ClusterPhase {
    Active,
    #[default]
    NotReady,
    Inactive,
}

pub mod reason {
    pub const FLUX_NOT_INSTALLED: &str = "FluxNotInstalled";
    pub const FLUX_NOT_READY: &str = "FluxNotReady";
    pub const FEATURE_SET_NOT_READY: &str = "RequiredFeatureSetNotReady";
    pub const FEATURE_SETS_NOT_INSTALLED: &str = "FeatureSetsNotInstalled";
}

/// The Cluster API cluster that manages this cluster, when one is visible.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapiClusterInfo {
    pub provider: String,
    pub namespace: String,
    pub cluster_name: String,
}
