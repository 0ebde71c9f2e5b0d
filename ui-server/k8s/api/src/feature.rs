//! Feature and FeatureSet resources, plus the external kinds their status is derived from.

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FEATURE_SET_LABEL: &str = "app.kubernetes.io/part-of";
pub const FEATURE_LABEL: &str = "app.kubernetes.io/component";

/// A deployable capability of the cluster.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "ui.k8s.appscode.com",
    version = "v1alpha1",
    kind = "Feature",
    status = "FeatureStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSpec {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub feature_set: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub feature_block: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub requirements: Requirements,
    #[serde(default)]
    pub readiness_checks: ReadinessChecks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartInfo>,
}

/// Preconditions for a feature to count as enabled.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    /// Features of the same set that must be enabled before this one can be ready.
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessChecks {
    /// Resource types that must be registered.
    #[serde(default)]
    pub resources: Vec<GroupVersionKind>,
    /// Workloads that must be present and ready.
    #[serde(default)]
    pub workloads: Vec<WorkloadInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadInfo {
    #[serde(flatten)]
    pub gvk: GroupVersionKind,
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

/// A named group of features installed together.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "ui.k8s.appscode.com",
    version = "v1alpha1",
    kind = "FeatureSet",
    status = "FeatureSetStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSetSpec {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub required_features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSetStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
    #[serde(default)]
    pub features: Vec<ComponentStatus>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
}

/// A cluster-scoped key/value fact published for fleet managers.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "cluster.open-cluster-management.io",
    version = "v1alpha1",
    kind = "ClusterClaim",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterClaimSpec {
    #[serde(default)]
    pub value: String,
}

/// The YAML payload of the `features` cluster claim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureClaim {
    pub enabled_features: Vec<String>,
    pub externally_managed_features: Vec<String>,
    pub disabled_features: Vec<String>,
}

pub const FEATURES_CLAIM: &str = "features";

impl GroupVersionKind {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }
}

impl std::fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}
