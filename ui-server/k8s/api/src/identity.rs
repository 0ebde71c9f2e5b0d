use k8s_openapi::{
    api::authorization::v1::{NonResourceAttributes, ResourceAttributes},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use crate::ui::ResourceList;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Echoes the authenticated caller.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmI {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<WhoAmIResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmIResponse {
    pub user: UserInfo,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIdentity {
    pub metadata: ObjectMeta,
    pub status: ClusterIdentityStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIdentityStatus {
    /// The UID of the `kube-system` namespace.
    pub uid: String,
    pub name: String,
}

/// Describes the product and the cluster it is installed in.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteInfo {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub product: ProductInfo,
    #[serde(default)]
    pub kubernetes: KubernetesInfo,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInfo {
    pub product_name: String,
    pub product_version: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesInfo {
    pub cluster: ClusterIdentityStatus,
    /// Distinct kubelet versions across nodes, in ascending order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kubelet_versions: Vec<String>,
    pub node_stats: NodeStats,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub count: u64,
    #[serde(default)]
    pub capacity: ResourceList,
    #[serde(default)]
    pub allocatable: ResourceList,
}

/// Asks in which namespaces the caller holds every listed permission.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfSubjectNamespaceAccessReview {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: NamespaceAccessReviewSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NamespaceAccessReviewStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceAccessReviewSpec {
    #[serde(default)]
    pub resource_attributes: Vec<ResourceAttributes>,
    #[serde(default)]
    pub non_resource_attributes: Vec<NonResourceAttributes>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceAccessReviewStatus {
    #[serde(default)]
    pub namespaces: Vec<String>,
    /// Allowed namespaces grouped by Rancher project, when the cluster is Rancher-managed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub projects: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxTokenRequest {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<InboxTokenResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxTokenResponse {
    pub agent_jwt_token: String,
    pub admin_jwt_token: String,
}
