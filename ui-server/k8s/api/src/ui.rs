//! Projections of live workloads served under the `core` virtual group.

use crate::meta::ObjectRef;
use k8s_openapi::apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::ObjectMeta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ui_server_core::{ObjectId, ResourceId};

pub type ResourceList = BTreeMap<String, Quantity>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTotals {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: ResourceList,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: ResourceList,
}

/// Computed readiness of an object, in kstatus terms.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericResourceStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericResource {
    pub metadata: ObjectMeta,
    pub spec: GenericResourceSpec,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub status: serde_json::Value,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericResourceSpec {
    pub cluster: ClusterMetadata,
    pub api_type: ResourceId,
    pub name: String,
    pub replicas: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub role_replicas: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,
    pub total_resource: ResourceTotals,
    pub app_resource: ResourceTotals,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub role_resource_limits: BTreeMap<String, ResourceList>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub role_resource_requests: BTreeMap<String, ResourceList>,
    pub status: GenericResourceStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseMetadata>,
}

/// The Helm release an object was installed by, from its standard labels and annotations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub chart: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericResourceService {
    pub metadata: ObjectMeta,
    pub spec: GenericResourceServiceSpec,
    pub status: GenericResourceStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericResourceServiceSpec {
    pub cluster: ClusterMetadata,
    pub api_type: ResourceId,
    pub name: String,
    pub facilities: ServiceFacilities,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceFacilities {
    pub exposed: ServiceFacility,
    pub tls: ServiceFacility,
    pub backup: ServiceFacility,
    pub monitoring: ServiceFacility,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exec: Vec<ExecFacility>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum FacilityUsage {
    Used,
    Unused,
    #[default]
    Unknown,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceFacility {
    pub usage: FacilityUsage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<ObjectId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecFacility {
    pub alias: String,
    pub resource: ResourceId,
    #[serde(rename = "ref")]
    pub reference: ObjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    pub kubectl_command: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary {
    pub metadata: ObjectMeta,
    pub spec: ResourceSummarySpec,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummarySpec {
    pub cluster: ClusterMetadata,
    pub api_type: ResourceId,
    pub count: i64,
    pub total_resource: ResourceTotals,
    pub app_resource: ResourceTotals,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodView {
    pub metadata: ObjectMeta,
    pub spec: PodViewSpec,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub status: serde_json::Value,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodViewSpec {
    pub resources: PodResources,
    #[serde(default)]
    pub containers: Vec<ContainerView>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodResources {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: ResourceList,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: ResourceList,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub usage: ResourceList,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerView {
    pub name: String,
    #[serde(default)]
    pub image: String,
    pub resources: PodResources,
}
