//! Request/response resources served under the `meta` virtual group.

use crate::{
    descriptor::ResourceLocator,
    layout::{DashboardView, PageView, ResourceView},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use ui_server_core::{EdgeLabel, ObjectId, ResourceId};

/// Points at one live object by resource type and name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectLocator {
    pub resource: ResourceId,
    #[serde(rename = "ref")]
    pub reference: ObjectRef,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Render {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RenderRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<RenderResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub source: ObjectLocator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_name: Option<String>,
    #[serde(default = "default_true")]
    pub convert_to_table: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<ResourceView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageView>,
}

/// Renders a single page of a resource's layout.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPage {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RenderRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<PageView>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderDashboard {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RenderDashboardRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<RenderDashboardResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderDashboardRequest {
    pub source: ObjectLocator,
    /// Restricts the response to the dashboard with this title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderDashboardResponse {
    pub dashboards: Vec<DashboardView>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRawGraph {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RenderRawGraphRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<RawGraph>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRawGraphRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ObjectLocator>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGraph {
    pub nodes: Vec<ObjectId>,
    pub edges: Vec<RawEdge>,
}

/// An undirected edge between two entries of [`RawGraph::nodes`].
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEdge {
    pub src: usize,
    pub dst: usize,
    pub labels: Vec<EdgeLabel>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuery {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ResourceQueryRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQueryRequest {
    pub source: ObjectLocator,
    pub target: ResourceLocator,
    #[serde(default = "ResourceQueryRequest::default_format")]
    pub output_format: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Ref,
    Object,
    Table,
}

impl ResourceQueryRequest {
    fn default_format() -> String {
        "Ref".to_string()
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Ref" => Ok(Self::Ref),
            "Object" => Ok(Self::Object),
            "Table" => Ok(Self::Table),
            other => Err(format!("unknown output format {other:?}")),
        }
    }
}

fn default_true() -> bool {
    true
}
