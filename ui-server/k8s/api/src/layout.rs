//! Page layouts, block definitions and dashboards.

use crate::descriptor::{DocumentMeta, Requirement, ResourceLocator};
use serde::{Deserialize, Serialize};
use ui_server_core::ResourceId;

/// Describes how the UI lays out a resource's page.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLayout {
    #[serde(default)]
    pub metadata: DocumentMeta,
    pub spec: ResourceLayoutSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLayoutSpec {
    pub resource: ResourceId,
    #[serde(default)]
    pub default_layout: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<PageBlockLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_bar: Option<PageBlockLayout>,
    #[serde(default)]
    pub pages: Vec<PageLayout>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLayout {
    pub name: String,
    #[serde(default)]
    pub sections: Vec<SectionLayout>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionLayout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub blocks: Vec<PageBlockLayout>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum BlockKind {
    /// A table over the source object itself.
    #[default]
    #[serde(rename = "Self")]
    Self_,
    /// A table over an array field of the source object.
    SubTable,
    /// A table over objects located from the source.
    Connection,
    /// A reference to a named `ResourceBlockDefinition`.
    Block,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBlockLayout {
    #[serde(default)]
    pub kind: BlockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<ResourceLocator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<TableDefinition>,
}

/// A reusable group of blocks referenced by name from layouts.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBlockDefinition {
    #[serde(default)]
    pub metadata: DocumentMeta,
    pub spec: ResourceBlockDefinitionSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBlockDefinitionSpec {
    #[serde(default)]
    pub blocks: Vec<PageBlockLayout>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(default = "ColumnDefinition::default_type", rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub format: String,
    /// A template rendered against the row's object to produce the cell.
    pub path_template: String,
    #[serde(default)]
    pub priority: i32,
}

impl ColumnDefinition {
    fn default_type() -> String {
        "string".to_string()
    }
}

// === Rendered views ===

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceView {
    pub resource: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<PageBlockView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_bar: Option<PageBlockView>,
    #[serde(default)]
    pub pages: Vec<PageView>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub name: String,
    #[serde(default)]
    pub sections: Vec<SectionView>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub blocks: Vec<PageBlockView>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBlockView {
    pub kind: BlockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceId>,
    /// Set when the block's target type is not served by the cluster.
    #[serde(default)]
    pub missing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Table>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<serde_json::Value>,
}

/// A tabular rendering, shaped like `meta.k8s.io/v1` `Table`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub column_definitions: Vec<TableColumn>,
    pub rows: Vec<TableRow>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub cells: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,
}

// === Dashboards ===

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDashboard {
    #[serde(default)]
    pub metadata: DocumentMeta,
    pub spec: ResourceDashboardSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDashboardSpec {
    pub resource: ResourceId,
    #[serde(default)]
    pub dashboards: Vec<Dashboard>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub vars: Vec<DashboardVar>,
    #[serde(default)]
    pub panels: Vec<String>,
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub requirement: Option<Requirement>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardVar {
    pub name: String,
    /// A template rendered against the source object.
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub panels: Vec<PanelView>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelView {
    pub title: String,
    pub url: String,
}

impl Table {
    pub fn columns(defs: &[ColumnDefinition]) -> Vec<TableColumn> {
        defs.iter()
            .map(|c| TableColumn {
                name: c.name.clone(),
                type_: c.type_.clone(),
                format: c.format.clone(),
                description: String::new(),
                priority: c.priority,
            })
            .collect()
    }
}
