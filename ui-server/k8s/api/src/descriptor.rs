//! Declarative resource descriptors.
//!
//! A descriptor names a resource type and lists the connection rules from which the object
//! graph's edges are computed, plus the exec shortcuts that the UI offers for the type.

use crate::labels::Selector;
use serde::{Deserialize, Serialize};
use ui_server_core::{EdgeLabel, GroupKind, ResourceId};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    #[serde(default)]
    pub metadata: DocumentMeta,
    pub spec: ResourceDescriptorSpec,
}

/// The subset of object metadata carried by descriptor documents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DocumentMeta {
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptorSpec {
    pub resource: ResourceId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<ResourceConnection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exec: Vec<ExecDefinition>,
}

/// A rule connecting objects of the described type to objects of `target`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConnection {
    pub target: TargetRef,
    #[serde(default)]
    pub labels: Vec<EdgeLabel>,
    #[serde(default)]
    pub level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<NamespaceRule>,
    #[serde(flatten)]
    pub spec: ConnectionSpec,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub api_version: String,
    pub kind: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ConnectionSpec {
    MatchSelector(SelectorConnection),
    MatchName(NameConnection),
    OwnedBy,
    MatchRef(RefConnection),
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorConnection {
    /// A literal selector. Keys and values may contain `{.path}` templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,

    /// Locates an embedded label selector in the object holding the selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_path: Option<String>,

    /// Locates the labels matched against the selector. Defaults to `metadata.labels`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_label_path: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameConnection {
    #[serde(default)]
    pub name_template: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefConnection {
    /// JSONPath templates, or JMESPath expressions prefixed with `jmes:`.
    #[serde(default)]
    pub references: Vec<String>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Level {
    Owner,
    Controller,
    #[default]
    Any,
}

/// Selects the namespaces searched for targets.
///
/// At most one field is expected; with none set the source's namespace is used.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<Selector>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub any: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NamespaceMode<'a> {
    SameAsSource,
    Path(&'a str),
    LabelSelector(&'a Selector),
    Any,
}

/// An exec shortcut offered for objects of a type.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecDefinition {
    pub alias: String,
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<Requirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

/// Gates an exec shortcut or a dashboard on a template and/or a graph traversal.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<ResourceLocator>,
}

/// Locates objects of kind `target` starting from a source object.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLocator {
    #[serde(rename = "ref")]
    pub target: GroupKind,
    pub query: LocatorQuery,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_label: Option<EdgeLabel>,
    /// A GraphQL document with a `$src` variable. Objects collected under `refs` are the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

// === impl ResourceConnection ===

impl ResourceConnection {
    pub fn target_group_kind(&self) -> GroupKind {
        GroupKind::from_api_version(&self.target.api_version, &self.target.kind)
    }

    pub fn namespace_mode(&self) -> NamespaceMode<'_> {
        match &self.namespace {
            None => NamespaceMode::SameAsSource,
            Some(rule) => rule.mode(),
        }
    }
}

impl ConnectionSpec {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::MatchSelector(_) => "MatchSelector",
            Self::MatchName(_) => "MatchName",
            Self::OwnedBy => "OwnedBy",
            Self::MatchRef(_) => "MatchRef",
        }
    }
}

impl NamespaceRule {
    pub fn mode(&self) -> NamespaceMode<'_> {
        if self.any {
            NamespaceMode::Any
        } else if let Some(sel) = &self.label_selector {
            NamespaceMode::LabelSelector(sel)
        } else if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
            NamespaceMode::Path(path)
        } else {
            NamespaceMode::SameAsSource
        }
    }
}

impl TargetRef {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }
}
