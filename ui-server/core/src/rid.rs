use crate::GroupKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether instances of a resource type live inside a namespace.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    Cluster,
    #[default]
    Namespaced,
}

/// Describes a served resource type: its group/version, plural name, kind and scope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub scope: Scope,
}

impl ResourceId {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
        scope: Scope,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            name: name.into(),
            kind: kind.into(),
            scope,
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(&self.group, &self.kind)
    }

    pub fn is_namespaced(&self) -> bool {
        self.scope == Scope::Namespaced
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}.{}", self.name, self.version)
        } else {
            write!(f, "{}.{}.{}", self.name, self.version, self.group)
        }
    }
}
