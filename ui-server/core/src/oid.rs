use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The canonical, opaque identity of a cluster object.
///
/// Equality is string equality. An empty namespace denotes a cluster-scoped object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(String);

/// The structured form of an [`Oid`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub group: String,
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKind {
    #[serde(default)]
    pub group: String,
    pub kind: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid object id {oid:?}: expected field {field}")]
    MissingField { oid: String, field: &'static str },

    #[error("invalid object id {0:?}: unexpected trailing fields")]
    Trailing(String),
}

const FIELDS: [&str; 4] = ["G=", "K=", "NS=", "N="];

// === impl Oid ===

impl Oid {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(&self) -> Result<ObjectId, ParseError> {
        self.0.parse()
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Oid {
    type Err = ParseError;

    /// Validates `s` and returns it in canonical form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<ObjectId>().map(|id| id.oid())
    }
}

impl From<&ObjectId> for Oid {
    fn from(id: &ObjectId) -> Self {
        id.oid()
    }
}

// === impl ObjectId ===

impl ObjectId {
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn oid(&self) -> Oid {
        Oid(format!(
            "G={},K={},NS={},N={}",
            self.group, self.kind, self.namespace, self.name
        ))
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(&self.group, &self.kind)
    }

    pub fn namespace(&self) -> Option<&str> {
        if self.namespace.is_empty() {
            None
        } else {
            Some(&self.namespace)
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "G={},K={},NS={},N={}",
            self.group, self.kind, self.namespace, self.name
        )
    }
}

impl FromStr for ObjectId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Kubernetes names may not contain commas, so a plain split is unambiguous.
        let mut parts = s.splitn(4, ',');
        let mut values: [&str; 4] = [""; 4];
        for (i, prefix) in FIELDS.iter().enumerate() {
            let part = parts.next().unwrap_or_default();
            values[i] = part
                .strip_prefix(prefix)
                .ok_or_else(|| ParseError::MissingField {
                    oid: s.to_string(),
                    field: prefix.trim_end_matches('='),
                })?;
        }
        if values[3].contains(',') {
            return Err(ParseError::Trailing(s.to_string()));
        }
        let [group, kind, namespace, name] = values;
        if kind.is_empty() {
            return Err(ParseError::MissingField {
                oid: s.to_string(),
                field: "K",
            });
        }
        if name.is_empty() {
            return Err(ParseError::MissingField {
                oid: s.to_string(),
                field: "N",
            });
        }
        Ok(Self::new(group, kind, namespace, name))
    }
}

// === impl GroupKind ===

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }

    /// Splits an `apiVersion` (`apps/v1`, `v1`) and pairs its group with `kind`.
    pub fn from_api_version(api_version: &str, kind: impl Into<String>) -> Self {
        let group = match api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        };
        Self::new(group, kind)
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_core_object() {
        let id = ObjectId::new("", "Pod", "kube-system", "coredns-1");
        let oid = id.oid();
        assert_eq!(oid.as_str(), "G=,K=Pod,NS=kube-system,N=coredns-1");
        assert_eq!(oid.parse().unwrap(), id);
    }

    #[test]
    fn round_trips() {
        for id in [
            ObjectId::new("apps", "Deployment", "default", "web"),
            ObjectId::new("", "Namespace", "", "default"),
            ObjectId::new("monitoring.coreos.com", "ServiceMonitor", "monitoring", "kps"),
            ObjectId::new("", "ConfigMap", "default", "has=equals"),
        ] {
            let parsed: ObjectId = id.to_string().parse().expect("must parse");
            assert_eq!(parsed, id);
            assert_eq!(parsed.oid(), id.oid());
        }
    }

    #[test]
    fn rejects_malformed() {
        for s in [
            "",
            "K=Pod,G=,NS=default,N=foo",
            "G=,K=Pod,NS=default",
            "G=,K=,NS=default,N=foo",
            "G=,K=Pod,NS=default,N=",
            "G=,K=Pod,NS=default,N=a,b",
        ] {
            assert!(s.parse::<ObjectId>().is_err(), "{s:?} must not parse");
        }
    }

    #[test]
    fn cluster_scoped_has_no_namespace() {
        let id: ObjectId = "G=,K=Node,NS=,N=node-0".parse().unwrap();
        assert_eq!(id.namespace(), None);
        assert_eq!(id.group_kind().to_string(), "Node");
    }

    #[test]
    fn group_kind_from_api_version() {
        assert_eq!(
            GroupKind::from_api_version("apps/v1", "Deployment"),
            GroupKind::new("apps", "Deployment")
        );
        assert_eq!(
            GroupKind::from_api_version("v1", "Pod"),
            GroupKind::new("", "Pod")
        );
    }
}
