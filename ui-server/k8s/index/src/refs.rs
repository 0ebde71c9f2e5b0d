//! Object references extracted from a source object by `MatchRef` rules.

use crate::jsonpath;
use serde_json::Value;
use ui_server_core::GroupKind;

const JMES_PREFIX: &str = "jmes:";

/// A reference row: `name[, namespace[, kind[, apiGroup]]]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceRef {
    pub name: String,
    pub namespace: Option<String>,
    pub kind: Option<String>,
    pub group: Option<String>,
}

impl ResourceRef {
    /// Whether the row's kind and group, where given, agree with `gk`.
    pub fn refers_to(&self, gk: &GroupKind) -> bool {
        self.kind.as_deref().map_or(true, |k| k == gk.kind)
            && self.group.as_deref().map_or(true, |g| g == gk.group)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    JsonPath(#[from] jsonpath::Error),

    #[error("invalid jmespath expression: {0}")]
    Jmes(String),
}

/// Evaluates a reference expression against `data`.
///
/// Expressions prefixed with `jmes:` are JMESPath; anything else is a JSONPath template.
pub fn extract(expr: &str, data: &Value) -> Result<Vec<ResourceRef>, Error> {
    match expr.trim().strip_prefix(JMES_PREFIX) {
        Some(jmes) => {
            let value = search_jmes(jmes.trim(), data)?;
            Ok(refs_from_value(&value))
        }
        None => {
            let text = jsonpath::render(expr, data)?;
            Ok(parse_resource_refs(&text))
        }
    }
}

fn search_jmes(expr: &str, data: &Value) -> Result<Value, Error> {
    let compiled = jmespath::compile(expr).map_err(|e| Error::Jmes(e.to_string()))?;
    let found = compiled
        .search(data.clone())
        .map_err(|e| Error::Jmes(e.to_string()))?;
    serde_json::to_value(&*found).map_err(|e| Error::Jmes(e.to_string()))
}

fn refs_from_value(value: &Value) -> Vec<ResourceRef> {
    match value {
        Value::Null => vec![],
        Value::String(s) => parse_resource_refs(s),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => row(&[s.as_str()]),
                Value::Array(cols) => {
                    let cols = cols.iter().map(cell).collect::<Vec<_>>();
                    row(&cols.iter().map(String::as_str).collect::<Vec<_>>())
                }
                Value::Object(obj) => {
                    let field = |k: &str| obj.get(k).map(cell).filter(|s| !s.is_empty());
                    Some(ResourceRef {
                        name: field("name")?,
                        namespace: field("namespace"),
                        kind: field("kind"),
                        group: field("apiGroup"),
                    })
                }
                _ => None,
            })
            .collect(),
        other => parse_resource_refs(&cell(other)),
    }
}

fn cell(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parses rendered reference text into rows.
///
/// Each line holds either comma-separated columns or whitespace-separated names. Rows without a
/// name are dropped, as are rows with three or more columns and no kind.
pub fn parse_resource_refs(text: &str) -> Vec<ResourceRef> {
    let mut refs = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.contains(',') {
            let cols = line.split(',').map(str::trim).collect::<Vec<_>>();
            refs.extend(row(&cols));
        } else {
            refs.extend(line.split_whitespace().filter_map(|n| row(&[n])));
        }
    }
    refs
}

fn row(cols: &[&str]) -> Option<ResourceRef> {
    let non_empty = |s: &&str| !s.is_empty();
    let name = cols.first().copied().filter(non_empty)?;
    if cols.len() > 4 {
        return None;
    }
    let get = |i: usize| cols.get(i).copied().filter(non_empty).map(str::to_string);
    let kind = get(2);
    if cols.len() >= 3 && kind.is_none() {
        return None;
    }
    Some(ResourceRef {
        name: name.to_string(),
        namespace: get(1),
        kind,
        group: get(3),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn r(name: &str, ns: Option<&str>, kind: Option<&str>, group: Option<&str>) -> ResourceRef {
        ResourceRef {
            name: name.into(),
            namespace: ns.map(Into::into),
            kind: kind.map(Into::into),
            group: group.map(Into::into),
        }
    }

    #[test]
    fn parses_rows_in_order() {
        let text = "a\nb,ns1\n,ns2\nc,ns3,Secret\nd,ns4,,\ne,ns5,Pod,\nf,ns6,Issuer,cert-manager.io\n";
        assert_eq!(
            parse_resource_refs(text),
            vec![
                r("a", None, None, None),
                r("b", Some("ns1"), None, None),
                r("c", Some("ns3"), Some("Secret"), None),
                r("e", Some("ns5"), Some("Pod"), None),
                r("f", Some("ns6"), Some("Issuer"), Some("cert-manager.io")),
            ]
        );
    }

    #[test]
    fn splits_space_separated_names() {
        assert_eq!(
            parse_resource_refs("tls creds"),
            vec![r("tls", None, None, None), r("creds", None, None, None)]
        );
        assert!(parse_resource_refs("").is_empty());
    }

    #[test]
    fn extracts_with_jsonpath() {
        let data = json!({"spec": {"issuerRef": {"name": "ca", "kind": "ClusterIssuer"}}});
        assert_eq!(
            extract("{.spec.issuerRef.name},,{.spec.issuerRef.kind}", &data).unwrap(),
            vec![r("ca", None, Some("ClusterIssuer"), None)]
        );
    }

    #[test]
    fn extracts_with_jmespath() {
        let data = json!({
            "spec": {"containers": [
                {"envFrom": [{"secretRef": {"name": "s1"}}]},
                {"envFrom": [{"secretRef": {"name": "s2"}}, {"configMapRef": {"name": "c"}}]},
            ]}
        });
        assert_eq!(
            extract("jmes: spec.containers[].envFrom[].secretRef.name", &data).unwrap(),
            vec![r("s1", None, None, None), r("s2", None, None, None)]
        );
        assert_eq!(
            extract(
                "jmes: spec.containers[].envFrom[].configMapRef.{name: name, namespace: 'x'}",
                &data
            )
            .unwrap(),
            vec![r("c", Some("x"), None, None)]
        );
        assert!(extract("jmes: [[[", &data).is_err());
    }
}
