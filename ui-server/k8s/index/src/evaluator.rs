use crate::{
    jsonpath, refs,
    rules::{is_default_label_path, Direction, Rule},
    Error, Result, SharedCluster, SharedRegistry,
};
use ahash::AHashSet as HashSet;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{DynamicObject, ResourceExt};
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{trace, warn};
use ui_server_core::{Connections, GroupKind, ObjectId, ResourceId, Scope};
use ui_server_k8s_api::{
    descriptor::{
        ConnectionSpec, Level, NameConnection, NamespaceMode, RefConnection, SelectorConnection,
    },
    labels::Map,
    Selector,
};

/// Computes the objects a source object is connected to under a connection rule.
#[derive(Clone)]
pub struct Evaluator {
    cluster: SharedCluster,
    registry: SharedRegistry,
}

/// The identity of a typed object.
pub fn object_id(obj: &DynamicObject) -> Result<ObjectId> {
    let types = obj
        .types
        .as_ref()
        .ok_or_else(|| Error::InvalidObject(format!("{} has no apiVersion/kind", obj.name_any())))?;
    let gk = GroupKind::from_api_version(&types.api_version, &types.kind);
    Ok(ObjectId::new(
        gk.group,
        gk.kind,
        obj.namespace().unwrap_or_default(),
        obj.name_any(),
    ))
}

/// The object being evaluated, along with its JSON form for path lookups.
struct Source<'a> {
    obj: &'a DynamicObject,
    data: Value,
    namespace: Option<String>,
}

// === impl Evaluator ===

impl Evaluator {
    pub fn new(cluster: SharedCluster, registry: SharedRegistry) -> Self {
        Self { cluster, registry }
    }

    pub fn cluster(&self) -> &SharedCluster {
        &self.cluster
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Evaluates `rules` for `src`, grouping the connected objects by edge label.
    ///
    /// Rules whose other side is absent contribute nothing. Malformed rules are logged and
    /// skipped; only upstream failures are returned.
    pub async fn connections(
        &self,
        src: &DynamicObject,
        rules: &[Arc<Rule>],
    ) -> Result<Connections> {
        let mut conns = Connections::default();
        for rule in rules {
            let targets = match self.evaluate(src, rule).await {
                Ok(targets) => targets,
                Err(error) if error.is_absent() => {
                    trace!(rule = %rule.id, %error);
                    continue;
                }
                Err(error @ (Error::BadRule { .. } | Error::InvalidObject(_))) => {
                    warn!(%error, "skipping connection rule");
                    continue;
                }
                Err(error) => return Err(error),
            };
            for target in &targets {
                let oid = object_id(target)?.oid();
                for label in &rule.connection.labels {
                    conns.entry(*label).or_default().insert(oid.clone());
                }
            }
        }
        Ok(conns)
    }

    /// Returns the objects `src` is connected to under `rule`.
    pub async fn evaluate(&self, src: &DynamicObject, rule: &Rule) -> Result<Vec<DynamicObject>> {
        let other = rule.other();
        let target = self
            .registry
            .read()
            .lookup(&other.api_version, &other.kind)
            .cloned();
        let Some(target) = target else {
            return Ok(vec![]);
        };

        let data = serde_json::to_value(src).map_err(|e| Error::InvalidObject(e.to_string()))?;
        let src = Source {
            obj: src,
            data,
            namespace: src.namespace(),
        };

        let found = match (&rule.connection.spec, rule.direction) {
            (ConnectionSpec::MatchSelector(sel), Direction::Forward) => {
                self.selector_forward(rule, sel, &src, &target).await?
            }
            (ConnectionSpec::MatchSelector(sel), Direction::Reverse) => {
                self.selector_reverse(rule, sel, &src, &target).await?
            }
            (ConnectionSpec::MatchName(name), Direction::Forward) => {
                self.name_forward(rule, name, &src, &target).await?
            }
            (ConnectionSpec::MatchName(name), Direction::Reverse) => {
                self.name_reverse(rule, name, &src, &target).await?
            }
            (ConnectionSpec::OwnedBy, Direction::Forward) => {
                self.owner_forward(rule, &src, &target).await?
            }
            (ConnectionSpec::OwnedBy, Direction::Reverse) => {
                self.owner_reverse(rule, &src, &target).await?
            }
            (ConnectionSpec::MatchRef(refs), Direction::Forward) => {
                self.ref_forward(rule, refs, &src, &target).await?
            }
            (ConnectionSpec::MatchRef(refs), Direction::Reverse) => {
                self.ref_reverse(rule, refs, &src, &target).await?
            }
        };
        Ok(dedup(found))
    }

    // === MatchSelector ===

    async fn selector_forward(
        &self,
        rule: &Rule,
        conn: &SelectorConnection,
        src: &Source<'_>,
        target: &ResourceId,
    ) -> Result<Vec<DynamicObject>> {
        let Some(selector) = holder_selector(rule, conn, &src.data)? else {
            return Ok(vec![]);
        };
        let in_app = conn
            .target_label_path
            .as_deref()
            .is_some_and(|p| !is_default_label_path(p));

        let mut found = Vec::new();
        for ns in self.target_namespaces(rule, src, target).await? {
            if in_app {
                for obj in self.cluster.list(target, ns.as_deref(), None).await? {
                    if selector.matches_map(&labels_at(conn, &to_json(&obj)?)) {
                        found.push(obj);
                    }
                }
            } else {
                found.extend(self.cluster.list(target, ns.as_deref(), Some(&selector)).await?);
            }
        }
        Ok(filter_level(found, rule, src))
    }

    async fn selector_reverse(
        &self,
        rule: &Rule,
        conn: &SelectorConnection,
        src: &Source<'_>,
        target: &ResourceId,
    ) -> Result<Vec<DynamicObject>> {
        let labels = labels_at(conn, &src.data);
        let mut found = Vec::new();
        for (candidate, data) in self.reverse_candidates(rule, src, target).await? {
            match holder_selector(rule, conn, &data)? {
                Some(sel) if sel.matches_map(&labels) => found.push(candidate),
                _ => {}
            }
        }
        Ok(filter_level(found, rule, src))
    }

    // === MatchName ===

    async fn name_forward(
        &self,
        rule: &Rule,
        conn: &NameConnection,
        src: &Source<'_>,
        target: &ResourceId,
    ) -> Result<Vec<DynamicObject>> {
        if conn.name_template.trim().is_empty() {
            return Err(Error::bad_rule(&rule.id, "nameTemplate must not be empty"));
        }
        let name = jsonpath::render(&conn.name_template, &src.data)
            .map_err(|e| Error::bad_rule(&rule.id, e))?;
        if name.is_empty() {
            return Ok(vec![]);
        }

        let mut found = Vec::new();
        for ns in self.target_namespaces(rule, src, target).await? {
            match ns {
                Some(ns) => found.extend(self.cluster.get(target, Some(&ns), &name).await?),
                None if target.is_namespaced() => found.extend(
                    self.cluster
                        .list(target, None, None)
                        .await?
                        .into_iter()
                        .filter(|o| o.name_any() == name),
                ),
                None => found.extend(self.cluster.get(target, None, &name).await?),
            }
        }
        if found.is_empty() {
            return Err(Error::NotFound(format!("{} {name}", target.kind)));
        }
        Ok(filter_level(found, rule, src))
    }

    async fn name_reverse(
        &self,
        rule: &Rule,
        conn: &NameConnection,
        src: &Source<'_>,
        target: &ResourceId,
    ) -> Result<Vec<DynamicObject>> {
        if conn.name_template.trim().is_empty() {
            return Err(Error::bad_rule(&rule.id, "nameTemplate must not be empty"));
        }
        let src_name = src.obj.name_any();
        let candidates = match name_pattern(&conn.name_template) {
            Some(pattern) => {
                let Some(name) = pattern
                    .captures(&src_name)
                    .and_then(|c| c.name("name"))
                    .map(|m| m.as_str().to_string())
                else {
                    return Ok(vec![]);
                };
                let ns = match (&src.namespace, conn_namespace_is_source(rule)) {
                    (Some(ns), true) if target.is_namespaced() => Some(ns.as_str()),
                    _ => None,
                };
                match ns {
                    Some(ns) => {
                        let obj = self.cluster.get(target, Some(ns), &name).await?;
                        obj.into_iter()
                            .map(|o| to_json(&o).map(|d| (o, d)))
                            .collect::<Result<Vec<_>>>()?
                    }
                    None => self
                        .reverse_candidates(rule, src, target)
                        .await?
                        .into_iter()
                        .filter(|(o, _)| o.name_any() == name)
                        .collect(),
                }
            }
            None => self.reverse_candidates(rule, src, target).await?,
        };

        let mut found = Vec::new();
        for (candidate, data) in candidates {
            let rendered = jsonpath::render(&conn.name_template, &data)
                .map_err(|e| Error::bad_rule(&rule.id, e))?;
            if rendered == src_name && self.admits(rule, &data, &candidate, src) {
                found.push(candidate);
            }
        }
        if found.is_empty() {
            return Err(Error::NotFound(format!("{} named by {src_name}", target.kind)));
        }
        Ok(filter_level(found, rule, src))
    }

    // === OwnedBy ===

    async fn owner_forward(
        &self,
        rule: &Rule,
        src: &Source<'_>,
        target: &ResourceId,
    ) -> Result<Vec<DynamicObject>> {
        let want = target.group_kind();
        let mut found = Vec::new();
        for owner in src.obj.owner_references() {
            if GroupKind::from_api_version(&owner.api_version, &owner.kind) != want {
                continue;
            }
            if rule.connection.level == Level::Controller && owner.controller != Some(true) {
                continue;
            }
            let ns = if target.is_namespaced() {
                match src.namespace.as_deref() {
                    Some(ns) => Some(ns),
                    None => continue,
                }
            } else {
                None
            };
            if let Some(obj) = self.cluster.get(target, ns, &owner.name).await? {
                if obj.uid().as_deref() == Some(owner.uid.as_str()) {
                    found.push(obj);
                }
            }
        }
        Ok(found)
    }

    async fn owner_reverse(
        &self,
        rule: &Rule,
        src: &Source<'_>,
        target: &ResourceId,
    ) -> Result<Vec<DynamicObject>> {
        let Some(uid) = src.obj.uid() else {
            return Ok(vec![]);
        };
        let ns = src.namespace.as_deref().filter(|_| target.is_namespaced());
        Ok(self
            .cluster
            .list(target, ns, None)
            .await?
            .into_iter()
            .filter(|o| owned_by(o, &uid, rule.connection.level))
            .collect())
    }

    // === MatchRef ===

    async fn ref_forward(
        &self,
        rule: &Rule,
        conn: &RefConnection,
        src: &Source<'_>,
        target: &ResourceId,
    ) -> Result<Vec<DynamicObject>> {
        let want = target.group_kind();
        let mut found = Vec::new();
        for expr in &conn.references {
            let rows = refs::extract(expr, &src.data).map_err(|e| Error::bad_rule(&rule.id, e))?;
            for row in rows {
                if !row.refers_to(&want) {
                    continue;
                }
                let ns = if target.is_namespaced() {
                    match row.namespace.clone().or_else(|| src.namespace.clone()) {
                        Some(ns) => Some(ns),
                        None => {
                            return Err(Error::bad_rule(
                                &rule.id,
                                format!(
                                    "{} {} is namespaced but the reference has no namespace",
                                    target.kind, row.name
                                ),
                            ))
                        }
                    }
                } else {
                    None
                };
                found.extend(self.cluster.get(target, ns.as_deref(), &row.name).await?);
            }
        }
        Ok(filter_level(found, rule, src))
    }

    async fn ref_reverse(
        &self,
        rule: &Rule,
        conn: &RefConnection,
        src: &Source<'_>,
        target: &ResourceId,
    ) -> Result<Vec<DynamicObject>> {
        let src_id = object_id(src.obj)?;
        let src_gk = src_id.group_kind();
        // References may name any namespace, so every candidate is inspected.
        let mut found = Vec::new();
        for obj in self.cluster.list(target, None, None).await? {
            let data = to_json(&obj)?;
            let obj_ns = obj.namespace();
            let mut points_here = false;
            for expr in &conn.references {
                let rows = refs::extract(expr, &data).map_err(|e| Error::bad_rule(&rule.id, e))?;
                points_here = rows.iter().any(|row| {
                    row.name == src_id.name
                        && row.refers_to(&src_gk)
                        && (src.namespace.is_none()
                            || row.namespace.as_ref().or(obj_ns.as_ref()) == src.namespace.as_ref())
                });
                if points_here {
                    break;
                }
            }
            if points_here {
                found.push(obj);
            }
        }
        Ok(filter_level(found, rule, src))
    }

    // === namespaces ===

    /// The namespaces to search for targets of a forward rule. `None` searches all namespaces.
    async fn target_namespaces(
        &self,
        rule: &Rule,
        src: &Source<'_>,
        target: &ResourceId,
    ) -> Result<Vec<Option<String>>> {
        if !target.is_namespaced() {
            return Ok(vec![None]);
        }
        match rule.connection.namespace_mode() {
            NamespaceMode::SameAsSource => match &src.namespace {
                Some(ns) => Ok(vec![Some(ns.clone())]),
                None => Err(Error::bad_rule(
                    &rule.id,
                    format!("{} is namespaced but the source is cluster-scoped", target.kind),
                )),
            },
            NamespaceMode::Path(path) => {
                let nss = namespaces_at(rule, path, &src.data, src.namespace.as_deref())?;
                if nss.is_empty() {
                    return Err(Error::bad_rule(
                        &rule.id,
                        format!("no namespace found at {path}"),
                    ));
                }
                Ok(nss.into_iter().map(Some).collect())
            }
            NamespaceMode::LabelSelector(sel) => {
                if sel.is_empty() {
                    return Ok(vec![None]);
                }
                let nss = self.cluster.list(&namespaces(), None, Some(sel)).await?;
                Ok(nss.into_iter().map(|ns| Some(ns.name_any())).collect())
            }
            NamespaceMode::Any => Ok(vec![None]),
        }
    }

    /// Lists objects of the described type that may point at `src`, with their JSON forms.
    async fn reverse_candidates(
        &self,
        rule: &Rule,
        src: &Source<'_>,
        target: &ResourceId,
    ) -> Result<Vec<(DynamicObject, Value)>> {
        let ns = match (&src.namespace, rule.connection.namespace_mode()) {
            (Some(ns), NamespaceMode::SameAsSource) if target.is_namespaced() => Some(ns.as_str()),
            (Some(_), NamespaceMode::SameAsSource) => return Ok(vec![]),
            _ => None,
        };
        if let (Some(ns), NamespaceMode::LabelSelector(sel)) =
            (&src.namespace, rule.connection.namespace_mode())
        {
            if !sel.is_empty() {
                let labels = self
                    .cluster
                    .get(&namespaces(), None, ns)
                    .await?
                    .and_then(|n| n.metadata.labels)
                    .unwrap_or_default();
                if !sel.matches_map(&labels) {
                    return Ok(vec![]);
                }
            }
        }

        let mut candidates = Vec::new();
        for obj in self.cluster.list(target, ns, None).await? {
            let data = to_json(&obj)?;
            if self.admits(rule, &data, &obj, src) {
                candidates.push((obj, data));
            }
        }
        Ok(candidates)
    }

    /// Whether a forward evaluation from `candidate` would search the namespace of `src`.
    fn admits(
        &self,
        rule: &Rule,
        data: &Value,
        candidate: &DynamicObject,
        src: &Source<'_>,
    ) -> bool {
        let Some(src_ns) = src.namespace.as_deref() else {
            return true;
        };
        match rule.connection.namespace_mode() {
            NamespaceMode::SameAsSource => candidate.namespace().as_deref() == Some(src_ns),
            NamespaceMode::Path(path) => {
                namespaces_at(rule, path, data, candidate.namespace().as_deref())
                    .map(|nss| nss.iter().any(|ns| ns == src_ns))
                    .unwrap_or(false)
            }
            NamespaceMode::LabelSelector(_) | NamespaceMode::Any => true,
        }
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator").finish_non_exhaustive()
    }
}

fn namespaces() -> ResourceId {
    ResourceId::new("", "v1", "namespaces", "Namespace", Scope::Cluster)
}

fn to_json(obj: &DynamicObject) -> Result<Value> {
    serde_json::to_value(obj).map_err(|e| Error::InvalidObject(e.to_string()))
}

/// Resolves the selector held by an object, if it has one.
fn holder_selector(
    rule: &Rule,
    conn: &SelectorConnection,
    data: &Value,
) -> Result<Option<Selector>> {
    let selector = if let Some(path) = conn.selector_path.as_deref() {
        let found = jsonpath::find(path, data).map_err(|e| Error::bad_rule(&rule.id, e))?;
        found.into_iter().find_map(selector_from_value)
    } else if let Some(sel) = &conn.selector {
        let rendered = sel
            .try_map_values(|s| jsonpath::render(s, data))
            .map_err(|e| Error::bad_rule(&rule.id, e))?;
        Some(rendered)
    } else {
        return Err(Error::bad_rule(
            &rule.id,
            "MatchSelector requires either selector or selectorPath",
        ));
    };
    // An empty selector would match everything.
    Ok(selector.filter(|s| !s.is_empty()))
}

/// Accepts either a `LabelSelector` or a plain label map.
fn selector_from_value(value: &Value) -> Option<Selector> {
    let obj = value.as_object()?;
    if obj.contains_key("matchLabels") || obj.contains_key("matchExpressions") {
        let ls = serde_json::from_value::<LabelSelector>(value.clone()).ok()?;
        return Some(Selector::from(&ls));
    }
    let map = obj
        .iter()
        .map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
        .collect::<Option<Map>>()?;
    Some(Selector::from_map(map))
}

fn labels_at(conn: &SelectorConnection, data: &Value) -> Map {
    let path = conn.target_label_path.as_deref().unwrap_or("metadata.labels");
    jsonpath::find(path, data)
        .ok()
        .and_then(|found| found.into_iter().next().cloned())
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Reads namespace names at `path`, falling back to `fallback` when none are present.
fn namespaces_at(
    rule: &Rule,
    path: &str,
    data: &Value,
    fallback: Option<&str>,
) -> Result<Vec<String>> {
    let mut nss = Vec::new();
    for v in jsonpath::find(path, data).map_err(|e| Error::bad_rule(&rule.id, e))? {
        match v {
            Value::String(s) if !s.is_empty() => nss.push(s.clone()),
            Value::Array(items) => nss.extend(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            ),
            _ => {}
        }
    }
    if nss.is_empty() {
        nss.extend(fallback.map(str::to_string));
    }
    nss.sort();
    nss.dedup();
    Ok(nss)
}

fn conn_namespace_is_source(rule: &Rule) -> bool {
    rule.connection.namespace_mode() == NamespaceMode::SameAsSource
}

fn owned_by(obj: &DynamicObject, uid: &str, level: Level) -> bool {
    obj.owner_references()
        .iter()
        .any(|r| r.uid == uid && (level != Level::Controller || r.controller == Some(true)))
}

/// Applies the rule's ownership level. The owner is always the descriptor's side.
fn filter_level(found: Vec<DynamicObject>, rule: &Rule, src: &Source<'_>) -> Vec<DynamicObject> {
    let level = rule.connection.level;
    if level == Level::Any {
        return found;
    }
    match rule.direction {
        Direction::Forward => {
            let Some(uid) = src.obj.uid() else {
                return vec![];
            };
            found.into_iter().filter(|t| owned_by(t, &uid, level)).collect()
        }
        Direction::Reverse => found
            .into_iter()
            .filter(|t| t.uid().is_some_and(|uid| owned_by(src.obj, &uid, level)))
            .collect(),
    }
}

/// Builds a matcher that recovers `{.metadata.name}` from a rendered name template.
///
/// Returns `None` if the template doesn't reference the name.
fn name_pattern(template: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    let mut captured = false;
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        pattern.push_str(&regex::escape(&rest[..start]));
        let end = rest[start..].find('}')? + start;
        let action = rest[start + 1..end].trim();
        if action == ".metadata.name" && !captured {
            pattern.push_str("(?P<name>.+?)");
            captured = true;
        } else {
            pattern.push_str(".*?");
        }
        rest = &rest[end + 1..];
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    if !captured {
        return None;
    }
    Regex::new(&pattern).ok()
}

fn dedup(found: Vec<DynamicObject>) -> Vec<DynamicObject> {
    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|o| seen.insert((o.namespace(), o.name_any())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_names_from_templates() {
        let re = name_pattern("{.metadata.name}-svc").unwrap();
        let caps = re.captures("web-svc").unwrap();
        assert_eq!(&caps["name"], "web");
        assert!(re.captures("web").is_none());

        let re = name_pattern("{.spec.prefix}.{.metadata.name}").unwrap();
        assert_eq!(&re.captures("a.b").unwrap()["name"], "b");

        assert!(name_pattern("{.spec.secretName}").is_none());
    }

    #[test]
    fn selectors_from_either_shape() {
        let sel = selector_from_value(&serde_json::json!({"matchLabels": {"app": "web"}})).unwrap();
        assert!(sel.matches_map(&[("app".to_string(), "web".to_string())].into_iter().collect()));

        let sel = selector_from_value(&serde_json::json!({"app": "web"})).unwrap();
        assert!(!sel.is_empty());

        assert!(selector_from_value(&serde_json::json!("app=web")).is_none());
    }
}
