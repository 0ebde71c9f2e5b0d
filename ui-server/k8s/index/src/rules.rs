//! Connection rules derived from descriptors.
//!
//! Every descriptor connection yields two rules: a forward rule evaluated for objects of the
//! described type, and a reverse rule evaluated for objects of the target type. Both compute the
//! same edges, so either side's change refreshes them.

use ahash::AHashMap;
use std::{cmp::Ordering, sync::Arc};
use ui_server_core::{version, GroupKind};
use ui_server_k8s_api::descriptor::{
    ConnectionSpec, ResourceConnection, ResourceDescriptor, TargetRef,
};

/// Evaluation cost of rules that list candidates and filter them in-process.
pub const IN_APP_FILTER_COST: u32 = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Forward,
    Reverse,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    /// `<descriptor name>#<connection index>`.
    pub id: String,
    pub direction: Direction,
    /// The type that the descriptor describes.
    pub described: TargetRef,
    pub connection: ResourceConnection,
}

/// Rules grouped by the type whose objects they're evaluated for.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    by_subject: AHashMap<GroupKind, Vec<Arc<Rule>>>,
}

// === impl Rule ===

impl Rule {
    pub fn forward(desc: &ResourceDescriptor, idx: usize) -> Option<Self> {
        Self::new(desc, idx, Direction::Forward)
    }

    pub fn reverse(desc: &ResourceDescriptor, idx: usize) -> Option<Self> {
        Self::new(desc, idx, Direction::Reverse)
    }

    fn new(desc: &ResourceDescriptor, idx: usize, direction: Direction) -> Option<Self> {
        let connection = desc.spec.connections.get(idx)?.clone();
        let res = &desc.spec.resource;
        let name = if desc.metadata.name.is_empty() {
            format!("{}-{}-{}", res.group, res.version, res.name)
        } else {
            desc.metadata.name.clone()
        };
        Some(Self {
            id: format!("{name}#{idx}"),
            direction,
            described: TargetRef::new(res.api_version(), &res.kind),
            connection,
        })
    }

    /// The type whose objects this rule is evaluated for.
    pub fn subject(&self) -> GroupKind {
        GroupKind::from_api_version(&self.subject_ref().api_version, &self.subject_ref().kind)
    }

    fn subject_ref(&self) -> &TargetRef {
        match self.direction {
            Direction::Forward => &self.described,
            Direction::Reverse => &self.connection.target,
        }
    }

    /// The type of the objects this rule yields.
    pub fn other(&self) -> &TargetRef {
        match self.direction {
            Direction::Forward => &self.connection.target,
            Direction::Reverse => &self.described,
        }
    }

    pub fn other_group_kind(&self) -> GroupKind {
        GroupKind::from_api_version(&self.other().api_version, &self.other().kind)
    }

    pub fn cost(&self) -> u32 {
        let in_app = match (&self.connection.spec, self.direction) {
            (ConnectionSpec::MatchSelector(s), Direction::Forward) => s
                .target_label_path
                .as_deref()
                .is_some_and(|p| !is_default_label_path(p)),
            (ConnectionSpec::MatchSelector(_), Direction::Reverse) => true,
            (ConnectionSpec::OwnedBy, Direction::Reverse) => true,
            (ConnectionSpec::MatchRef(_), Direction::Reverse) => true,
            _ => false,
        };
        if in_app {
            IN_APP_FILTER_COST
        } else {
            1
        }
    }

    fn fusion_key(&self) -> (Direction, GroupKind, GroupKind, Vec<&'static str>, &'static str) {
        let described =
            GroupKind::from_api_version(&self.described.api_version, &self.described.kind);
        let mut labels = self
            .connection
            .labels
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>();
        labels.sort_unstable();
        labels.dedup();
        (
            self.direction,
            described,
            self.other_group_kind(),
            labels,
            self.connection.spec.type_name(),
        )
    }

    /// Orders rules for the same relationship: the higher target version wins, then the higher
    /// descriptor version.
    fn precedence(&self, other: &Self) -> Ordering {
        fn target(r: &Rule) -> &str {
            version_of(&r.connection.target.api_version)
        }
        fn described(r: &Rule) -> &str {
            version_of(&r.described.api_version)
        }
        version::compare(target(self), target(other))
            .then_with(|| version::compare(described(self), described(other)))
    }
}

pub(crate) fn is_default_label_path(path: &str) -> bool {
    let path = path.trim();
    let path = path
        .strip_prefix('{')
        .and_then(|p| p.strip_suffix('}'))
        .unwrap_or(path);
    path.trim_start_matches('.') == "metadata.labels"
}

fn version_of(api_version: &str) -> &str {
    api_version.rsplit('/').next().unwrap_or(api_version)
}

// === impl RuleSet ===

impl RuleSet {
    pub fn from_descriptors<'d>(
        descriptors: impl IntoIterator<Item = &'d ResourceDescriptor>,
    ) -> Self {
        let mut rules = Vec::new();
        for desc in descriptors {
            for idx in 0..desc.spec.connections.len() {
                rules.extend(Rule::forward(desc, idx));
                rules.extend(Rule::reverse(desc, idx));
            }
        }
        rules.into_iter().collect()
    }

    /// Rules to evaluate for objects of `gk`, cheapest first.
    pub fn rules_for(&self, gk: &GroupKind) -> &[Arc<Rule>] {
        self.by_subject.get(gk).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has_rules(&self, gk: &GroupKind) -> bool {
        self.by_subject.get(gk).is_some_and(|r| !r.is_empty())
    }

    pub fn subjects(&self) -> impl Iterator<Item = &GroupKind> {
        self.by_subject.keys()
    }

    pub fn len(&self) -> usize {
        self.by_subject.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_subject.is_empty()
    }
}

impl FromIterator<Rule> for RuleSet {
    /// Groups rules by subject, keeping only the most preferred rule for each relationship.
    fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
        let mut fused = AHashMap::<_, Rule>::new();
        for rule in iter {
            let key = rule.fusion_key();
            match fused.get(&key) {
                Some(prior) if prior.precedence(&rule) != Ordering::Less => {}
                _ => {
                    fused.insert(key, rule);
                }
            }
        }

        let mut by_subject = AHashMap::<GroupKind, Vec<Arc<Rule>>>::new();
        for rule in fused.into_values() {
            by_subject
                .entry(rule.subject())
                .or_default()
                .push(Arc::new(rule));
        }
        for rules in by_subject.values_mut() {
            rules.sort_by(|a, b| a.cost().cmp(&b.cost()).then_with(|| a.id.cmp(&b.id)));
        }
        Self { by_subject }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn descriptors(yaml: &str) -> Vec<ResourceDescriptor> {
        use serde::Deserialize;
        serde_yaml::Deserializer::from_str(yaml)
            .map(|d| ResourceDescriptor::deserialize(d).expect("descriptor must parse"))
            .collect()
    }

    const DEPLOYMENTS: &str = r#"
metadata: {name: deployments}
spec:
  resource: {group: apps, version: v1, name: deployments, kind: Deployment}
  connections:
  - target: {apiVersion: v1, kind: Pod}
    labels: [offshoot]
    type: MatchSelector
    selectorPath: "{.spec.selector}"
  - target: {apiVersion: v1, kind: Secret}
    labels: [config]
    type: MatchRef
    references: ["{.spec.template.spec.volumes[*].secret.secretName}"]
"#;

    #[test]
    fn indexes_both_directions() {
        let rules = RuleSet::from_descriptors(&descriptors(DEPLOYMENTS));
        assert_eq!(rules.len(), 4);

        let deploy = rules.rules_for(&GroupKind::new("apps", "Deployment"));
        assert_eq!(deploy.len(), 2);
        assert!(deploy.iter().all(|r| r.direction == Direction::Forward));

        let pod = rules.rules_for(&GroupKind::new("", "Pod"));
        assert_eq!(pod.len(), 1);
        assert_eq!(pod[0].direction, Direction::Reverse);
        assert_eq!(pod[0].other_group_kind(), GroupKind::new("apps", "Deployment"));
        assert_eq!(pod[0].cost(), IN_APP_FILTER_COST);
        assert_eq!(pod[0].id, "deployments#0");

        assert!(rules.has_rules(&GroupKind::new("", "Secret")));
        assert!(!rules.has_rules(&GroupKind::new("", "ConfigMap")));
    }

    #[test]
    fn sorts_cheap_rules_first() {
        let rules = RuleSet::from_descriptors(&descriptors(
            r#"
metadata: {name: a}
spec:
  resource: {group: apps, version: v1, name: deployments, kind: Deployment}
  connections:
  - target: {apiVersion: v1, kind: Pod}
    labels: [offshoot]
    type: MatchSelector
    selectorPath: "{.spec.selector}"
---
metadata: {name: b}
spec:
  resource: {group: "", version: v1, name: pods, kind: Pod}
  connections:
  - target: {apiVersion: v1, kind: Node}
    labels: [located_on]
    type: MatchRef
    references: ["{.spec.nodeName}"]
"#,
        ));
        let costs = rules
            .rules_for(&GroupKind::new("", "Pod"))
            .iter()
            .map(|r| r.cost())
            .collect::<Vec<_>>();
        assert_eq!(costs, vec![1, IN_APP_FILTER_COST]);
    }

    #[test]
    fn fuses_versions_of_one_relationship() {
        let rules = RuleSet::from_descriptors(&descriptors(
            r#"
metadata: {name: old}
spec:
  resource: {group: example.com, version: v1alpha1, name: widgets, kind: Widget}
  connections:
  - target: {apiVersion: v1, kind: Secret}
    labels: [config]
    type: MatchRef
    references: ["{.spec.secretName}"]
---
metadata: {name: new}
spec:
  resource: {group: example.com, version: v1, name: widgets, kind: Widget}
  connections:
  - target: {apiVersion: v1, kind: Secret}
    labels: [config]
    type: MatchRef
    references: ["{.spec.secret.name}"]
"#,
        ));
        let widget = rules.rules_for(&GroupKind::new("example.com", "Widget"));
        assert_eq!(widget.len(), 1);
        assert_eq!(widget[0].id, "new#0");
        assert_eq!(rules.rules_for(&GroupKind::new("", "Secret")).len(), 1);
    }

    #[test]
    fn default_label_paths() {
        for p in ["metadata.labels", ".metadata.labels", "{.metadata.labels}"] {
            assert!(is_default_label_path(p), "{p}");
        }
        assert!(!is_default_label_path("{.spec.template.metadata.labels}"));
    }
}
