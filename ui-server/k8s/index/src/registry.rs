//! The set of resource types served by the cluster.

use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use ui_server_core::{version, GroupKind, ResourceId};

pub type SharedRegistry = Arc<RwLock<Registry>>;

#[derive(Debug, Default)]
pub struct Registry {
    /// Every served version of each kind, most preferred first.
    by_kind: HashMap<GroupKind, Vec<ResourceId>>,
    /// Maps `(group, plural)` to the kind it serves.
    by_resource: HashMap<(String, String), GroupKind>,
}

impl Registry {
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Records a served type. Returns false if it was already known.
    pub fn register(&mut self, rid: ResourceId) -> bool {
        let gk = rid.group_kind();
        self.by_resource
            .insert((rid.group.clone(), rid.name.clone()), gk.clone());
        let versions = self.by_kind.entry(gk).or_default();
        if versions.iter().any(|r| r.version == rid.version) {
            return false;
        }
        versions.push(rid);
        versions.sort_by(|a, b| version::compare(&b.version, &a.version));
        true
    }

    /// Drops every kind for which `keep` returns false, returning the dropped kinds.
    pub fn retain(&mut self, mut keep: impl FnMut(&GroupKind) -> bool) -> Vec<GroupKind> {
        let mut removed = self
            .by_kind
            .keys()
            .filter(|gk| !keep(gk))
            .cloned()
            .collect::<Vec<_>>();
        removed.sort();
        for gk in &removed {
            self.by_kind.remove(gk);
        }
        let by_kind = &self.by_kind;
        self.by_resource.retain(|_, gk| by_kind.contains_key(gk));
        removed
    }

    pub fn is_registered(&self, gk: &GroupKind) -> bool {
        self.by_kind.contains_key(gk)
    }

    pub fn has_version(&self, gk: &GroupKind, version: &str) -> bool {
        self.by_kind
            .get(gk)
            .is_some_and(|vs| vs.iter().any(|r| r.version == version))
    }

    /// The preferred served version of a kind.
    pub fn preferred(&self, gk: &GroupKind) -> Option<&ResourceId> {
        self.by_kind.get(gk).and_then(|vs| vs.first())
    }

    /// Resolves an `apiVersion`/`kind` pair, falling back to the preferred version.
    pub fn lookup(&self, api_version: &str, kind: &str) -> Option<&ResourceId> {
        let gk = GroupKind::from_api_version(api_version, kind);
        let version = api_version.rsplit('/').next().unwrap_or(api_version);
        let versions = self.by_kind.get(&gk)?;
        versions
            .iter()
            .find(|r| r.version == version)
            .or_else(|| versions.first())
    }

    /// Resolves a plural resource name within a group. An empty version selects the preferred one.
    pub fn by_resource(&self, group: &str, version: &str, resource: &str) -> Option<&ResourceId> {
        let gk = self
            .by_resource
            .get(&(group.to_string(), resource.to_string()))?;
        let versions = self.by_kind.get(gk)?;
        if version.is_empty() {
            return versions.first();
        }
        versions.iter().find(|r| r.version == version)
    }

    /// Preferred versions of every kind in `group`.
    pub fn kinds_in_group(&self, group: &str) -> Vec<ResourceId> {
        let mut rids = self
            .by_kind
            .iter()
            .filter(|(gk, _)| gk.group == group)
            .filter_map(|(_, vs)| vs.first().cloned())
            .collect::<Vec<_>>();
        rids.sort();
        rids
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.by_kind.keys().any(|gk| gk.group == group)
    }

    /// Preferred versions of every registered kind.
    pub fn preferred_all(&self) -> Vec<ResourceId> {
        let mut rids = self
            .by_kind
            .values()
            .filter_map(|vs| vs.first().cloned())
            .collect::<Vec<_>>();
        rids.sort();
        rids
    }

    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

impl FromIterator<ResourceId> for Registry {
    fn from_iter<T: IntoIterator<Item = ResourceId>>(iter: T) -> Self {
        let mut reg = Self::default();
        for rid in iter {
            reg.register(rid);
        }
        reg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ui_server_core::Scope;

    fn rid(group: &str, version: &str, name: &str, kind: &str) -> ResourceId {
        ResourceId::new(group, version, name, kind, Scope::Namespaced)
    }

    #[test]
    fn prefers_highest_version() {
        let reg = [
            rid("kubedb.com", "v1alpha2", "postgreses", "Postgres"),
            rid("kubedb.com", "v1", "postgreses", "Postgres"),
        ]
        .into_iter()
        .collect::<Registry>();

        let gk = GroupKind::new("kubedb.com", "Postgres");
        assert_eq!(reg.preferred(&gk).unwrap().version, "v1");
        assert_eq!(
            reg.lookup("kubedb.com/v1alpha2", "Postgres").unwrap().version,
            "v1alpha2"
        );
        assert_eq!(
            reg.lookup("kubedb.com/v1beta9", "Postgres").unwrap().version,
            "v1"
        );
        assert!(reg.lookup("v1", "Postgres").is_none());
        assert_eq!(
            reg.by_resource("kubedb.com", "", "postgreses").unwrap().version,
            "v1"
        );
        assert!(reg.by_resource("kubedb.com", "v2", "postgreses").is_none());
    }

    #[test]
    fn register_reports_new_types() {
        let mut reg = Registry::default();
        assert!(reg.register(rid("apps", "v1", "deployments", "Deployment")));
        assert!(!reg.register(rid("apps", "v1", "deployments", "Deployment")));
        assert_eq!(reg.len(), 1);
        assert!(reg.has_group("apps"));
        assert_eq!(reg.kinds_in_group("apps").len(), 1);
    }

    #[test]
    fn retain_forgets_resources_of_dropped_kinds() {
        let mut reg = [
            rid("apps", "v1", "deployments", "Deployment"),
            rid("example.com", "v1", "widgets", "Widget"),
        ]
        .into_iter()
        .collect::<Registry>();

        let removed = reg.retain(|gk| gk.group != "example.com");
        assert_eq!(removed, vec![GroupKind::new("example.com", "Widget")]);
        assert!(!reg.is_registered(&GroupKind::new("example.com", "Widget")));
        assert!(reg.by_resource("example.com", "", "widgets").is_none());
        assert!(reg.by_resource("apps", "v1", "deployments").is_some());
    }
}
