//! Periodic API discovery.
//!
//! Each sweep replaces the [`Registry`] with every served, listable and watchable resource
//! version. The preferred version of each newly seen kind is announced so that a reconciler can
//! be started for it; the announcement channel stays open for the life of the process. Objects
//! of kinds that stop being served are dropped from the graph.

use crate::{Registry, SharedRegistry};
use ahash::AHashSet as HashSet;
use kube::{
    discovery::{verbs, Discovery, Scope as ApiScope},
    Client,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use ui_server_core::{GroupKind, ResourceId, Scope, SharedGraph};

/// Groups that are never watched. Their objects either churn constantly or carry no edges.
const DENIED_GROUPS: &[&str] = &[
    "admissionregistration.k8s.io",
    "apiextensions.k8s.io",
    "flowcontrol.apiserver.k8s.io",
];

const DENIED_KINDS: &[(&str, &str)] = &[
    ("", "Event"),
    ("events.k8s.io", "Event"),
    ("", "PodTemplate"),
    ("apps", "ControllerRevision"),
    ("storage.k8s.io", "VolumeAttachment"),
];

pub struct ApiDiscovery {
    client: Client,
    registry: SharedRegistry,
    graph: SharedGraph,
    interval: Duration,
    announced: HashSet<GroupKind>,
}

/// The outcome of one discovery sweep.
#[derive(Debug, Default, PartialEq)]
pub struct Sweep {
    /// Preferred versions of kinds never announced before.
    pub new: Vec<ResourceId>,
    /// Kinds that were served before the sweep and no longer are.
    pub removed: Vec<GroupKind>,
}

/// Whether objects of `gk` are excluded from the graph.
pub fn is_denied(gk: &GroupKind) -> bool {
    DENIED_GROUPS.contains(&gk.group.as_str())
        || DENIED_KINDS
            .iter()
            .any(|(g, k)| *g == gk.group && *k == gk.kind)
}

/// Replaces the registry's contents with the types `found` by a sweep.
///
/// Kinds are announced at most once. A kind that disappears and later returns is served again
/// by the reconciler started on its first announcement.
pub fn apply_sweep(
    registry: &mut Registry,
    announced: &mut HashSet<GroupKind>,
    found: Vec<ResourceId>,
) -> Sweep {
    let fresh = found.into_iter().collect::<Registry>();
    let removed = registry.retain(|gk| fresh.is_registered(gk));
    *registry = fresh;
    let new = registry
        .preferred_all()
        .into_iter()
        .filter(|rid| {
            let gk = rid.group_kind();
            !is_denied(&gk) && announced.insert(gk)
        })
        .collect();
    Sweep { new, removed }
}

// === impl ApiDiscovery ===

impl ApiDiscovery {
    pub fn new(
        client: Client,
        registry: SharedRegistry,
        graph: SharedGraph,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            registry,
            graph,
            interval,
            announced: HashSet::new(),
        }
    }

    /// Runs discovery every interval, announcing new kinds on `tx`, until shutdown.
    pub async fn run(mut self, tx: mpsc::Sender<ResourceId>, drain: drain::Watch) {
        let shutdown = drain.signaled();
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => return,
                _ = interval.tick() => {}
            }

            let found = match self.discover().await {
                Ok(found) => found,
                Err(error) => {
                    warn!(%error, "API discovery failed");
                    continue;
                }
            };
            let Sweep { new, removed } =
                apply_sweep(&mut self.registry.write(), &mut self.announced, found);
            for gk in &removed {
                let deleted = self.graph.write().delete_kind(gk);
                info!(kind = %gk, objects = deleted, "Resource kind is no longer served");
            }
            if !new.is_empty() {
                info!(kinds = new.len(), "Discovered new resource kinds");
            }
            for rid in new {
                debug!(%rid, "Announcing");
                if tx.send(rid).await.is_err() {
                    return;
                }
            }
        }
    }

    async fn discover(&self) -> Result<Vec<ResourceId>, kube::Error> {
        let discovery = Discovery::new(self.client.clone()).run().await?;
        let mut found = Vec::new();
        for group in discovery.groups() {
            for version in group.versions() {
                for (ar, caps) in group.versioned_resources(version) {
                    let watchable = caps.supports_operation(verbs::LIST)
                        && caps.supports_operation(verbs::WATCH);
                    if !watchable {
                        continue;
                    }
                    let scope = match caps.scope {
                        ApiScope::Cluster => Scope::Cluster,
                        ApiScope::Namespaced => Scope::Namespaced,
                    };
                    found.push(ResourceId::new(ar.group, ar.version, ar.plural, ar.kind, scope));
                }
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rid(group: &str, version: &str, name: &str, kind: &str) -> ResourceId {
        ResourceId::new(group, version, name, kind, Scope::Namespaced)
    }

    #[test]
    fn announces_preferred_version_of_new_kinds() {
        let mut registry = Registry::default();
        let mut announced = HashSet::new();
        let sweep = apply_sweep(
            &mut registry,
            &mut announced,
            vec![
                rid("autoscaling", "v1", "horizontalpodautoscalers", "HorizontalPodAutoscaler"),
                rid("autoscaling", "v2", "horizontalpodautoscalers", "HorizontalPodAutoscaler"),
                rid("", "v1", "events", "Event"),
                rid("", "v1", "pods", "Pod"),
            ],
        );
        assert_eq!(
            sweep.new,
            vec![
                rid("", "v1", "pods", "Pod"),
                rid("autoscaling", "v2", "horizontalpodautoscalers", "HorizontalPodAutoscaler"),
            ]
        );
        // Denied kinds are still resolvable.
        assert!(registry.is_registered(&GroupKind::new("", "Event")));

        let again = apply_sweep(&mut registry, &mut announced, vec![rid("", "v1", "pods", "Pod")]);
        assert!(again.new.is_empty());
    }

    #[test]
    fn forgets_kinds_that_are_no_longer_served() {
        let mut registry = Registry::default();
        let mut announced = HashSet::new();
        let widgets = rid("example.com", "v1", "widgets", "Widget");
        let pods = rid("", "v1", "pods", "Pod");
        apply_sweep(&mut registry, &mut announced, vec![pods.clone(), widgets.clone()]);

        let sweep = apply_sweep(&mut registry, &mut announced, vec![pods.clone()]);
        assert_eq!(
            sweep,
            Sweep {
                new: vec![],
                removed: vec![GroupKind::new("example.com", "Widget")],
            }
        );
        assert!(!registry.is_registered(&widgets.group_kind()));
        assert!(registry.lookup("example.com/v1", "Widget").is_none());

        // A reinstalled kind is served again without a second reconciler.
        let sweep = apply_sweep(&mut registry, &mut announced, vec![pods, widgets.clone()]);
        assert_eq!(sweep, Sweep::default());
        assert!(registry.is_registered(&widgets.group_kind()));
    }

    #[test]
    fn denies_noisy_kinds() {
        assert!(is_denied(&GroupKind::new("events.k8s.io", "Event")));
        assert!(is_denied(&GroupKind::new(
            "apiextensions.k8s.io",
            "CustomResourceDefinition"
        )));
        assert!(!is_denied(&GroupKind::new("apps", "Deployment")));
    }
}
