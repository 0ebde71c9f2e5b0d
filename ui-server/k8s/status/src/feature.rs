//! Derives `Feature` status from live workloads and Helm releases.

use crate::{is_not_found, Error, Result, FEATURE_GROUP, HELM_GROUP, HELM_RELEASE_KIND};
use futures::prelude::*;
use kube::{
    api::{Api, ListParams, Patch, PatchParams, ResourceExt},
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event as Finalized},
        watcher,
    },
    Client,
};
use rand::Rng;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use ui_server_core::{GroupKind, ResourceId};
use ui_server_k8s_api::{
    feature::{
        ComponentStatus, Feature, FeatureSet, FeatureSetStatus, FeatureStatus, GroupVersionKind,
        FEATURE_LABEL, FEATURE_SET_LABEL,
    },
    Selector,
};
use ui_server_k8s_index::{SharedCluster, SharedRegistry};

const FINALIZER: &str = "ui.k8s.appscode.com/feature";
const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Evaluates features against the cluster's current state.
#[derive(Clone)]
pub struct FeatureEvaluator {
    cluster: SharedCluster,
    registry: SharedRegistry,
}

pub struct FeatureController {
    client: Client,
    evaluator: FeatureEvaluator,
    claims: Arc<Notify>,
}

fn disabled(note: impl Into<String>) -> FeatureStatus {
    FeatureStatus {
        enabled: Some(false),
        managed: Some(false),
        ready: Some(false),
        note: note.into(),
    }
}

/// Third-party controllers don't always emit events we watch, so every feature is revisited
/// after a jittered delay.
fn requeue_delay() -> Duration {
    Duration::from_secs(rand::rng().random_range(30..=150))
}

pub(crate) fn condition_is_true(obj: &Value, type_: &str) -> bool {
    obj.pointer("/status/conditions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .any(|c| {
            c.get("type").and_then(Value::as_str) == Some(type_)
                && c.get("status").and_then(Value::as_str) == Some("True")
        })
}

fn condition_message(obj: &Value, type_: &str) -> Option<String> {
    obj.pointer("/status/conditions")
        .and_then(Value::as_array)?
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(type_))
        .and_then(|c| c.get("message"))
        .and_then(Value::as_str)
        .map(Into::into)
}

/// Deployments and StatefulSets must have every replica ready. Pods and Grafana dashboards
/// need a true `Ready` condition. Anything else is ready once it exists.
pub(crate) fn is_workload_ready(gk: &GroupKind, obj: &Value) -> bool {
    match (gk.group.as_str(), gk.kind.as_str()) {
        ("apps", "Deployment" | "StatefulSet") => {
            let want = obj
                .pointer("/spec/replicas")
                .and_then(Value::as_i64)
                .unwrap_or(1);
            let ready = obj
                .pointer("/status/readyReplicas")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            ready == want
        }
        ("", "Pod") | (_, "GrafanaDashboard") => condition_is_true(obj, "Ready"),
        _ => true,
    }
}

/// Summarizes the features of a set.
///
/// The set is ready when every required feature is ready, and enabled when at least one
/// required feature is both enabled and managed.
pub fn roll_up(set: &FeatureSet, features: &[Feature]) -> FeatureSetStatus {
    let set_name = set.name_any();
    let mut components = features
        .iter()
        .filter(|f| f.spec.feature_set == set_name)
        .map(|f| {
            let st = f.status.clone().unwrap_or_default();
            ComponentStatus {
                name: f.name_any(),
                enabled: st.enabled,
                managed: st.managed,
                ready: st.ready,
            }
        })
        .collect::<Vec<_>>();
    components.sort_by(|a, b| a.name.cmp(&b.name));

    let find = |name: &str| components.iter().find(|c| c.name == name);
    let required = &set.spec.required_features;
    let not_ready = required
        .iter()
        .filter(|n| !find(n.as_str()).is_some_and(|c| c.ready == Some(true)))
        .cloned()
        .collect::<Vec<_>>();
    let enabled = required.iter().any(|n| {
        find(n.as_str()).is_some_and(|c| c.enabled == Some(true) && c.managed == Some(true))
    });
    let note = if not_ready.is_empty() {
        String::new()
    } else {
        format!("required features are not ready: {}", not_ready.join(", "))
    };

    FeatureSetStatus {
        enabled: Some(enabled),
        ready: Some(not_ready.is_empty()),
        features: components,
        note,
    }
}

/// Resets the status of the named feature so that a roll-up no longer counts it as enabled.
pub(crate) fn mark_removed(features: &mut [Feature], name: &str) {
    for f in features.iter_mut().filter(|f| f.name_any() == name) {
        f.status = Some(FeatureStatus {
            enabled: Some(false),
            ..Default::default()
        });
    }
}

// === impl FeatureEvaluator ===

impl FeatureEvaluator {
    pub fn new(cluster: SharedCluster, registry: SharedRegistry) -> Self {
        Self { cluster, registry }
    }

    pub async fn evaluate(&self, feature: &Feature) -> Result<FeatureStatus> {
        let name = feature.name_any();
        let spec = &feature.spec;

        for gvk in &spec.readiness_checks.resources {
            if self.resource(gvk).is_none() {
                return Ok(disabled(format!("resource {gvk} is not registered")));
            }
        }

        let mut unready = None;
        for workload in &spec.readiness_checks.workloads {
            let Some(rid) = self.resource(&workload.gvk) else {
                return Ok(disabled(format!("resource {} is not registered", workload.gvk)));
            };
            let selector = Selector::from_map(workload.selector.clone());
            let objs = self.cluster.list(&rid, None, Some(&selector)).await?;
            if objs.is_empty() {
                return Ok(disabled(format!(
                    "no {} matches {selector}",
                    workload.gvk.kind
                )));
            }
            let gk = rid.group_kind();
            if let Some(obj) = objs.iter().find(|o| !is_workload_ready(&gk, &o.data)) {
                unready.get_or_insert_with(|| {
                    format!("{} {} is not ready", gk.kind, obj.name_any())
                });
            }
        }

        let release = self.helm_release(&name, &spec.feature_set).await?;
        let Some(release) = release else {
            if spec.readiness_checks.workloads.is_empty() {
                return Ok(disabled("no workload or Helm release found"));
            }
            return Ok(FeatureStatus {
                enabled: Some(true),
                managed: Some(false),
                ready: Some(unready.is_none()),
                note: unready.unwrap_or_else(|| "externally managed".to_string()),
            });
        };

        let note = if !condition_is_true(&release.data, "Ready") {
            let why = condition_message(&release.data, "Ready").unwrap_or_default();
            Some(format!("HelmRelease {} is not ready: {why}", release.name_any()))
        } else if let Some(dep) = self.missing_dependency(feature).await? {
            Some(format!("required feature {dep} is not enabled"))
        } else {
            unready
        };
        Ok(FeatureStatus {
            enabled: Some(true),
            managed: Some(true),
            ready: Some(note.is_none()),
            note: note.unwrap_or_default(),
        })
    }

    fn resource(&self, gvk: &GroupVersionKind) -> Option<ResourceId> {
        let gk = GroupKind::new(&gvk.group, &gvk.kind);
        let registry = self.registry.read();
        if registry.has_version(&gk, &gvk.version) {
            return registry.preferred(&gk).cloned();
        }
        None
    }

    async fn helm_release(
        &self,
        feature: &str,
        feature_set: &str,
    ) -> Result<Option<kube::api::DynamicObject>> {
        let rid = self
            .registry
            .read()
            .preferred(&GroupKind::new(HELM_GROUP, HELM_RELEASE_KIND))
            .cloned();
        let Some(rid) = rid else {
            return Ok(None);
        };
        let selector = [
            (FEATURE_LABEL.to_string(), feature.to_string()),
            (FEATURE_SET_LABEL.to_string(), feature_set.to_string()),
        ]
        .into_iter()
        .collect::<Selector>();
        let mut releases = self.cluster.list(&rid, None, Some(&selector)).await?;
        releases.sort_by_key(|r| (r.namespace(), r.name_any()));
        Ok(releases.into_iter().next())
    }

    /// The first required feature that is missing or not enabled.
    async fn missing_dependency(&self, feature: &Feature) -> Result<Option<String>> {
        let deps = &feature.spec.requirements.features;
        if deps.is_empty() {
            return Ok(None);
        }
        let rid = self
            .registry
            .read()
            .preferred(&GroupKind::new(FEATURE_GROUP, "Feature"))
            .cloned();
        let Some(rid) = rid else {
            return Ok(deps.first().cloned());
        };
        for dep in deps {
            let enabled = self
                .cluster
                .get(&rid, None, dep)
                .await?
                .and_then(|f| f.data.pointer("/status/enabled").and_then(Value::as_bool))
                .unwrap_or(false);
            if !enabled {
                return Ok(Some(dep.clone()));
            }
        }
        Ok(None)
    }
}

// === impl FeatureController ===

impl FeatureController {
    pub fn new(client: Client, evaluator: FeatureEvaluator, claims: Arc<Notify>) -> Self {
        Self {
            client,
            evaluator,
            claims,
        }
    }

    pub async fn run(self, drain: drain::Watch) {
        let api = Api::<Feature>::all(self.client.clone());
        let controller = Controller::new(api, watcher::Config::default())
            .run(reconcile, error_policy, Arc::new(self))
            .for_each(|res| {
                match res {
                    Ok((feature, _)) => debug!(feature = %feature.name, "Reconciled"),
                    Err(error) => debug!(%error, "Reconcile failed"),
                }
                future::ready(())
            });
        tokio::select! {
            _ = controller => {}
            _ = drain.signaled() => debug!("Shutting down"),
        }
    }

    async fn apply(&self, feature: &Feature) -> Result<Action> {
        let name = feature.name_any();
        let status = self.evaluator.evaluate(feature).await?;
        if feature.status.as_ref() != Some(&status) {
            let patch = json!({
                "status": {
                    "enabled": status.enabled,
                    "managed": status.managed,
                    "ready": status.ready,
                    "note": status.note,
                },
            });
            Api::<Feature>::all(self.client.clone())
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(patch))
                .await?;
            info!(
                feature = %name,
                enabled = ?status.enabled,
                managed = ?status.managed,
                ready = ?status.ready,
                "Updated status"
            );
        }

        let set_name = feature.spec.feature_set.clone();
        let mut feature = feature.clone();
        feature.status = Some(status);
        self.update_feature_set(&set_name, |features| {
            features.retain(|f| f.name_any() != name);
            features.push(feature);
        })
        .await?;
        self.claims.notify_one();
        Ok(Action::requeue(requeue_delay()))
    }

    /// Marks a deleted feature disabled in its set before the finalizer is released.
    async fn cleanup(&self, feature: &Feature) -> Result<Action> {
        let name = feature.name_any();
        self.update_feature_set(&feature.spec.feature_set, |features| {
            mark_removed(features, &name)
        })
        .await?;
        self.claims.notify_one();
        info!(feature = %name, "Feature removed");
        Ok(Action::await_change())
    }

    /// Recomputes a set's status from its features, as adjusted by `adjust`. A missing set is
    /// not an error.
    async fn update_feature_set(
        &self,
        set_name: &str,
        adjust: impl FnOnce(&mut Vec<Feature>),
    ) -> Result<()> {
        let sets = Api::<FeatureSet>::all(self.client.clone());
        let set = match sets.get(set_name).await {
            Ok(set) => set,
            Err(error) if is_not_found(&error) => {
                debug!(feature_set = %set_name, "Feature set not found");
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        };

        let mut features = Api::<Feature>::all(self.client.clone())
            .list(&ListParams::default())
            .await?
            .items;
        features.retain(|f| f.spec.feature_set == set_name);
        adjust(&mut features);

        let status = roll_up(&set, &features);
        if set.status.as_ref() == Some(&status) {
            return Ok(());
        }
        let patch = json!({ "status": serde_json::to_value(&status)? });
        match sets
            .patch_status(set_name, &PatchParams::default(), &Patch::Merge(patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(error) if is_not_found(&error) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

async fn reconcile(feature: Arc<Feature>, ctx: Arc<FeatureController>) -> Result<Action> {
    let api = Api::<Feature>::all(ctx.client.clone());
    finalizer(&api, FINALIZER, feature, |event| async move {
        match event {
            Finalized::Apply(feature) => ctx.apply(&feature).await,
            Finalized::Cleanup(feature) => ctx.cleanup(&feature).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

fn error_policy(feature: Arc<Feature>, error: &Error, _: Arc<FeatureController>) -> Action {
    warn!(feature = %feature.name_any(), %error, "Failed to reconcile");
    Action::requeue(ERROR_REQUEUE)
}
