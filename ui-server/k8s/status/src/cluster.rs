//! Periodically recomputes the cluster's phase.
//!
//! A cluster is `Active` once Flux is installed and ready and every required feature set is
//! ready. Without any `FeatureSet`s served it is `Inactive`.

use crate::{feature::is_workload_ready, Result, FEATURE_GROUP, HELM_GROUP};
use arc_swap::ArcSwap;
use kube::api::ResourceExt;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use ui_server_core::GroupKind;
use ui_server_k8s_api::cluster::{reason, CapiClusterInfo, ClusterPhase, ClusterStatusResponse};
use ui_server_k8s_index::{SharedCluster, SharedRegistry};

pub type SharedStatus = Arc<ArcSwap<ClusterStatusResponse>>;

const FLUX_NAMESPACE: &str = "flux-system";
const FLUX_CONTROLLERS: [&str; 2] = ["source-controller", "helm-controller"];
const CAPI_GROUP: &str = "cluster.x-k8s.io";

/// Groups whose presence reveals the tool managing the cluster.
const CLUSTER_MANAGERS: &[(&str, &str)] = &[
    ("operator.open-cluster-management.io", "OCM"),
    ("work.open-cluster-management.io", "OCM"),
    ("management.cattle.io", "Rancher"),
];

pub struct ClusterStatusPoller {
    cluster: SharedCluster,
    registry: SharedRegistry,
    required_feature_sets: Vec<String>,
    interval: Duration,
    status: SharedStatus,
}

fn phase(phase: ClusterPhase, reason: &str, message: impl Into<String>) -> ClusterStatusResponse {
    ClusterStatusResponse {
        phase,
        reason: reason.to_string(),
        message: message.into(),
        ..Default::default()
    }
}

// === impl ClusterStatusPoller ===

impl ClusterStatusPoller {
    pub fn new(
        cluster: SharedCluster,
        registry: SharedRegistry,
        required_feature_sets: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            cluster,
            registry,
            required_feature_sets,
            interval,
            status: Arc::new(ArcSwap::from_pointee(ClusterStatusResponse::default())),
        }
    }

    /// The latest snapshot. It reads `NotReady` until the first poll completes.
    pub fn status(&self) -> SharedStatus {
        self.status.clone()
    }

    pub async fn run(self, drain: drain::Watch) {
        let shutdown = drain.signaled();
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => return,
                _ = interval.tick() => {}
            }
            match self.compute().await {
                Ok(status) => {
                    let prev = self.status.load();
                    if prev.phase != status.phase {
                        info!(
                            phase = ?status.phase,
                            reason = %status.reason,
                            "Cluster phase changed"
                        );
                    }
                    self.status.store(Arc::new(status));
                }
                Err(error) => warn!(%error, "Failed to compute cluster status"),
            }
        }
    }

    pub async fn compute(&self) -> Result<ClusterStatusResponse> {
        let cluster_managers = self.cluster_managers();
        let cluster_api = self.cluster_api().await?;
        let status = self.phase().await?;
        debug!(phase = ?status.phase, ?cluster_managers, "Computed cluster status");
        Ok(ClusterStatusResponse {
            cluster_managers,
            cluster_api,
            ..status
        })
    }

    async fn phase(&self) -> Result<ClusterStatusResponse> {
        let (feature_sets, helm, deployments) = {
            let registry = self.registry.read();
            (
                registry
                    .preferred(&GroupKind::new(FEATURE_GROUP, "FeatureSet"))
                    .cloned(),
                registry.has_group(HELM_GROUP),
                registry
                    .preferred(&GroupKind::new("apps", "Deployment"))
                    .cloned(),
            )
        };

        let Some(feature_sets) = feature_sets else {
            return Ok(phase(
                ClusterPhase::Inactive,
                reason::FEATURE_SETS_NOT_INSTALLED,
                "FeatureSets are not served by this cluster",
            ));
        };
        if !helm {
            return Ok(phase(
                ClusterPhase::NotReady,
                reason::FLUX_NOT_INSTALLED,
                "Flux Helm releases are not served by this cluster",
            ));
        }

        if let Some(deployments) = deployments {
            for name in FLUX_CONTROLLERS {
                let ready = self
                    .cluster
                    .get(&deployments, Some(FLUX_NAMESPACE), name)
                    .await?
                    .is_some_and(|d| is_workload_ready(&deployments.group_kind(), &d.data));
                if !ready {
                    return Ok(phase(
                        ClusterPhase::NotReady,
                        reason::FLUX_NOT_READY,
                        format!("Deployment {FLUX_NAMESPACE}/{name} is not ready"),
                    ));
                }
            }
        }

        let mut not_ready = Vec::new();
        for name in &self.required_feature_sets {
            let ready = self
                .cluster
                .get(&feature_sets, None, name)
                .await?
                .and_then(|s| s.data.pointer("/status/ready").and_then(Value::as_bool))
                .unwrap_or(false);
            if !ready {
                not_ready.push(name.as_str());
            }
        }
        if !not_ready.is_empty() {
            return Ok(phase(
                ClusterPhase::NotReady,
                reason::FEATURE_SET_NOT_READY,
                format!("Feature sets are not ready: {}", not_ready.join(", ")),
            ));
        }

        Ok(phase(ClusterPhase::Active, "", ""))
    }

    fn cluster_managers(&self) -> Vec<String> {
        let registry = self.registry.read();
        let mut managers = CLUSTER_MANAGERS
            .iter()
            .filter(|(group, _)| registry.has_group(group))
            .map(|(_, name)| name.to_string())
            .collect::<Vec<_>>();
        managers.dedup();
        managers
    }

    /// The Cluster API cluster visible from this cluster, if any. When several are visible the
    /// first by namespace and name is reported.
    async fn cluster_api(&self) -> Result<Option<CapiClusterInfo>> {
        let rid = self
            .registry
            .read()
            .preferred(&GroupKind::new(CAPI_GROUP, "Cluster"))
            .cloned();
        let Some(rid) = rid else {
            return Ok(None);
        };
        let mut clusters = self.cluster.list(&rid, None, None).await?;
        clusters.sort_by_key(|c| (c.namespace(), c.name_any()));
        Ok(clusters.first().map(|c| {
            let infra = c
                .data
                .pointer("/spec/infrastructureRef/kind")
                .and_then(Value::as_str)
                .unwrap_or_default();
            CapiClusterInfo {
                provider: provider(infra),
                namespace: c.namespace().unwrap_or_default(),
                cluster_name: c.name_any(),
            }
        }))
    }
}

/// `AWSManagedCluster` and `AWSCluster` are both `aws`.
fn provider(infra_kind: &str) -> String {
    let kind = infra_kind
        .strip_suffix("ManagedCluster")
        .or_else(|| infra_kind.strip_suffix("Cluster"))
        .unwrap_or(infra_kind);
    kind.to_ascii_lowercase()
}
