//! Publishes the `features` cluster claim.

use crate::Result;
use kube::{
    api::{Api, ListParams, Patch, PatchParams, ResourceExt},
    Client,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use ui_server_core::GroupKind;
use ui_server_k8s_api::feature::{
    ClusterClaim, ClusterClaimSpec, Feature, FeatureClaim, FEATURES_CLAIM,
};
use ui_server_k8s_index::SharedRegistry;

const CLAIM_GROUP: &str = "cluster.open-cluster-management.io";
const FIELD_MANAGER: &str = "ui-server";
const RESYNC: Duration = Duration::from_secs(5 * 60);

/// Rewrites the claim whenever a feature is reconciled, and periodically.
pub struct ClaimController {
    client: Client,
    registry: SharedRegistry,
    notify: Arc<Notify>,
}

/// Sorts features into enabled (and managed), externally managed and disabled.
pub fn feature_claim(features: &[Feature]) -> FeatureClaim {
    let mut claim = FeatureClaim::default();
    for f in features {
        let status = f.status.clone().unwrap_or_default();
        let bucket = match (status.enabled, status.managed) {
            (Some(true), Some(true)) => &mut claim.enabled_features,
            (Some(true), _) => &mut claim.externally_managed_features,
            _ => &mut claim.disabled_features,
        };
        bucket.push(f.name_any());
    }
    for bucket in [
        &mut claim.enabled_features,
        &mut claim.externally_managed_features,
        &mut claim.disabled_features,
    ] {
        bucket.sort();
        bucket.dedup();
    }
    claim
}

// === impl ClaimController ===

impl ClaimController {
    pub fn new(client: Client, registry: SharedRegistry, notify: Arc<Notify>) -> Self {
        Self {
            client,
            registry,
            notify,
        }
    }

    pub async fn run(self, drain: drain::Watch) {
        let shutdown = drain.signaled();
        tokio::pin!(shutdown);
        let mut resync = tokio::time::interval(RESYNC);
        resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut last = None;
        loop {
            tokio::select! {
                _ = &mut shutdown => return,
                _ = resync.tick() => {}
                _ = self.notify.notified() => {}
            }
            match self.sync(last.as_ref()).await {
                Ok(claim) => last = claim.or(last),
                Err(error) => warn!(%error, "Failed to update the features cluster claim"),
            }
        }
    }

    /// Applies the claim if it changed since `last`, returning the applied value.
    async fn sync(&self, last: Option<&String>) -> Result<Option<String>> {
        let registered = self
            .registry
            .read()
            .is_registered(&GroupKind::new(CLAIM_GROUP, "ClusterClaim"));
        if !registered {
            debug!("ClusterClaims are not served");
            return Ok(None);
        }

        let features = Api::<Feature>::all(self.client.clone())
            .list(&ListParams::default())
            .await?
            .items;
        let value = serde_yaml::to_string(&feature_claim(&features))?;
        if last == Some(&value) {
            return Ok(None);
        }

        let claim = ClusterClaim::new(FEATURES_CLAIM, ClusterClaimSpec { value: value.clone() });
        Api::<ClusterClaim>::all(self.client.clone())
            .patch(
                FEATURES_CLAIM,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&claim),
            )
            .await?;
        info!(features = features.len(), "Updated the features cluster claim");
        Ok(Some(value))
    }
}
