//! Status derived from the cluster's installed features.
//!
//! * [`FeatureController`] watches `Feature`s, derives each one's status from live workloads
//!   and Flux `HelmRelease`s, and rolls the result up into the owning `FeatureSet`.
//! * [`ClaimController`] publishes the `features` `ClusterClaim` for fleet managers.
//! * [`ClusterStatusPoller`] periodically recomputes the cluster's phase.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod claim;
pub mod cluster;
pub mod feature;

#[cfg(test)]
mod tests;

pub use self::{
    claim::{feature_claim, ClaimController},
    cluster::{ClusterStatusPoller, SharedStatus},
    feature::{roll_up, FeatureController, FeatureEvaluator},
};

pub const HELM_GROUP: &str = "helm.toolkit.fluxcd.io";
pub const HELM_RELEASE_KIND: &str = "HelmRelease";
pub const FEATURE_GROUP: &str = "ui.k8s.appscode.com";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Index(#[from] ui_server_k8s_index::Error),

    #[error("failed to finalize feature: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("failed to encode cluster claim: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid status: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Whether an error reports that the object is gone.
pub(crate) fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(rsp) if rsp.code == 404)
}
