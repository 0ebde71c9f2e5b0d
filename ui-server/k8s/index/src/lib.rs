//! Object graph indexing.
//!
//! The index discovers every listable resource type served by the cluster, watches the types that
//! participate in connection rules, and keeps the shared [`ObjectGraph`] up to date:
//!
//! ```text
//! [ discovery ] -(new type)-> [ reconciler per type ] -(watch event)-> [ evaluator ] -> [ graph ]
//! ```
//!
//! Connection rules come from resource descriptors. Each rule is evaluated both from its source
//! type (forward) and from its target type (reverse) so a change on either side refreshes the edge.
//!
//! [`ObjectGraph`]: ui_server_core::ObjectGraph

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod catalog;
pub mod cluster;
pub mod discovery;
mod evaluator;
pub mod jsonpath;
pub mod memory;
pub mod metrics;
pub mod reconciler;
pub mod refs;
pub mod registry;
pub mod rules;


pub use self::{
    catalog::Catalog,
    cluster::{ClusterReader, KubeCluster, SharedCluster},
    evaluator::{object_id, Evaluator},
    registry::{Registry, SharedRegistry},
    rules::{Direction, Rule, RuleSet},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("resource type {0} is not registered")]
    NotRegistered(String),

    #[error("invalid connection rule {rule}: {reason}")]
    BadRule { rule: String, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error(transparent)]
    Upstream(#[from] kube::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn bad_rule(rule: &str, reason: impl ToString) -> Self {
        Self::BadRule {
            rule: rule.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Errors that describe the absence of something rather than a failure.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::NotRegistered(_) | Self::NotFound(_))
    }
}
