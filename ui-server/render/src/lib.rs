//! Virtual resources synthesized from the object graph and live cluster state.
//!
//! Every renderer is a method on [`Renderer`], which holds the shared indexes. Projections of live
//! objects are only returned to callers that may `get` the underlying object.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod authz;
mod calc;
pub mod exec;
mod facilities;
mod generic;
mod identity;
pub mod kstatus;
mod layout;
mod locate;
mod podview;
pub mod quantity;
mod query;
mod rawgraph;
pub mod reports;
pub mod table;
pub mod template;


pub use self::{
    authz::{Attributes, Authorizer, Decision, KubeAuthorizer},
    reports::{ImageCache, ReportSnapshot},
    template::Templates,
};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Status, StatusDetails};
use std::{sync::Arc, time::Duration};
use ui_server_core::{GroupKind, ResourceId, SharedGraph};
use ui_server_graphql::GraphSchema;
use ui_server_k8s_index::{Catalog, SharedCluster, SharedRegistry};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("resource type {0} is not registered")]
    NotRegistered(String),

    #[error(transparent)]
    Upstream(kube::Error),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Debug)]
pub struct Config {
    pub cluster_name: String,
    pub grafana_url: Option<url::Url>,
    /// Caps GraphQL query depth and the nesting of layout blocks.
    pub max_depth: usize,
    pub image_cache_size: u64,
    pub image_cache_ttl: Duration,
}

/// Renders virtual resources from the object graph and the cluster.
#[derive(Clone)]
pub struct Renderer {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    cluster: SharedCluster,
    registry: SharedRegistry,
    graph: SharedGraph,
    schema: GraphSchema,
    catalog: Arc<Catalog>,
    authz: Arc<dyn Authorizer>,
    templates: Templates,
    images: ImageCache,
}

// === impl Error ===

impl Error {
    /// The HTTP status code the error is reported with.
    pub fn code(&self) -> u16 {
        match self {
            Self::NotFound(_) | Self::NotRegistered(_) => 404,
            Self::BadRequest(_) => 400,
            Self::Forbidden(_) => 403,
            Self::Upstream(kube::Error::Api(rsp)) => rsp.code,
            Self::Upstream(_) => 502,
            Self::Internal(_) => 500,
        }
    }

    /// The machine-readable reason. API server errors keep the reason they were reported with.
    pub fn reason(&self) -> &str {
        match self {
            Self::NotFound(_) | Self::NotRegistered(_) => "NotFound",
            Self::BadRequest(_) => "BadRequest",
            Self::Forbidden(_) => "Forbidden",
            Self::Upstream(kube::Error::Api(rsp)) if !rsp.reason.is_empty() => &rsp.reason,
            Self::Upstream(_) => "ServiceUnavailable",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Describes the error as a `meta/v1` `Status`.
    pub fn to_status(&self) -> Status {
        Status {
            status: Some("Failure".to_string()),
            code: Some(self.code().into()),
            reason: Some(self.reason().to_string()),
            message: Some(self.to_string()),
            details: match self {
                Self::NotFound(name) => Some(StatusDetails {
                    name: Some(name.clone()),
                    ..Default::default()
                }),
                _ => None,
            },
            ..Default::default()
        }
    }

    pub(crate) fn bad_request(msg: impl ToString) -> Self {
        Self::BadRequest(msg.to_string())
    }

    pub(crate) fn internal(msg: impl ToString) -> Self {
        Self::Internal(msg.to_string())
    }
}

impl From<ui_server_k8s_index::Error> for Error {
    fn from(error: ui_server_k8s_index::Error) -> Self {
        use ui_server_k8s_index::Error as E;
        match error {
            E::NotRegistered(rid) => Self::NotRegistered(rid),
            E::NotFound(what) => Self::NotFound(what),
            E::Upstream(e) => Self::Upstream(e),
            e @ (E::BadRule { .. } | E::InvalidObject(_)) => Self::Internal(e.to_string()),
        }
    }
}

impl From<kube::Error> for Error {
    fn from(error: kube::Error) -> Self {
        Self::Upstream(error)
    }
}

impl From<ui_server_graphql::Error> for Error {
    fn from(error: ui_server_graphql::Error) -> Self {
        Self::Internal(error.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Internal(format!("failed to encode object: {error}"))
    }
}

impl From<minijinja::Error> for Error {
    fn from(error: minijinja::Error) -> Self {
        Self::Internal(format!("template: {error}"))
    }
}

// === impl Renderer ===

impl Renderer {
    pub fn new(
        config: Config,
        cluster: SharedCluster,
        registry: SharedRegistry,
        graph: SharedGraph,
        catalog: Arc<Catalog>,
        authz: Arc<dyn Authorizer>,
    ) -> Self {
        let schema = ui_server_graphql::build(graph.clone(), config.max_depth);
        let images = ImageCache::new(config.image_cache_size, config.image_cache_ttl);
        Self {
            inner: Arc::new(Inner {
                config,
                cluster,
                registry,
                graph,
                schema,
                catalog,
                authz,
                templates: Templates::new(),
                images,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn schema(&self) -> &GraphSchema {
        &self.inner.schema
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.inner.graph
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.inner.registry
    }

    pub(crate) fn cluster(&self) -> &SharedCluster {
        &self.inner.cluster
    }

    pub(crate) fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub(crate) fn templates(&self) -> &Templates {
        &self.inner.templates
    }

    /// The preferred version of a kind, if the cluster serves it.
    pub(crate) fn preferred(&self, group: &str, kind: &str) -> Option<ResourceId> {
        self.inner
            .registry
            .read()
            .preferred(&GroupKind::new(group, kind))
            .cloned()
    }

    pub(crate) fn require(&self, group: &str, kind: &str) -> Result<ResourceId> {
        self.preferred(group, kind)
            .ok_or_else(|| Error::NotRegistered(GroupKind::new(group, kind).to_string()))
    }
}
