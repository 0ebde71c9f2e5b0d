use crate::{Error, Result};
use kube::{
    api::{Api, ApiResource, DynamicObject, ListParams, TypeMeta},
    Client,
};
use std::sync::Arc;
use ui_server_core::ResourceId;
use ui_server_k8s_api::Selector;

pub type SharedCluster = Arc<dyn ClusterReader>;

/// Read access to cluster objects of dynamically discovered types.
///
/// Returned objects always carry their `apiVersion` and `kind`.
#[async_trait::async_trait]
pub trait ClusterReader: Send + Sync + 'static {
    /// Lists objects of `rid`. A `None` namespace lists across all namespaces.
    async fn list(
        &self,
        rid: &ResourceId,
        namespace: Option<&str>,
        selector: Option<&Selector>,
    ) -> Result<Vec<DynamicObject>>;

    async fn get(
        &self,
        rid: &ResourceId,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>>;
}

#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

pub fn api_resource(rid: &ResourceId) -> ApiResource {
    ApiResource {
        group: rid.group.clone(),
        version: rid.version.clone(),
        api_version: rid.api_version(),
        kind: rid.kind.clone(),
        plural: rid.name.clone(),
    }
}

/// A 404 from a type's collection endpoint means the type is no longer served.
pub fn not_served(rid: &ResourceId, error: kube::Error) -> Error {
    match error {
        kube::Error::Api(rsp) if rsp.code == 404 => Error::NotRegistered(rid.to_string()),
        error => Error::Upstream(error),
    }
}

pub(crate) fn stamp(rid: &ResourceId, mut obj: DynamicObject) -> DynamicObject {
    if obj.types.is_none() {
        obj.types = Some(TypeMeta {
            api_version: rid.api_version(),
            kind: rid.kind.clone(),
        });
    }
    obj
}

// === impl KubeCluster ===

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api(&self, rid: &ResourceId, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = api_resource(rid);
        match namespace.filter(|_| rid.is_namespaced()) {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }
}

#[async_trait::async_trait]
impl ClusterReader for KubeCluster {
    async fn list(
        &self,
        rid: &ResourceId,
        namespace: Option<&str>,
        selector: Option<&Selector>,
    ) -> Result<Vec<DynamicObject>> {
        let mut params = ListParams::default();
        if let Some(sel) = selector.filter(|s| !s.is_empty()) {
            params = params.labels(&sel.to_string());
        }
        let list = self
            .api(rid, namespace)
            .list(&params)
            .await
            .map_err(|e| not_served(rid, e))?;
        Ok(list.items.into_iter().map(|o| stamp(rid, o)).collect())
    }

    async fn get(
        &self,
        rid: &ResourceId,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        let obj = self
            .api(rid, namespace)
            .get_opt(name)
            .await
            .map_err(|e| not_served(rid, e))?;
        Ok(obj.map(|o| stamp(rid, o)))
    }
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}
