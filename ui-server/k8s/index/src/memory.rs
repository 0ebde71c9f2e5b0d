//! A [`ClusterReader`] over objects held in memory.

use crate::{ClusterReader, Result};
use ahash::AHashMap as HashMap;
use kube::api::{DynamicObject, ResourceExt};
use parking_lot::RwLock;
use ui_server_core::{GroupKind, ResourceId};
use ui_server_k8s_api::{labels::Map, Selector};

#[derive(Debug, Default)]
pub struct InMemoryCluster {
    objects: RwLock<HashMap<GroupKind, Vec<DynamicObject>>>,
}

impl InMemoryCluster {
    /// Inserts or replaces an object, keyed by kind, namespace and name.
    pub fn apply(&self, obj: DynamicObject) {
        let gk = group_kind(&obj);
        let mut objects = self.objects.write();
        let objs = objects.entry(gk).or_default();
        objs.retain(|o| o.namespace() != obj.namespace() || o.name_any() != obj.name_any());
        objs.push(obj);
    }

    /// Inserts an object given as JSON, which must carry `apiVersion` and `kind`.
    pub fn apply_json(&self, value: serde_json::Value) -> serde_json::Result<DynamicObject> {
        let obj = serde_json::from_value::<DynamicObject>(value)?;
        self.apply(obj.clone());
        Ok(obj)
    }

    pub fn delete(&self, gk: &GroupKind, namespace: Option<&str>, name: &str) {
        if let Some(objs) = self.objects.write().get_mut(gk) {
            objs.retain(|o| o.namespace().as_deref() != namespace || o.name_any() != name);
        }
    }
}

fn group_kind(obj: &DynamicObject) -> GroupKind {
    match &obj.types {
        Some(t) => GroupKind::from_api_version(&t.api_version, &t.kind),
        None => GroupKind::default(),
    }
}

#[async_trait::async_trait]
impl ClusterReader for InMemoryCluster {
    async fn list(
        &self,
        rid: &ResourceId,
        namespace: Option<&str>,
        selector: Option<&Selector>,
    ) -> Result<Vec<DynamicObject>> {
        let objects = self.objects.read();
        let Some(objs) = objects.get(&rid.group_kind()) else {
            return Ok(vec![]);
        };
        let empty = Map::new();
        Ok(objs
            .iter()
            .filter(|o| {
                namespace.is_none()
                    || !rid.is_namespaced()
                    || o.namespace().as_deref() == namespace
            })
            .filter(|o| {
                let labels = o.metadata.labels.as_ref().unwrap_or(&empty);
                selector.map_or(true, |s| s.matches_map(labels))
            })
            .cloned()
            .collect())
    }

    async fn get(
        &self,
        rid: &ResourceId,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        let objects = self.objects.read();
        Ok(objects.get(&rid.group_kind()).and_then(|objs| {
            objs.iter()
                .find(|o| {
                    o.name_any() == name
                        && (!rid.is_namespaced() || o.namespace().as_deref() == namespace)
                })
                .cloned()
        }))
    }
}
