//! Resolving request sources and locating connected objects.

use crate::{Error, Renderer, Result};
use kube::api::{DynamicObject, ResourceExt};
use serde_json::json;
use tracing::debug;
use ui_server_core::{GroupKind, ObjectId, ResourceId};
use ui_server_k8s_api::{
    descriptor::{Requirement, ResourceLocator},
    identity::UserInfo,
    meta::ObjectLocator,
};
use ui_server_k8s_index::object_id;

/// A live object named by a request.
pub(crate) struct Source {
    pub rid: ResourceId,
    pub id: ObjectId,
    pub obj: DynamicObject,
    pub data: serde_json::Value,
}

impl Renderer {
    /// Fetches the object a request names, checking that `user` may read it.
    pub(crate) async fn source(&self, user: &UserInfo, loc: &ObjectLocator) -> Result<Source> {
        let want = &loc.resource;
        let rid = {
            let registry = self.registry().read();
            if want.name.is_empty() {
                registry.preferred(&want.group_kind()).cloned()
            } else {
                registry
                    .by_resource(&want.group, &want.version, &want.name)
                    .cloned()
            }
        }
        .ok_or_else(|| Error::NotRegistered(want.to_string()))?;

        let name = &loc.reference.name;
        if name.is_empty() {
            return Err(Error::bad_request("source name is required"));
        }
        let ns = &loc.reference.namespace;
        if rid.is_namespaced() && ns.is_empty() {
            return Err(Error::bad_request(format!("{} requires a namespace", rid.kind)));
        }
        self.check_get(user, &rid, ns, name).await?;

        let obj = self
            .cluster()
            .get(&rid, Some(ns.as_str()).filter(|ns| !ns.is_empty()), name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {ns}/{name}", rid.kind)))?;
        let id = object_id(&obj)?;
        let data = serde_json::to_value(&obj)?;
        Ok(Source { rid, id, obj, data })
    }

    /// Finds the objects of the locator's kind connected to `src`.
    pub(crate) async fn locate(
        &self,
        src: &ObjectId,
        locator: &ResourceLocator,
    ) -> Result<Vec<ObjectId>> {
        let target = &locator.target;
        if let Some(raw) = locator.query.raw.as_deref() {
            let vars = json!({
                "src": src.oid().as_str(),
                "targetGroup": target.group,
                "targetKind": target.kind,
            });
            return Ok(ui_server_graphql::find_refs(self.schema(), raw, vars).await?);
        }
        let Some(label) = locator.query.by_label else {
            return Err(Error::bad_request("locator query needs byLabel or raw"));
        };
        let mut links = self.graph().read().links(&src.oid(), label);
        Ok(links.remove(target).unwrap_or_default())
    }

    /// Fetches located objects, skipping those that no longer exist or whose kind isn't served.
    pub(crate) async fn fetch(&self, ids: &[ObjectId]) -> Result<Vec<DynamicObject>> {
        let mut objs = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(rid) = self.preferred(&id.group, &id.kind) else {
                continue;
            };
            match self.cluster().get(&rid, id.namespace(), &id.name).await? {
                Some(obj) => objs.push(obj),
                None => debug!(%id, "Located object is gone"),
            }
        }
        Ok(objs)
    }

    /// Keeps the objects `user` may `get`.
    pub(crate) async fn authorized(
        &self,
        user: &UserInfo,
        rid: &ResourceId,
        objs: Vec<DynamicObject>,
    ) -> Result<Vec<DynamicObject>> {
        let mut allowed = Vec::with_capacity(objs.len());
        for obj in objs {
            let ns = obj.namespace().unwrap_or_default();
            if self.can_get(user, rid, &ns, &obj.name_any()).await? {
                allowed.push(obj);
            }
        }
        Ok(allowed)
    }

    /// Whether a requirement holds for the source: its condition renders `true` and its
    /// locator finds at least one object. Absent parts hold trivially.
    pub(crate) async fn satisfied(
        &self,
        req: &Requirement,
        src: &ObjectId,
        data: &serde_json::Value,
    ) -> Result<bool> {
        if let Some(cond) = &req.condition {
            if !self.templates().is_true(cond, data)? {
                return Ok(false);
            }
        }
        if let Some(locator) = &req.connected {
            if !self.is_served(&locator.target) {
                return Ok(false);
            }
            if self.locate(src, locator).await?.is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn is_served(&self, gk: &GroupKind) -> bool {
        self.registry().read().is_registered(gk)
    }
}
