//! Generic projections of workloads: `GenericResource`, `GenericResourceService` and
//! `ResourceSummary`.

use crate::{
    authz::Attributes,
    calc::{self, Calculated},
    kstatus,
    locate::Source,
    quantity, Error, Renderer, Result,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DynamicObject, ResourceExt};
use std::cmp::Ordering;
use ui_server_core::{version, GroupKind, ResourceId};
use ui_server_k8s_api::{
    identity::UserInfo,
    ui::{
        ClusterMetadata, GenericResource, GenericResourceService, GenericResourceServiceSpec,
        GenericResourceSpec, ReleaseMetadata, ResourceSummary, ResourceSummarySpec, ResourceTotals,
    },
};
use ui_server_k8s_index::object_id;

const RELEASE_NAME_LABEL: &str = "app.kubernetes.io/instance";
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const HELM_NAME_ANNOTATION: &str = "meta.helm.sh/release-name";
const HELM_NAMESPACE_ANNOTATION: &str = "meta.helm.sh/release-namespace";
const HELM_CHART_LABEL: &str = "helm.sh/chart";

impl Renderer {
    /// Lists projections of every calculated workload in `namespace` that `user` may read.
    pub async fn list_generic_resources(
        &self,
        user: &UserInfo,
        namespace: Option<&str>,
    ) -> Result<Vec<GenericResource>> {
        let mut items = Vec::new();
        for (rid, obj) in self.workloads(user, namespace).await? {
            items.push(self.generic_resource(&rid, &obj)?);
        }
        items.sort_by(|a, b| compare(&a.spec.api_type, &a.metadata, &b.spec.api_type, &b.metadata));
        Ok(items)
    }

    /// Gets one projection by its `<kind>.<group>/<name>` name.
    pub async fn get_generic_resource(
        &self,
        user: &UserInfo,
        namespace: &str,
        name: &str,
    ) -> Result<GenericResource> {
        let src = self.named_workload(user, namespace, name).await?;
        self.generic_resource(&src.rid, &src.obj)
    }

    pub async fn list_generic_resource_services(
        &self,
        user: &UserInfo,
        namespace: Option<&str>,
    ) -> Result<Vec<GenericResourceService>> {
        let mut items = Vec::new();
        for (rid, obj) in self.workloads(user, namespace).await? {
            let src = Source {
                id: object_id(&obj)?,
                data: serde_json::to_value(&obj)?,
                rid,
                obj,
            };
            items.push(self.generic_resource_service(&src).await?);
        }
        items.sort_by(|a, b| compare(&a.spec.api_type, &a.metadata, &b.spec.api_type, &b.metadata));
        Ok(items)
    }

    pub async fn get_generic_resource_service(
        &self,
        user: &UserInfo,
        namespace: &str,
        name: &str,
    ) -> Result<GenericResourceService> {
        let src = self.named_workload(user, namespace, name).await?;
        self.generic_resource_service(&src).await
    }

    /// Aggregates instance counts and resources per calculated kind in `namespace`. Kinds the
    /// user may not list are left out.
    pub async fn list_resource_summaries(
        &self,
        user: &UserInfo,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceSummary>> {
        let mut items = Vec::new();
        for rid in self.calculated_types() {
            if !self
                .authorize(user, &Attributes::list(&rid, namespace))
                .await?
                .is_allowed()
            {
                continue;
            }
            let gk = rid.group_kind();
            let mut total = (quantity::Amounts::new(), quantity::Amounts::new());
            let mut app = (quantity::Amounts::new(), quantity::Amounts::new());
            let objs = self.cluster().list(&rid, namespace, None).await?;
            for obj in &objs {
                let data = serde_json::to_value(obj)?;
                if let Some(c) = calc::calculate(&gk, &data) {
                    quantity::add(&mut total.0, &c.total.requests);
                    quantity::add(&mut total.1, &c.total.limits);
                    quantity::add(&mut app.0, &c.app.requests);
                    quantity::add(&mut app.1, &c.app.limits);
                }
            }
            items.push(ResourceSummary {
                metadata: ObjectMeta {
                    name: Some(synthetic_name(&gk, None)),
                    namespace: namespace.map(Into::into),
                    ..Default::default()
                },
                spec: ResourceSummarySpec {
                    cluster: self.cluster_metadata(),
                    api_type: rid,
                    count: objs.len() as i64,
                    total_resource: totals(&total.0, &total.1),
                    app_resource: totals(&app.0, &app.1),
                },
            });
        }
        Ok(items)
    }

    /// Preferred versions of the served kinds that have a calculator.
    fn calculated_types(&self) -> Vec<ResourceId> {
        let registry = self.registry().read();
        let mut rids = calc::kinds()
            .filter_map(|gk| registry.preferred(&gk).cloned())
            .collect::<Vec<_>>();
        rids.sort_by(|a, b| {
            a.group
                .cmp(&b.group)
                .then_with(|| version::compare(&b.version, &a.version))
                .then_with(|| a.kind.cmp(&b.kind))
        });
        rids
    }

    async fn workloads(
        &self,
        user: &UserInfo,
        namespace: Option<&str>,
    ) -> Result<Vec<(ResourceId, DynamicObject)>> {
        let mut found = Vec::new();
        for rid in self.calculated_types() {
            let objs = self.cluster().list(&rid, namespace, None).await?;
            for obj in self.authorized(user, &rid, objs).await? {
                found.push((rid.clone(), obj));
            }
        }
        Ok(found)
    }

    async fn named_workload(&self, user: &UserInfo, namespace: &str, name: &str) -> Result<Source> {
        let (gk, obj_name) = parse_synthetic_name(name).ok_or_else(|| {
            Error::bad_request(format!(
                "invalid name {name:?}: expected <kind>.<group>/<name>"
            ))
        })?;
        if !calc::supports(&gk) {
            return Err(Error::NotFound(name.to_string()));
        }
        let rid = self.require(&gk.group, &gk.kind)?;
        let loc = ui_server_k8s_api::meta::ObjectLocator {
            resource: rid,
            reference: ui_server_k8s_api::meta::ObjectRef {
                namespace: namespace.to_string(),
                name: obj_name.to_string(),
            },
        };
        self.source(user, &loc).await
    }

    fn generic_resource(&self, rid: &ResourceId, obj: &DynamicObject) -> Result<GenericResource> {
        let gk = rid.group_kind();
        let data = serde_json::to_value(obj)?;
        let c = calc::calculate(&gk, &data).unwrap_or_default();
        Ok(GenericResource {
            metadata: projected_meta(&gk, obj),
            spec: GenericResourceSpec {
                cluster: self.cluster_metadata(),
                api_type: rid.clone(),
                name: obj.name_any(),
                status: kstatus::compute(&data),
                release: release(obj),
                ..spec_from(c)
            },
            status: data.get("status").cloned().unwrap_or_default(),
        })
    }

    async fn generic_resource_service(&self, src: &Source) -> Result<GenericResourceService> {
        let gk = src.rid.group_kind();
        Ok(GenericResourceService {
            metadata: projected_meta(&gk, &src.obj),
            spec: GenericResourceServiceSpec {
                cluster: self.cluster_metadata(),
                api_type: src.rid.clone(),
                name: src.obj.name_any(),
                facilities: self.facilities(src).await?,
            },
            status: kstatus::compute(&src.data),
        })
    }

    pub(crate) fn cluster_metadata(&self) -> ClusterMetadata {
        ClusterMetadata {
            name: self.config().cluster_name.clone(),
            uid: String::new(),
        }
    }
}

fn spec_from(c: Calculated) -> GenericResourceSpec {
    GenericResourceSpec {
        replicas: c.replicas,
        role_replicas: c.role_replicas,
        mode: c.mode,
        total_resource: totals(&c.total.requests, &c.total.limits),
        app_resource: totals(&c.app.requests, &c.app.limits),
        role_resource_limits: c
            .role_limits
            .iter()
            .map(|(role, a)| (role.clone(), quantity::to_list(a)))
            .collect(),
        role_resource_requests: c
            .role_requests
            .iter()
            .map(|(role, a)| (role.clone(), quantity::to_list(a)))
            .collect(),
        version: c.version,
        ..Default::default()
    }
}

fn totals(requests: &quantity::Amounts, limits: &quantity::Amounts) -> ResourceTotals {
    ResourceTotals {
        requests: quantity::to_list(requests),
        limits: quantity::to_list(limits),
    }
}

fn projected_meta(gk: &GroupKind, obj: &DynamicObject) -> ObjectMeta {
    ObjectMeta {
        name: Some(synthetic_name(gk, Some(&obj.name_any()))),
        namespace: obj.namespace(),
        uid: obj.uid(),
        creation_timestamp: obj.metadata.creation_timestamp.clone(),
        labels: obj.metadata.labels.clone(),
        annotations: obj.metadata.annotations.clone(),
        ..Default::default()
    }
}

/// `<kind>.<group>/<name>`, or `<kind>.<group>` for a whole kind.
pub(crate) fn synthetic_name(gk: &GroupKind, name: Option<&str>) -> String {
    let prefix = format!("{}.{}", gk.kind, gk.group);
    match name {
        Some(name) => format!("{prefix}/{name}"),
        None => prefix,
    }
}

fn parse_synthetic_name(name: &str) -> Option<(GroupKind, &str)> {
    let (prefix, name) = name.split_once('/')?;
    let (kind, group) = prefix.split_once('.')?;
    if kind.is_empty() || name.is_empty() {
        return None;
    }
    Some((GroupKind::new(group, kind), name))
}

fn release(obj: &DynamicObject) -> Option<ReleaseMetadata> {
    let labels = obj.labels();
    let annotations = obj.annotations();
    let name = annotations
        .get(HELM_NAME_ANNOTATION)
        .or_else(|| {
            (labels.get(MANAGED_BY_LABEL).map(String::as_str) == Some("Helm"))
                .then(|| labels.get(RELEASE_NAME_LABEL))
                .flatten()
        })?
        .clone();
    Some(ReleaseMetadata {
        name,
        namespace: annotations
            .get(HELM_NAMESPACE_ANNOTATION)
            .cloned()
            .unwrap_or_default(),
        chart: labels.get(HELM_CHART_LABEL).cloned().unwrap_or_default(),
    })
}

/// Orders by group, then newest apiVersion first, then kind, namespace and name.
pub(crate) fn compare(
    a_rid: &ResourceId,
    a: &ObjectMeta,
    b_rid: &ResourceId,
    b: &ObjectMeta,
) -> Ordering {
    a_rid
        .group
        .cmp(&b_rid.group)
        .then_with(|| version::compare(&b_rid.version, &a_rid.version))
        .then_with(|| a_rid.kind.cmp(&b_rid.kind))
        .then_with(|| a.namespace.cmp(&b.namespace))
        .then_with(|| a.name.cmp(&b.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ui_server_core::Scope;

    #[test]
    fn synthetic_names() {
        let gk = GroupKind::new("apps", "Deployment");
        assert_eq!(synthetic_name(&gk, Some("web")), "Deployment.apps/web");
        assert_eq!(
            parse_synthetic_name("Deployment.apps/web"),
            Some((gk, "web"))
        );
        assert_eq!(
            parse_synthetic_name("Pod./db-0"),
            Some((GroupKind::new("", "Pod"), "db-0"))
        );
        assert_eq!(parse_synthetic_name("web"), None);
    }

    #[test]
    fn ordering() {
        let rid = |g: &str, v: &str, k: &str| ResourceId::new(g, v, "x", k, Scope::Namespaced);
        let meta = |ns: &str, n: &str| ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(n.to_string()),
            ..Default::default()
        };
        let mut items = vec![
            (rid("apps", "v1beta1", "Deployment"), meta("a", "x")),
            (rid("", "v1", "Pod"), meta("b", "y")),
            (rid("apps", "v1", "Deployment"), meta("b", "a")),
            (rid("apps", "v1", "Deployment"), meta("a", "b")),
        ];
        items.sort_by(|(ra, a), (rb, b)| compare(ra, a, rb, b));
        let order = items
            .iter()
            .map(|(r, m)| format!("{}/{}/{:?}/{:?}", r.group, r.version, m.namespace, m.name))
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                r#"/v1/Some("b")/Some("y")"#,
                r#"apps/v1/Some("a")/Some("b")"#,
                r#"apps/v1/Some("b")/Some("a")"#,
                r#"apps/v1beta1/Some("a")/Some("x")"#,
            ]
        );
    }
}
