use crate::{authz::Attributes, quantity, Renderer, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::ResourceExt;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use ui_server_k8s_api::identity::{
    ClusterIdentity, ClusterIdentityStatus, KubernetesInfo, NamespaceAccessReviewSpec,
    NamespaceAccessReviewStatus, NodeStats, ProductInfo, SiteInfo, UserInfo, WhoAmI,
    WhoAmIResponse,
};

/// Set on namespaces that belong to a Rancher project.
const RANCHER_PROJECT_LABEL: &str = "field.cattle.io/projectId";

const PRODUCT_NAME: &str = "ui-server";

impl Renderer {
    pub fn whoami(&self, user: &UserInfo) -> WhoAmI {
        WhoAmI {
            metadata: ObjectMeta::default(),
            response: Some(WhoAmIResponse { user: user.clone() }),
        }
    }

    /// Identifies the cluster by the UID of its `kube-system` namespace.
    pub async fn cluster_identity(&self) -> Result<ClusterIdentity> {
        let rid = self.require("", "Namespace")?;
        let uid = self
            .cluster()
            .get(&rid, None, "kube-system")
            .await?
            .and_then(|ns| ns.uid())
            .unwrap_or_default();
        Ok(ClusterIdentity {
            metadata: ObjectMeta {
                name: Some(self.config().cluster_name.clone()),
                ..Default::default()
            },
            status: ClusterIdentityStatus {
                uid,
                name: self.config().cluster_name.clone(),
            },
        })
    }

    /// Describes this server and the cluster's nodes.
    pub async fn site_info(&self) -> Result<SiteInfo> {
        let identity = self.cluster_identity().await?;
        let mut capacity = quantity::Amounts::new();
        let mut allocatable = quantity::Amounts::new();
        let mut versions = BTreeSet::new();
        let mut count = 0;
        if let Some(rid) = self.preferred("", "Node") {
            for node in self.cluster().list(&rid, None, None).await? {
                count += 1;
                let status = node.data.get("status");
                let field = |name: &str| status.and_then(|s| s.get(name));
                quantity::add(&mut capacity, &quantity::amounts(field("capacity")));
                quantity::add(&mut allocatable, &quantity::amounts(field("allocatable")));
                let version = field("nodeInfo")
                    .and_then(|i| i.get("kubeletVersion"))
                    .and_then(Value::as_str);
                if let Some(v) = version {
                    versions.insert(v.to_string());
                }
            }
        }

        Ok(SiteInfo {
            metadata: identity.metadata,
            product: ProductInfo {
                product_name: PRODUCT_NAME.to_string(),
                product_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            kubernetes: KubernetesInfo {
                cluster: identity.status,
                kubelet_versions: versions.into_iter().collect(),
                node_stats: NodeStats {
                    count,
                    capacity: quantity::to_list(&capacity),
                    allocatable: quantity::to_list(&allocatable),
                },
            },
        })
    }

    /// Lists the namespaces in which `user` holds every requested permission.
    pub async fn namespace_access_review(
        &self,
        user: &UserInfo,
        spec: &NamespaceAccessReviewSpec,
    ) -> Result<NamespaceAccessReviewStatus> {
        for attrs in &spec.non_resource_attributes {
            let decision = self
                .authorize(user, &Attributes::NonResource(attrs.clone()))
                .await?;
            if !decision.is_allowed() {
                return Ok(NamespaceAccessReviewStatus::default());
            }
        }

        let rid = self.require("", "Namespace")?;
        let mut namespaces = self.cluster().list(&rid, None, None).await?;
        namespaces.sort_by_key(|ns| ns.name_any());

        let mut status = NamespaceAccessReviewStatus::default();
        let mut projects = BTreeMap::<String, Vec<String>>::new();
        'namespaces: for ns in namespaces {
            let name = ns.name_any();
            for attrs in &spec.resource_attributes {
                let mut attrs = attrs.clone();
                attrs.namespace = Some(name.clone());
                let decision = self.authorize(user, &Attributes::Resource(attrs)).await?;
                if !decision.is_allowed() {
                    continue 'namespaces;
                }
            }
            if let Some(project) = ns.labels().get(RANCHER_PROJECT_LABEL) {
                projects.entry(project.clone()).or_default().push(name.clone());
            }
            status.namespaces.push(name);
        }
        status.projects = projects;
        Ok(status)
    }
}
