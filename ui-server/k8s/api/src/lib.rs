#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cluster;
pub mod descriptor;
pub mod feature;
pub mod identity;
pub mod labels;
pub mod layout;
pub mod meta;
pub mod reports;
pub mod ui;

pub use self::labels::{Labels, Selector};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{Namespace, Pod, Secret, Service},
    },
    apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference},
};
pub use kube::api::{DynamicObject, ResourceExt, TypeMeta};
use serde::Serialize;

pub const IDENTITY_GROUP: &str = "identity.k8s.appscode.com";
pub const CORE_GROUP: &str = "core.k8s.appscode.com";
pub const META_GROUP: &str = "meta.k8s.appscode.com";
pub const POLICY_GROUP: &str = "policy.k8s.appscode.com";
pub const REPORTS_GROUP: &str = "reports.scanner.appscode.com";
pub const FALCO_GROUP: &str = "falco.k8s.appscode.com";
pub const VERSION: &str = "v1alpha1";

/// A resource served by the API server that is not backed by storage.
pub trait VirtualResource: Serialize {
    const GROUP: &'static str;
    const KIND: &'static str;
    const PLURAL: &'static str;
    const NAMESPACED: bool;

    fn api_version() -> String {
        format!("{}/{}", Self::GROUP, VERSION)
    }

    /// Serializes the object with its `apiVersion` and `kind` set.
    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("apiVersion".into(), Self::api_version().into());
            obj.insert("kind".into(), Self::KIND.into());
        }
        Ok(value)
    }

    fn list_json<'a>(
        items: impl IntoIterator<Item = &'a Self>,
    ) -> serde_json::Result<serde_json::Value>
    where
        Self: 'a,
    {
        let items = items
            .into_iter()
            .map(|i| i.to_json())
            .collect::<serde_json::Result<Vec<_>>>()?;
        Ok(serde_json::json!({
            "apiVersion": Self::api_version(),
            "kind": format!("{}List", Self::KIND),
            "metadata": {},
            "items": items,
        }))
    }
}

macro_rules! virtual_resources {
    ($($ty:ty => ($group:expr, $kind:literal, $plural:literal, $ns:literal)),+ $(,)?) => {
        $(
            impl VirtualResource for $ty {
                const GROUP: &'static str = $group;
                const KIND: &'static str = $kind;
                const PLURAL: &'static str = $plural;
                const NAMESPACED: bool = $ns;
            }
        )+
    };
}

virtual_resources! {
    identity::WhoAmI => (IDENTITY_GROUP, "WhoAmI", "whoamis", false),
    identity::ClusterIdentity => (IDENTITY_GROUP, "ClusterIdentity", "clusteridentities", false),
    identity::SiteInfo => (IDENTITY_GROUP, "SiteInfo", "siteinfos", false),
    identity::SelfSubjectNamespaceAccessReview => (
        IDENTITY_GROUP,
        "SelfSubjectNamespaceAccessReview",
        "selfsubjectnamespaceaccessreviews",
        false
    ),
    identity::InboxTokenRequest => (
        IDENTITY_GROUP, "InboxTokenRequest", "inboxtokenrequests", false
    ),
    ui::GenericResource => (CORE_GROUP, "GenericResource", "genericresources", true),
    ui::GenericResourceService => (
        CORE_GROUP, "GenericResourceService", "genericresourceservices", true
    ),
    ui::ResourceSummary => (CORE_GROUP, "ResourceSummary", "resourcesummaries", true),
    ui::PodView => (CORE_GROUP, "PodView", "podviews", true),
    meta::Render => (META_GROUP, "Render", "renders", false),
    meta::RenderPage => (META_GROUP, "RenderPage", "renderpages", false),
    meta::RenderDashboard => (META_GROUP, "RenderDashboard", "renderdashboards", false),
    meta::RenderRawGraph => (META_GROUP, "RenderRawGraph", "renderrawgraphs", false),
    meta::ResourceQuery => (META_GROUP, "ResourceQuery", "resourcequeries", false),
    cluster::ClusterStatus => (META_GROUP, "ClusterStatus", "clusterstatuses", false),
    reports::PolicyReport => (POLICY_GROUP, "PolicyReport", "policyreports", false),
    reports::CveReport => (REPORTS_GROUP, "CVEReport", "cvereports", false),
    reports::Image => (REPORTS_GROUP, "Image", "images", false),
    reports::FalcoReport => (FALCO_GROUP, "FalcoReport", "falcoreports", false),
}
