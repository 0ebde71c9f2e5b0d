//! Discovery documents for the served groups, as the Kubernetes API server aggregates them.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    APIGroup, APIGroupList, APIResource, APIResourceList, GroupVersionForDiscovery,
};
use ui_server_k8s_api::{
    cluster::ClusterStatus,
    identity::{
        ClusterIdentity, InboxTokenRequest, SelfSubjectNamespaceAccessReview, SiteInfo, WhoAmI,
    },
    meta::{Render, RenderDashboard, RenderPage, RenderRawGraph, ResourceQuery},
    reports::{CveReport, FalcoReport, Image, PolicyReport},
    ui::{GenericResource, GenericResourceService, PodView, ResourceSummary},
    VirtualResource, VERSION,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ServedResource {
    pub group: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
    pub namespaced: bool,
    pub verbs: &'static [&'static str],
}

const CREATE: &[&str] = &["create"];
const READ: &[&str] = &["get", "list"];
const LIST: &[&str] = &["list"];

fn served<T: VirtualResource>(verbs: &'static [&'static str]) -> ServedResource {
    ServedResource {
        group: T::GROUP,
        kind: T::KIND,
        plural: T::PLURAL,
        namespaced: T::NAMESPACED,
        verbs,
    }
}

/// Every virtual resource with the verbs it supports.
pub(crate) fn resources() -> Vec<ServedResource> {
    vec![
        served::<WhoAmI>(CREATE),
        served::<ClusterIdentity>(READ),
        served::<SiteInfo>(READ),
        served::<SelfSubjectNamespaceAccessReview>(CREATE),
        served::<InboxTokenRequest>(CREATE),
        served::<GenericResource>(READ),
        served::<GenericResourceService>(READ),
        served::<ResourceSummary>(LIST),
        served::<PodView>(READ),
        served::<Render>(CREATE),
        served::<RenderPage>(CREATE),
        served::<RenderDashboard>(CREATE),
        served::<RenderRawGraph>(CREATE),
        served::<ResourceQuery>(CREATE),
        served::<ClusterStatus>(READ),
        served::<PolicyReport>(CREATE),
        served::<CveReport>(CREATE),
        served::<Image>(CREATE),
        served::<FalcoReport>(CREATE),
    ]
}

pub(crate) fn lookup(group: &str, plural: &str) -> Option<ServedResource> {
    resources()
        .into_iter()
        .find(|r| r.group == group && r.plural == plural)
}

fn groups() -> Vec<&'static str> {
    let mut groups = resources().into_iter().map(|r| r.group).collect::<Vec<_>>();
    groups.sort_unstable();
    groups.dedup();
    groups
}

fn api_group(name: &str) -> APIGroup {
    let version = GroupVersionForDiscovery {
        group_version: format!("{name}/{VERSION}"),
        version: VERSION.to_string(),
    };
    APIGroup {
        name: name.to_string(),
        preferred_version: Some(version.clone()),
        versions: vec![version],
        server_address_by_client_cidrs: None,
    }
}

pub(crate) fn group_list() -> APIGroupList {
    APIGroupList {
        groups: groups().into_iter().map(api_group).collect(),
    }
}

pub(crate) fn group(name: &str) -> Option<APIGroup> {
    groups().contains(&name).then(|| api_group(name))
}

pub(crate) fn resource_list(group: &str, version: &str) -> Option<APIResourceList> {
    if version != VERSION || !groups().contains(&group) {
        return None;
    }
    let resources = resources()
        .into_iter()
        .filter(|r| r.group == group)
        .map(|r| APIResource {
            name: r.plural.to_string(),
            singular_name: r.kind.to_ascii_lowercase(),
            namespaced: r.namespaced,
            kind: r.kind.to_string(),
            verbs: r.verbs.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        })
        .collect();
    Some(APIResourceList {
        group_version: format!("{group}/{version}"),
        resources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lists_served_groups() {
        let names = group_list()
            .groups
            .into_iter()
            .map(|g| g.name)
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "core.k8s.appscode.com",
                "falco.k8s.appscode.com",
                "identity.k8s.appscode.com",
                "meta.k8s.appscode.com",
                "policy.k8s.appscode.com",
                "reports.scanner.appscode.com",
            ]
        );
        assert!(group("apps").is_none());
    }

    #[test]
    fn describes_group_resources() {
        let list = resource_list("reports.scanner.appscode.com", "v1alpha1")
            .expect("group must be served");
        let names = list
            .resources
            .iter()
            .map(|r| (r.name.as_str(), r.kind.as_str(), r.verbs.clone()))
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                ("cvereports", "CVEReport", vec!["create".to_string()]),
                ("images", "Image", vec!["create".to_string()]),
            ]
        );
        assert!(resource_list("reports.scanner.appscode.com", "v1").is_none());

        let identity = resource_list("identity.k8s.appscode.com", "v1alpha1")
            .expect("group must be served");
        let site = identity
            .resources
            .iter()
            .find(|r| r.name == "siteinfos")
            .expect("site info must be listed");
        assert_eq!(site.verbs, vec!["get".to_string(), "list".to_string()]);
        assert!(!site.namespaced);
    }
}
