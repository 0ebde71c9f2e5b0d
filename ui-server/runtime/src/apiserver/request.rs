use hyper::{http, HeaderMap, Method};
use std::collections::BTreeMap;
use ui_server_k8s_api::identity::UserInfo;

const USER_HEADER: &str = "x-remote-user";
const GROUP_HEADER: &str = "x-remote-group";
const EXTRA_HEADER_PREFIX: &str = "x-remote-extra-";

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Route {
    /// `/apis`
    Groups,
    /// `/apis/<group>`
    Group(String),
    /// `/apis/<group>/<version>`
    Resources { group: String, version: String },
    Resource(ResourceRequest),
    GraphQl,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ResourceRequest {
    pub group: String,
    pub version: String,
    pub plural: String,
    pub namespace: Option<String>,
    pub name: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Verb {
    Get,
    List,
    Create,
}

// === impl Route ===

impl Route {
    pub(crate) fn parse(path: &str) -> Option<Self> {
        let segments = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        let owned = |i: usize| segments[i].to_string();
        match segments.as_slice() {
            ["graphql"] => Some(Self::GraphQl),
            ["apis"] => Some(Self::Groups),
            ["apis", _] => Some(Self::Group(owned(1))),
            ["apis", _, _] => Some(Self::Resources {
                group: owned(1),
                version: owned(2),
            }),
            ["apis", _, _, "namespaces", _, _, rest @ ..] if rest.len() <= 1 => {
                Some(Self::Resource(ResourceRequest {
                    group: owned(1),
                    version: owned(2),
                    namespace: Some(owned(4)),
                    plural: owned(5),
                    name: rest.first().map(|n| n.to_string()),
                }))
            }
            ["apis", _, _, _, rest @ ..] if rest.len() <= 1 => {
                Some(Self::Resource(ResourceRequest {
                    group: owned(1),
                    version: owned(2),
                    plural: owned(3),
                    namespace: None,
                    name: rest.first().map(|n| n.to_string()),
                }))
            }
            _ => None,
        }
    }
}

// === impl ResourceRequest ===

impl ResourceRequest {
    pub(crate) fn verb(&self, method: &Method) -> Option<Verb> {
        match (method, &self.name) {
            (&Method::GET, Some(_)) => Some(Verb::Get),
            (&Method::GET, None) => Some(Verb::List),
            (&Method::POST, None) => Some(Verb::Create),
            _ => None,
        }
    }
}

// === impl Verb ===

impl Verb {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
        }
    }
}

/// Reads the caller's identity from the headers set by the front proxy.
pub(crate) fn user_info(headers: &HeaderMap) -> Option<UserInfo> {
    let username = headers.get(USER_HEADER)?.to_str().ok()?.to_string();
    if username.is_empty() {
        return None;
    }
    let groups = headers
        .get_all(GROUP_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(Into::into)
        .collect();
    let mut extra = BTreeMap::<String, Vec<String>>::new();
    for (name, value) in headers {
        let Some(key) = name.as_str().strip_prefix(EXTRA_HEADER_PREFIX) else {
            continue;
        };
        if let Ok(value) = value.to_str() {
            extra.entry(key.to_string()).or_default().push(value.to_string());
        }
    }
    Some(UserInfo {
        username,
        uid: String::new(),
        groups,
        extra,
    })
}

/// Whether the client asked for a `meta.k8s.io` `Table`.
pub(crate) fn wants_table(headers: &HeaderMap) -> bool {
    headers
        .get_all(http::header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .any(|param| param.trim() == "as=Table")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_routes() {
        assert_eq!(Route::parse("/apis"), Some(Route::Groups));
        assert_eq!(
            Route::parse("/apis/core.k8s.appscode.com/"),
            Some(Route::Group("core.k8s.appscode.com".to_string()))
        );
        assert_eq!(
            Route::parse("/apis/core.k8s.appscode.com/v1alpha1/namespaces/demo/podviews/web-0"),
            Some(Route::Resource(ResourceRequest {
                group: "core.k8s.appscode.com".to_string(),
                version: "v1alpha1".to_string(),
                plural: "podviews".to_string(),
                namespace: Some("demo".to_string()),
                name: Some("web-0".to_string()),
            }))
        );
        assert_eq!(
            Route::parse("/apis/meta.k8s.appscode.com/v1alpha1/renders"),
            Some(Route::Resource(ResourceRequest {
                group: "meta.k8s.appscode.com".to_string(),
                version: "v1alpha1".to_string(),
                plural: "renders".to_string(),
                ..Default::default()
            }))
        );
        assert_eq!(Route::parse("/graphql"), Some(Route::GraphQl));
        assert_eq!(Route::parse("/api/v1/pods"), None);
        assert_eq!(Route::parse("/apis/a/v1/b/c/d"), None);
    }

    #[test]
    fn reads_user_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static("alice"));
        headers.append(GROUP_HEADER, HeaderValue::from_static("system:authenticated"));
        headers.append(GROUP_HEADER, HeaderValue::from_static("dev"));
        headers.append("x-remote-extra-scopes", HeaderValue::from_static("view"));
        headers.append("x-remote-extra-scopes", HeaderValue::from_static("edit"));

        let user = user_info(&headers).expect("user must be present");
        assert_eq!(user.username, "alice");
        assert_eq!(user.groups, vec!["system:authenticated", "dev"]);
        assert_eq!(
            user.extra,
            btreemap! { "scopes".to_string() => vec!["view".to_string(), "edit".to_string()] }
        );

        assert_eq!(user_info(&HeaderMap::new()), None);
    }

    #[test]
    fn detects_table_requests() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::ACCEPT,
            HeaderValue::from_static("application/json;as=Table;v=v1;g=meta.k8s.io"),
        );
        assert!(wants_table(&headers));
        headers.insert(http::header::ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!wants_table(&headers));
    }
}
