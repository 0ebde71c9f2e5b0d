use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use ui_server_core::{ObjectGraph, ResourceId, Scope};
use ui_server_k8s_index::{memory::InMemoryCluster, Catalog, Registry};
use ui_server_k8s_status::ClusterStatusPoller;
use ui_server_render::{Attributes, Authorizer, Config, Decision};

struct AllowAll;

#[async_trait::async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _: &UserInfo, _: &Attributes) -> Result<Decision, kube::Error> {
        Ok(Decision::Allow)
    }
}

struct Harness {
    cluster: Arc<InMemoryCluster>,
    server: ApiServer,
}

impl Harness {
    fn new() -> Self {
        use Scope::*;
        let cluster = Arc::new(InMemoryCluster::default());
        let registry = Arc::new(parking_lot::RwLock::new(
            [
                ResourceId::new("", "v1", "pods", "Pod", Namespaced),
                ResourceId::new("", "v1", "namespaces", "Namespace", Cluster),
                ResourceId::new("", "v1", "nodes", "Node", Cluster),
                ResourceId::new("apps", "v1", "deployments", "Deployment", Namespaced),
            ]
            .into_iter()
            .collect::<Registry>(),
        ));
        let config = Config {
            cluster_name: "demo".to_string(),
            grafana_url: None,
            max_depth: 8,
            image_cache_size: 16,
            image_cache_ttl: Duration::from_secs(60),
        };
        let catalog = Catalog::embedded().expect("embedded descriptors must load");
        let renderer = Renderer::new(
            config,
            cluster.clone(),
            registry.clone(),
            ObjectGraph::shared(),
            Arc::new(catalog),
            Arc::new(AllowAll),
        );
        let status = ClusterStatusPoller::new(
            cluster.clone(),
            registry,
            vec![],
            Duration::from_secs(120),
        )
        .status();
        let metrics = ApiMetrics::register(&mut prometheus_client::registry::Registry::default());
        Self {
            cluster,
            server: ApiServer::new(renderer, status, metrics),
        }
    }

    async fn send(&self, req: http::request::Builder, body: Value) -> (http::StatusCode, Value) {
        let body = if body.is_null() {
            vec![]
        } else {
            serde_json::to_vec(&body).expect("body must encode")
        };
        let req = req.body(()).expect("request must be valid");
        let rsp = self.server.serve(req, &body).await;
        let status = rsp.status();
        let bytes = rsp
            .into_body()
            .collect()
            .await
            .expect("body must be readable")
            .to_bytes();
        let value = serde_json::from_slice(&bytes).expect("response must be json");
        (status, value)
    }
}

fn as_alice(method: http::Method, uri: &str) -> http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-remote-user", "alice")
        .header("x-remote-group", "system:authenticated")
}

#[tokio::test]
async fn serves_discovery_documents() {
    let h = Harness::new();
    let (code, groups) = h
        .send(Request::builder().uri("/apis"), Value::Null)
        .await;
    assert_eq!(code, http::StatusCode::OK);
    assert_eq!(groups["kind"], "APIGroupList");
    assert_eq!(groups["groups"].as_array().map(Vec::len), Some(6));

    let (code, list) = h
        .send(
            Request::builder().uri("/apis/identity.k8s.appscode.com/v1alpha1"),
            Value::Null,
        )
        .await;
    assert_eq!(code, http::StatusCode::OK);
    assert_eq!(list["kind"], "APIResourceList");
    assert_eq!(list["resources"][0]["name"], "whoamis");

    let (code, _) = h
        .send(Request::builder().uri("/apis/apps/v1"), Value::Null)
        .await;
    assert_eq!(code, http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn echoes_the_caller() {
    let h = Harness::new();
    let (code, whoami) = h
        .send(
            as_alice(
                http::Method::POST,
                "/apis/identity.k8s.appscode.com/v1alpha1/whoamis",
            ),
            json!({}),
        )
        .await;
    assert_eq!(code, http::StatusCode::OK);
    assert_eq!(whoami["kind"], "WhoAmI");
    assert_eq!(
        whoami["response"]["user"],
        json!({"username": "alice", "groups": ["system:authenticated"]})
    );
}

#[tokio::test]
async fn rejects_anonymous_callers() {
    let h = Harness::new();
    let (code, status) = h
        .send(
            Request::builder()
                .method(http::Method::POST)
                .uri("/apis/identity.k8s.appscode.com/v1alpha1/whoamis"),
            json!({}),
        )
        .await;
    assert_eq!(code, http::StatusCode::UNAUTHORIZED);
    assert_eq!(status["kind"], "Status");
    assert_eq!(status["reason"], "Unauthorized");
}

#[tokio::test]
async fn identifies_the_cluster_by_name() {
    let h = Harness::new();
    h.cluster
        .apply_json(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": "kube-system", "uid": "5f0e-41"},
        }))
        .expect("namespace must be valid");

    let (code, id) = h
        .send(
            as_alice(
                http::Method::GET,
                "/apis/identity.k8s.appscode.com/v1alpha1/clusteridentities/demo",
            ),
            Value::Null,
        )
        .await;
    assert_eq!(code, http::StatusCode::OK);
    assert_eq!(id["status"], json!({"uid": "5f0e-41", "name": "demo"}));

    let (code, _) = h
        .send(
            as_alice(
                http::Method::GET,
                "/apis/identity.k8s.appscode.com/v1alpha1/clusteridentities/other",
            ),
            Value::Null,
        )
        .await;
    assert_eq!(code, http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn describes_the_site() {
    let h = Harness::new();
    h.cluster
        .apply_json(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": "kube-system", "uid": "5f0e-41"},
        }))
        .expect("namespace must be valid");
    for (name, version) in [("node-a", "v1.30.2"), ("node-b", "v1.29.6")] {
        h.cluster
            .apply_json(json!({
                "apiVersion": "v1",
                "kind": "Node",
                "metadata": {"name": name},
                "status": {
                    "capacity": {"cpu": "4", "memory": "8Gi"},
                    "allocatable": {"cpu": "3500m", "memory": "7Gi"},
                    "nodeInfo": {"kubeletVersion": version},
                },
            }))
            .expect("node must be valid");
    }

    let (code, site) = h
        .send(
            as_alice(
                http::Method::GET,
                "/apis/identity.k8s.appscode.com/v1alpha1/siteinfos/demo",
            ),
            Value::Null,
        )
        .await;
    assert_eq!(code, http::StatusCode::OK);
    assert_eq!(site["kind"], "SiteInfo");
    assert_eq!(site["product"]["productName"], "ui-server");
    let k8s = &site["kubernetes"];
    assert_eq!(k8s["cluster"], json!({"uid": "5f0e-41", "name": "demo"}));
    assert_eq!(k8s["kubeletVersions"], json!(["v1.29.6", "v1.30.2"]));
    assert_eq!(k8s["nodeStats"]["count"], 2);
    assert_eq!(k8s["nodeStats"]["capacity"]["cpu"], "8");
    assert_eq!(k8s["nodeStats"]["allocatable"]["cpu"], "7");
    assert_eq!(
        k8s["nodeStats"]["capacity"]["memory"],
        (16u64 * 1024 * 1024 * 1024).to_string()
    );

    let (code, _) = h
        .send(
            as_alice(
                http::Method::GET,
                "/apis/identity.k8s.appscode.com/v1alpha1/siteinfos/other",
            ),
            Value::Null,
        )
        .await;
    assert_eq!(code, http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn falco_reports_are_empty_without_falco() {
    let h = Harness::new();
    h.cluster
        .apply_json(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "default"},
        }))
        .expect("deployment must be valid");

    let (code, report) = h
        .send(
            as_alice(
                http::Method::POST,
                "/apis/falco.k8s.appscode.com/v1alpha1/falcoreports",
            ),
            json!({
                "request": {
                    "source": {
                        "resource": {"group": "apps", "version": "v1", "name": "deployments"},
                        "ref": {"namespace": "default", "name": "web"},
                    },
                },
            }),
        )
        .await;
    assert_eq!(code, http::StatusCode::OK, "{report}");
    assert_eq!(report["kind"], "FalcoReport");
    assert_eq!(report["response"], json!({"stats": {}, "events": []}));
}

#[tokio::test]
async fn lists_pod_views_as_a_table() {
    let h = Harness::new();
    for name in ["web-0", "web-1"] {
        h.cluster
            .apply_json(json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": name, "namespace": "default"},
                "spec": {"containers": [{"name": "nginx", "image": "nginx:1.25"}]},
            }))
            .expect("pod must be valid");
    }

    let (code, table) = h
        .send(
            as_alice(
                http::Method::GET,
                "/apis/core.k8s.appscode.com/v1alpha1/namespaces/default/podviews",
            )
            .header(
                http::header::ACCEPT,
                "application/json;as=Table;v=v1;g=meta.k8s.io",
            ),
            Value::Null,
        )
        .await;
    assert_eq!(code, http::StatusCode::OK);
    assert_eq!(table["kind"], "Table");
    let rows = table["rows"]
        .as_array()
        .expect("rows must be a list")
        .iter()
        .map(|r| (r["cells"][0].clone(), r["cells"][1].clone()))
        .collect::<Vec<_>>();
    assert_eq!(
        rows,
        vec![
            (json!("web-0"), json!("default")),
            (json!("web-1"), json!("default")),
        ]
    );
}

#[tokio::test]
async fn rejects_unsupported_verbs() {
    let h = Harness::new();
    let (code, status) = h
        .send(
            as_alice(
                http::Method::POST,
                "/apis/core.k8s.appscode.com/v1alpha1/namespaces/default/podviews",
            ),
            json!({}),
        )
        .await;
    assert_eq!(code, http::StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(status["reason"], "MethodNotAllowed");
}

#[tokio::test]
async fn rejects_requests_without_a_request_body() {
    let h = Harness::new();
    let (code, status) = h
        .send(
            as_alice(http::Method::POST, "/apis/meta.k8s.appscode.com/v1alpha1/renders"),
            json!({"metadata": {}}),
        )
        .await;
    assert_eq!(code, http::StatusCode::BAD_REQUEST);
    assert_eq!(status["message"], "request is required");

    let (code, _) = h
        .send(
            as_alice(http::Method::POST, "/apis/meta.k8s.appscode.com/v1alpha1/renders"),
            Value::Null,
        )
        .await;
    assert_eq!(code, http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mints_inbox_tokens() {
    let h = Harness::new();
    let (code, req) = h
        .send(
            as_alice(
                http::Method::POST,
                "/apis/identity.k8s.appscode.com/v1alpha1/inboxtokenrequests",
            ),
            json!({}),
        )
        .await;
    assert_eq!(code, http::StatusCode::OK);
    let agent = req["response"]["agentJwtToken"].as_str().unwrap_or_default();
    let admin = req["response"]["adminJwtToken"].as_str().unwrap_or_default();
    assert_eq!((agent.len(), admin.len()), (36, 36));
    assert_ne!(agent, admin);
}

#[tokio::test]
async fn reports_cluster_status() {
    let h = Harness::new();
    let (code, list) = h
        .send(
            as_alice(
                http::Method::GET,
                "/apis/meta.k8s.appscode.com/v1alpha1/clusterstatuses",
            ),
            Value::Null,
        )
        .await;
    assert_eq!(code, http::StatusCode::OK);
    assert_eq!(list["kind"], "ClusterStatusList");
    assert_eq!(list["items"][0]["metadata"]["name"], "demo");
    assert_eq!(list["items"][0]["response"]["phase"], "NotReady");
}

#[tokio::test]
async fn executes_graphql_queries() {
    let h = Harness::new();
    let (code, data) = h
        .send(
            as_alice(http::Method::POST, "/graphql"),
            json!({"query": "{ __typename }"}),
        )
        .await;
    assert_eq!(code, http::StatusCode::OK);
    assert_eq!(data, json!({"__typename": "Query"}));

    let (code, status) = h
        .send(
            as_alice(http::Method::POST, "/graphql"),
            json!({"query": "{ nothing }"}),
        )
        .await;
    assert_eq!(code, http::StatusCode::BAD_REQUEST);
    assert_eq!(status["reason"], "BadRequest");
}
