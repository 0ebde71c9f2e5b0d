//! The aggregated API server.
//!
//! Virtual resources are served under `/apis/<group>/<version>`. Requests are proxied by the
//! Kubernetes API server, which authenticates the caller and forwards its identity in the
//! `X-Remote-*` headers. `Create` is an RPC: the body carries a `request` and the same object
//! is returned with its `response` filled in.

mod discovery;
mod request;

#[cfg(test)]
mod tests;

use self::request::{ResourceRequest, Route, Verb};
use crate::metrics::ApiMetrics;
use futures::future;
use http_body_util::BodyExt;
use hyper::{body::Body as _, http, Request, Response};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info_span, trace, warn, Instrument};
use ui_server_k8s_api::{
    cluster::ClusterStatus,
    identity::{
        ClusterIdentity, InboxTokenRequest, InboxTokenResponse, SelfSubjectNamespaceAccessReview,
        SiteInfo, UserInfo,
    },
    meta::{Render, RenderDashboard, RenderPage, RenderRawGraph, ResourceQuery},
    reports::{CveReport, FalcoReport, Image, PolicyReport},
    ui::{GenericResource, GenericResourceService, PodView, ResourceSummary},
    ObjectMeta, VirtualResource, CORE_GROUP, FALCO_GROUP, IDENTITY_GROUP, META_GROUP,
    POLICY_GROUP, REPORTS_GROUP, VERSION,
};
use ui_server_k8s_status::SharedStatus;
use ui_server_render::{table, Renderer, Templates};

type Body = http_body_util::Full<bytes::Bytes>;

#[derive(Clone)]
pub struct ApiServer {
    inner: Arc<Inner>,
}

struct Inner {
    renderer: Renderer,
    status: SharedStatus,
    metrics: ApiMetrics,
    templates: Templates,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),
}

/// A failure reported to the client as a `Status`.
#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error(transparent)]
    Render(#[from] ui_server_render::Error),

    #[error("the server could not find the requested resource")]
    NoRoute,

    #[error("{verb} is not supported on {resource}")]
    MethodNotAllowed { verb: String, resource: String },

    #[error("the caller is not authenticated")]
    Unauthorized,

    #[error("invalid request body: {0}")]
    Body(#[source] serde_json::Error),
}

#[derive(serde::Deserialize)]
struct GraphQlRequest {
    query: String,
    #[serde(default)]
    variables: Value,
}

// === impl ApiServer ===

impl tower::Service<Request<hyper::body::Incoming>> for ApiServer {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        let server = self.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let bytes = body.collect().await?.to_bytes();
            Ok(server.serve(Request::from_parts(parts, ()), &bytes).await)
        })
    }
}

impl ApiServer {
    pub fn new(renderer: Renderer, status: SharedStatus, metrics: ApiMetrics) -> Self {
        Self {
            inner: Arc::new(Inner {
                renderer,
                status,
                metrics,
                templates: Templates::new(),
            }),
        }
    }

    async fn serve(&self, req: Request<()>, body: &[u8]) -> Response<Body> {
        let Some(route) = Route::parse(req.uri().path()) else {
            return error_response(&ApiError::NoRoute);
        };

        let (group, resource, verb) = match &route {
            Route::Resource(r) => match r.verb(req.method()) {
                Some(verb) => (r.group.as_str(), r.plural.as_str(), verb.as_str()),
                None => (r.group.as_str(), r.plural.as_str(), "unsupported"),
            },
            Route::GraphQl => ("", "graphql", "create"),
            _ => ("", "discovery", "get"),
        };
        let observer = self.inner.metrics.start(group, resource, verb, body.len());
        let span = info_span!("request", %group, %resource, %verb);

        let rsp = async {
            match self.route(&req, route, body).await {
                Ok(value) => json_response(http::StatusCode::OK, &value),
                Err(error) => {
                    debug!(%error, "Request failed");
                    error_response(&error)
                }
            }
        }
        .instrument(span)
        .await;

        let len = rsp.body().size_hint().exact().unwrap_or_default();
        observer.finish(rsp.status().as_u16(), len as usize);
        rsp
    }

    async fn route(&self, req: &Request<()>, route: Route, body: &[u8]) -> Result<Value, ApiError> {
        match route {
            Route::Groups => Ok(serde_json::to_value(discovery::group_list())?),
            Route::Group(name) => {
                let group = discovery::group(&name).ok_or(ApiError::NoRoute)?;
                Ok(serde_json::to_value(group)?)
            }
            Route::Resources { group, version } => {
                let list = discovery::resource_list(&group, &version).ok_or(ApiError::NoRoute)?;
                Ok(serde_json::to_value(list)?)
            }
            Route::GraphQl => {
                let user = request::user_info(req.headers()).ok_or(ApiError::Unauthorized)?;
                if req.method() != http::Method::POST {
                    return Err(ApiError::MethodNotAllowed {
                        verb: req.method().to_string(),
                        resource: "graphql".to_string(),
                    });
                }
                let gql = decode::<GraphQlRequest>(body)?;
                debug!(user = %user.username, "Executing GraphQL query");
                ui_server_graphql::execute(self.inner.renderer.schema(), &gql.query, gql.variables)
                    .await
                    .map_err(|e| match e {
                        ui_server_graphql::Error::Query(msg) => {
                            ui_server_render::Error::BadRequest(msg).into()
                        }
                        e => ui_server_render::Error::from(e).into(),
                    })
            }
            Route::Resource(r) => {
                let user = request::user_info(req.headers()).ok_or(ApiError::Unauthorized)?;
                let served =
                    discovery::lookup(&r.group, &r.plural).filter(|_| r.version == VERSION);
                let Some(served) = served else {
                    return Err(ApiError::NoRoute);
                };
                let verb = r
                    .verb(req.method())
                    .filter(|v| served.verbs.contains(&v.as_str()))
                    .ok_or_else(|| ApiError::MethodNotAllowed {
                        verb: req.method().to_string(),
                        resource: r.plural.clone(),
                    })?;
                let value = self.resource(&user, &r, verb, body).await?;
                if verb != Verb::Create && request::wants_table(req.headers()) {
                    return self.table(value, served.namespaced);
                }
                Ok(value)
            }
        }
    }

    async fn resource(
        &self,
        user: &UserInfo,
        req: &ResourceRequest,
        verb: Verb,
        body: &[u8],
    ) -> Result<Value, ApiError> {
        let renderer = &self.inner.renderer;
        let ns = req.namespace.as_deref();
        let name = req.name.as_deref().unwrap_or_default();

        let value = match (req.group.as_str(), req.plural.as_str(), verb) {
            (IDENTITY_GROUP, "whoamis", _) => renderer.whoami(user).to_json()?,
            (IDENTITY_GROUP, "clusteridentities", Verb::Get) => {
                let id = renderer.cluster_identity().await?;
                if id.status.name != name {
                    return Err(ui_server_render::Error::NotFound(name.to_string()).into());
                }
                id.to_json()?
            }
            (IDENTITY_GROUP, "clusteridentities", _) => {
                let id = renderer.cluster_identity().await?;
                ClusterIdentity::list_json([&id])?
            }
            (IDENTITY_GROUP, "siteinfos", Verb::Get) => {
                let info = renderer.site_info().await?;
                if info.metadata.name.as_deref() != Some(name) {
                    return Err(ui_server_render::Error::NotFound(name.to_string()).into());
                }
                info.to_json()?
            }
            (IDENTITY_GROUP, "siteinfos", _) => {
                SiteInfo::list_json([&renderer.site_info().await?])?
            }
            (IDENTITY_GROUP, "selfsubjectnamespaceaccessreviews", _) => {
                let mut review = decode::<SelfSubjectNamespaceAccessReview>(body)?;
                review.status = Some(renderer.namespace_access_review(user, &review.spec).await?);
                review.to_json()?
            }
            (IDENTITY_GROUP, "inboxtokenrequests", _) => InboxTokenRequest {
                metadata: ObjectMeta::default(),
                response: Some(InboxTokenResponse {
                    agent_jwt_token: uuid::Uuid::new_v4().to_string(),
                    admin_jwt_token: uuid::Uuid::new_v4().to_string(),
                }),
            }
            .to_json()?,

            (CORE_GROUP, "genericresources", Verb::Get) => renderer
                .get_generic_resource(user, namespace(ns)?, name)
                .await?
                .to_json()?,
            (CORE_GROUP, "genericresources", _) => {
                GenericResource::list_json(&renderer.list_generic_resources(user, ns).await?)?
            }
            (CORE_GROUP, "genericresourceservices", Verb::Get) => renderer
                .get_generic_resource_service(user, namespace(ns)?, name)
                .await?
                .to_json()?,
            (CORE_GROUP, "genericresourceservices", _) => GenericResourceService::list_json(
                &renderer.list_generic_resource_services(user, ns).await?,
            )?,
            (CORE_GROUP, "resourcesummaries", _) => {
                ResourceSummary::list_json(&renderer.list_resource_summaries(user, ns).await?)?
            }
            (CORE_GROUP, "podviews", Verb::Get) => renderer
                .get_pod_view(user, namespace(ns)?, name)
                .await?
                .to_json()?,
            (CORE_GROUP, "podviews", _) => {
                PodView::list_json(&renderer.list_pod_views(user, ns).await?)?
            }

            (META_GROUP, "renders", _) => {
                let mut obj = decode::<Render>(body)?;
                obj.response = Some(renderer.render(user, required(&obj.request)?).await?);
                obj.to_json()?
            }
            (META_GROUP, "renderpages", _) => {
                let mut obj = decode::<RenderPage>(body)?;
                obj.response = Some(renderer.render_page(user, required(&obj.request)?).await?);
                obj.to_json()?
            }
            (META_GROUP, "renderdashboards", _) => {
                let mut obj = decode::<RenderDashboard>(body)?;
                obj.response =
                    Some(renderer.render_dashboards(user, required(&obj.request)?).await?);
                obj.to_json()?
            }
            (META_GROUP, "renderrawgraphs", _) => {
                let mut obj = decode::<RenderRawGraph>(body)?;
                let req = obj.request.clone().unwrap_or_default();
                obj.response = Some(renderer.render_raw_graph(user, &req).await?);
                obj.to_json()?
            }
            (META_GROUP, "resourcequeries", _) => {
                let mut obj = decode::<ResourceQuery>(body)?;
                obj.response = Some(renderer.resource_query(user, required(&obj.request)?).await?);
                obj.to_json()?
            }
            (META_GROUP, "clusterstatuses", verb) => {
                let status = ClusterStatus {
                    metadata: ObjectMeta {
                        name: Some(renderer.config().cluster_name.clone()),
                        ..Default::default()
                    },
                    response: Some((**self.inner.status.load()).clone()),
                };
                match verb {
                    Verb::List => ClusterStatus::list_json([&status])?,
                    _ => status.to_json()?,
                }
            }

            (POLICY_GROUP, "policyreports", _) => {
                let mut obj = decode::<PolicyReport>(body)?;
                obj.response = Some(renderer.policy_report(user, required(&obj.request)?).await?);
                obj.to_json()?
            }
            (REPORTS_GROUP, "cvereports", _) => {
                let mut obj = decode::<CveReport>(body)?;
                obj.response = Some(renderer.cve_report(user, required(&obj.request)?).await?);
                obj.to_json()?
            }
            (REPORTS_GROUP, "images", _) => {
                let mut obj = decode::<Image>(body)?;
                let image = required(&obj.request)?.image.clone();
                obj.response = Some(renderer.image_report(&image).await?);
                obj.to_json()?
            }
            (FALCO_GROUP, "falcoreports", _) => {
                let mut obj = decode::<FalcoReport>(body)?;
                obj.response = Some(renderer.falco_report(user, required(&obj.request)?).await?);
                obj.to_json()?
            }

            _ => return Err(ApiError::NoRoute),
        };
        Ok(value)
    }

    /// Converts a response object, or each item of a list, into table rows.
    fn table(&self, value: Value, namespaced: bool) -> Result<Value, ApiError> {
        let items = match value.get("items").and_then(Value::as_array) {
            Some(items) => items.clone(),
            None => vec![value],
        };
        let columns = table::default_columns(namespaced);
        let table = table::build(&self.inner.templates, &columns, &items, false)?;
        Ok(table::to_k8s(&table))
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(ApiError::Body)
}

fn required<T>(request: &Option<T>) -> Result<&T, ApiError> {
    request
        .as_ref()
        .ok_or_else(|| ui_server_render::Error::BadRequest("request is required".into()).into())
}

fn namespace(ns: Option<&str>) -> Result<&str, ApiError> {
    ns.ok_or_else(|| ui_server_render::Error::BadRequest("namespace is required".into()).into())
}

// === impl ApiError ===

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        Self::Render(error.into())
    }
}

impl ApiError {
    fn code(&self) -> http::StatusCode {
        let code = match self {
            Self::Render(e) => e.code(),
            Self::NoRoute => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::Unauthorized => 401,
            Self::Body(_) => 400,
        };
        http::StatusCode::from_u16(code).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn to_status(&self) -> Status {
        let reason = match self {
            Self::Render(e) => return e.to_status(),
            Self::NoRoute => "NotFound",
            Self::MethodNotAllowed { .. } => "MethodNotAllowed",
            Self::Unauthorized => "Unauthorized",
            Self::Body(_) => "BadRequest",
        };
        Status {
            status: Some("Failure".to_string()),
            code: Some(self.code().as_u16().into()),
            reason: Some(reason.to_string()),
            message: Some(self.to_string()),
            ..Default::default()
        }
    }
}

fn json_response(status: http::StatusCode, value: &impl Serialize) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(bytes) => Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("json response must be valid"),
        Err(error) => {
            warn!(%error, "Failed to encode response");
            Response::builder()
                .status(http::StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::default())
                .expect("error response must be valid")
        }
    }
}

fn error_response(error: &ApiError) -> Response<Body> {
    json_response(error.code(), &error.to_status())
}
