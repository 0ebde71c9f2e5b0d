//! Per-object authorization through the host cluster's authorizer.

use crate::{Error, Renderer, Result};
use k8s_openapi::api::authorization::v1::{
    NonResourceAttributes, ResourceAttributes, SubjectAccessReview, SubjectAccessReviewSpec,
};
use kube::{
    api::{Api, PostParams},
    Client,
};
use tracing::debug;
use ui_server_core::ResourceId;
use ui_server_k8s_api::identity::UserInfo;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
    NoOpinion(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Attributes {
    Resource(ResourceAttributes),
    NonResource(NonResourceAttributes),
}

#[async_trait::async_trait]
pub trait Authorizer: Send + Sync + 'static {
    async fn authorize(&self, user: &UserInfo, attrs: &Attributes) -> Result<Decision, kube::Error>;
}

/// Authorizes through `SubjectAccessReview`s.
#[derive(Clone)]
pub struct KubeAuthorizer {
    client: Client,
}

// === impl Decision ===

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    fn reason(&self) -> &str {
        match self {
            Self::Allow => "",
            Self::Deny(why) | Self::NoOpinion(why) => why,
        }
    }
}

// === impl Attributes ===

impl Attributes {
    pub fn get(rid: &ResourceId, namespace: &str, name: &str) -> Self {
        Self::Resource(ResourceAttributes {
            verb: Some("get".to_string()),
            group: Some(rid.group.clone()),
            version: Some(rid.version.clone()),
            resource: Some(rid.name.clone()),
            namespace: Some(namespace.to_string()).filter(|ns| !ns.is_empty()),
            name: Some(name.to_string()),
            ..Default::default()
        })
    }

    pub fn list(rid: &ResourceId, namespace: Option<&str>) -> Self {
        Self::Resource(ResourceAttributes {
            verb: Some("list".to_string()),
            group: Some(rid.group.clone()),
            version: Some(rid.version.clone()),
            resource: Some(rid.name.clone()),
            namespace: namespace.map(Into::into),
            ..Default::default()
        })
    }
}

// === impl KubeAuthorizer ===

impl KubeAuthorizer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Authorizer for KubeAuthorizer {
    async fn authorize(
        &self,
        user: &UserInfo,
        attrs: &Attributes,
    ) -> Result<Decision, kube::Error> {
        let (resource_attributes, non_resource_attributes) = match attrs {
            Attributes::Resource(ra) => (Some(ra.clone()), None),
            Attributes::NonResource(na) => (None, Some(na.clone())),
        };
        let review = SubjectAccessReview {
            spec: SubjectAccessReviewSpec {
                user: Some(user.username.clone()),
                uid: Some(user.uid.clone()).filter(|u| !u.is_empty()),
                groups: Some(user.groups.clone()),
                extra: Some(user.extra.clone()),
                resource_attributes,
                non_resource_attributes,
            },
            ..Default::default()
        };
        let review = Api::<SubjectAccessReview>::all(self.client.clone())
            .create(&PostParams::default(), &review)
            .await?;
        let status = review.status.unwrap_or_default();
        let reason = status.reason.unwrap_or_default();
        Ok(if status.allowed {
            Decision::Allow
        } else if status.denied == Some(true) {
            Decision::Deny(reason)
        } else {
            Decision::NoOpinion(reason)
        })
    }
}

// === impl Renderer ===

impl Renderer {
    pub(crate) async fn authorize(&self, user: &UserInfo, attrs: &Attributes) -> Result<Decision> {
        if user.username.is_empty() {
            return Err(Error::bad_request("no user info in request"));
        }
        Ok(self.inner.authz.authorize(user, attrs).await?)
    }

    /// Whether `user` may `get` the named object. Used to filter lists.
    pub(crate) async fn can_get(
        &self,
        user: &UserInfo,
        rid: &ResourceId,
        namespace: &str,
        name: &str,
    ) -> Result<bool> {
        let decision = self
            .authorize(user, &Attributes::get(rid, namespace, name))
            .await?;
        if !decision.is_allowed() {
            debug!(user = %user.username, %rid, namespace, name, "Dropping unauthorized object");
        }
        Ok(decision.is_allowed())
    }

    /// Fails with `Forbidden` unless `user` may `get` the named object.
    pub(crate) async fn check_get(
        &self,
        user: &UserInfo,
        rid: &ResourceId,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        match self
            .authorize(user, &Attributes::get(rid, namespace, name))
            .await?
        {
            Decision::Allow => Ok(()),
            decision => Err(Error::Forbidden(format!(
                "user {:?} cannot get {} {}/{}: {}",
                user.username,
                rid.name,
                namespace,
                name,
                decision.reason()
            ))),
        }
    }
}
