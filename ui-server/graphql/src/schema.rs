use async_graphql::{Context, EmptyMutation, EmptySubscription, Object, Result, Schema};
use ui_server_core::{EdgeLabel, ObjectId, Oid, SharedGraph};

pub type GraphSchema = Schema<Query, EmptyMutation, EmptySubscription>;

/// Builds the schema over `graph`. Queries nested deeper than `max_depth` are rejected.
pub fn build(graph: SharedGraph, max_depth: usize) -> GraphSchema {
    Schema::build(Query, EmptyMutation, EmptySubscription)
        .limit_depth(max_depth)
        .data(graph)
        .finish()
}

pub struct Query;

#[Object]
impl Query {
    /// Looks up an object by OID. Unknown objects resolve to a node without edges.
    async fn find(&self, oid: String) -> Result<ObjectNode> {
        Ok(ObjectNode::new(oid.parse::<ObjectId>()?))
    }
}

#[derive(Clone, Debug)]
pub struct ObjectNode {
    id: ObjectId,
    oid: Oid,
}

impl ObjectNode {
    pub fn new(id: ObjectId) -> Self {
        let oid = id.oid();
        Self { id, oid }
    }

    fn links(
        &self,
        ctx: &Context<'_>,
        label: EdgeLabel,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        if group.is_some() && kind.is_none() {
            return Err("the group argument requires kind".into());
        }
        let graph = ctx.data::<SharedGraph>()?;
        let links = graph.read().links(&self.oid, label);
        Ok(links
            .into_iter()
            .filter(|(gk, _)| {
                kind.as_ref().map_or(true, |k| gk.kind == *k)
                    && group.as_ref().map_or(true, |g| gk.group == *g)
            })
            .flat_map(|(_, ids)| ids)
            .map(ObjectNode::new)
            .collect())
    }
}

#[Object(name = "ObjectID", rename_fields = "snake_case")]
impl ObjectNode {
    async fn group(&self) -> &str {
        &self.id.group
    }

    async fn kind(&self) -> &str {
        &self.id.kind
    }

    async fn namespace(&self) -> &str {
        &self.id.namespace
    }

    async fn name(&self) -> &str {
        &self.id.name
    }

    async fn oid(&self) -> &str {
        self.oid.as_str()
    }

    async fn offshoot(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::Offshoot, group, kind)
    }

    async fn view(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::View, group, kind)
    }

    async fn ops(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::Ops, group, kind)
    }

    async fn owned_by(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::OwnedBy, group, kind)
    }

    async fn exposed_by(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::ExposedBy, group, kind)
    }

    async fn backup_via(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::BackupVia, group, kind)
    }

    async fn restore_into(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::RestoreInto, group, kind)
    }

    async fn monitored_by(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::MonitoredBy, group, kind)
    }

    async fn event(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::Event, group, kind)
    }

    async fn authn(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::Authn, group, kind)
    }

    async fn authz(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::Authz, group, kind)
    }

    async fn storage(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::Storage, group, kind)
    }

    async fn network_policy(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::NetworkPolicy, group, kind)
    }

    async fn ca(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::Ca, group, kind)
    }

    async fn cert_issuer(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::CertIssuer, group, kind)
    }

    async fn config(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::Config, group, kind)
    }

    async fn connect_via(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::ConnectVia, group, kind)
    }

    async fn located_on(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::LocatedOn, group, kind)
    }

    async fn policy(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::Policy, group, kind)
    }

    async fn source(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::Source, group, kind)
    }

    async fn scanned_by(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::ScannedBy, group, kind)
    }

    async fn catalog(
        &self,
        ctx: &Context<'_>,
        group: Option<String>,
        kind: Option<String>,
    ) -> Result<Vec<ObjectNode>> {
        self.links(ctx, EdgeLabel::Catalog, group, kind)
    }
}
