use crate::{table, Error, Renderer, Result};
use serde_json::{json, Value};
use ui_server_k8s_api::{
    identity::UserInfo,
    meta::{OutputFormat, ResourceQueryRequest},
};

impl Renderer {
    /// Locates objects from a source and returns them as references, objects or a table.
    pub async fn resource_query(
        &self,
        user: &UserInfo,
        req: &ResourceQueryRequest,
    ) -> Result<Value> {
        let format = req
            .output_format
            .parse::<OutputFormat>()
            .map_err(Error::BadRequest)?;
        let src = self.source(user, &req.source).await?;
        let target = &req.target.target;
        let rid = self.require(&target.group, &target.kind)?;

        let ids = self.locate(&src.id, &req.target).await?;
        if format == OutputFormat::Ref {
            return Ok(json!({ "items": ids }));
        }

        let objs = self.fetch(&ids).await?;
        let objs = self.authorized(user, &rid, objs).await?;
        let items = objs
            .iter()
            .map(serde_json::to_value)
            .collect::<serde_json::Result<Vec<_>>>()?;
        match format {
            OutputFormat::Object => Ok(json!({
                "apiVersion": "v1",
                "kind": "List",
                "metadata": {},
                "items": items,
            })),
            _ => {
                let columns = self
                    .catalog()
                    .layout(target, None)
                    .and_then(|l| l.spec.pages.first())
                    .and_then(|p| p.sections.first())
                    .and_then(|s| s.blocks.iter().find_map(|b| b.view.as_ref()))
                    .map(|v| v.columns.clone())
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| table::default_columns(rid.is_namespaced()));
                let table = table::build(self.templates(), &columns, &items, false)?;
                Ok(table::to_k8s(&table))
            }
        }
    }
}
