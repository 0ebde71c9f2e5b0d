//! `Render`, `RenderPage` and `RenderDashboard`.

use crate::{locate::Source, table, Error, Renderer, Result};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tracing::debug;
use ui_server_k8s_api::{
    identity::UserInfo,
    layout::{
        BlockKind, Dashboard, DashboardView, PageBlockLayout, PageBlockView, PageLayout,
        PageView, PanelView, ResourceView, SectionView,
    },
    meta::{RenderDashboardRequest, RenderDashboardResponse, RenderRequest, RenderResponse},
};

impl Renderer {
    /// Renders a resource's layout. With a page name only that page is rendered.
    pub async fn render(&self, user: &UserInfo, req: &RenderRequest) -> Result<RenderResponse> {
        let src = self.source(user, &req.source).await?;
        let gk = src.id.group_kind();
        let layout = self
            .catalog()
            .layout(&gk, req.layout_name.as_deref())
            .ok_or_else(|| Error::NotFound(format!("layout for {gk}")))?
            .clone();

        if let Some(name) = &req.page_name {
            let page = self.page(&layout.spec.pages, name)?;
            let page = self.render_page_layout(user, &src, page, req.convert_to_table).await?;
            return Ok(RenderResponse {
                view: None,
                page: Some(page),
            });
        }

        let header = match &layout.spec.header {
            Some(block) => self
                .render_blocks(user, &src, std::slice::from_ref(block), req.convert_to_table, 0)
                .await?
                .into_iter()
                .next(),
            None => None,
        };
        let tab_bar = match &layout.spec.tab_bar {
            Some(block) => self
                .render_blocks(user, &src, std::slice::from_ref(block), req.convert_to_table, 0)
                .await?
                .into_iter()
                .next(),
            None => None,
        };
        let mut pages = Vec::with_capacity(layout.spec.pages.len());
        for page in &layout.spec.pages {
            pages.push(
                self.render_page_layout(user, &src, page, req.convert_to_table)
                    .await?,
            );
        }
        Ok(RenderResponse {
            view: Some(ResourceView {
                resource: src.rid.clone(),
                header,
                tab_bar,
                pages,
            }),
            page: None,
        })
    }

    /// Renders a single named page.
    pub async fn render_page(&self, user: &UserInfo, req: &RenderRequest) -> Result<PageView> {
        if req.page_name.is_none() {
            return Err(Error::bad_request("pageName is required"));
        }
        self.render(user, req)
            .await?
            .page
            .ok_or_else(|| Error::internal("page was not rendered"))
    }

    /// Renders the dashboards of a resource whose requirements hold.
    pub async fn render_dashboards(
        &self,
        user: &UserInfo,
        req: &RenderDashboardRequest,
    ) -> Result<RenderDashboardResponse> {
        let src = self.source(user, &req.source).await?;
        let gk = src.id.group_kind();
        let Some(set) = self.catalog().dashboards(&gk).cloned() else {
            return Err(Error::NotFound(format!("dashboards for {gk}")));
        };
        let base = self
            .config()
            .grafana_url
            .clone()
            .ok_or_else(|| Error::bad_request("no Grafana URL is configured"))?;

        let mut dashboards = Vec::new();
        for d in &set.spec.dashboards {
            if req.title.as_ref().is_some_and(|t| *t != d.title) {
                continue;
            }
            if let Some(requirement) = &d.requirement {
                if !self.satisfied(requirement, &src.id, &src.data).await? {
                    debug!(title = %d.title, "Dashboard requirement not met");
                    continue;
                }
            }
            dashboards.push(self.dashboard(&base, d, &src.data)?);
        }
        Ok(RenderDashboardResponse { dashboards })
    }

    fn dashboard(&self, base: &url::Url, d: &Dashboard, data: &Value) -> Result<DashboardView> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::internal("the Grafana URL cannot have a path"))?
            .pop_if_empty()
            .push("d")
            .push(&d.uid.clone().unwrap_or_else(|| slug(&d.title)));
        for var in &d.vars {
            let value = self.templates().render(&var.value, data)?;
            url.query_pairs_mut()
                .append_pair(&format!("var-{}", var.name), &value);
        }
        let panels = d
            .panels
            .iter()
            .map(|title| {
                let mut panel = url.clone();
                panel.query_pairs_mut().append_pair("viewPanel", title);
                PanelView {
                    title: title.clone(),
                    url: panel.into(),
                }
            })
            .collect();
        Ok(DashboardView {
            title: d.title.clone(),
            url: url.into(),
            panels,
        })
    }

    fn page<'l>(&self, pages: &'l [PageLayout], name: &str) -> Result<&'l PageLayout> {
        pages
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::NotFound(format!("page {name:?}")))
    }

    async fn render_page_layout(
        &self,
        user: &UserInfo,
        src: &Source,
        page: &PageLayout,
        convert: bool,
    ) -> Result<PageView> {
        let mut sections = Vec::with_capacity(page.sections.len());
        for section in &page.sections {
            sections.push(SectionView {
                name: section.name.clone(),
                blocks: self
                    .render_blocks(user, src, &section.blocks, convert, 0)
                    .await?,
            });
        }
        Ok(PageView {
            name: page.name.clone(),
            sections,
        })
    }

    /// Renders blocks, expanding references to block definitions up to the depth limit.
    fn render_blocks<'a>(
        &'a self,
        user: &'a UserInfo,
        src: &'a Source,
        blocks: &'a [PageBlockLayout],
        convert: bool,
        depth: usize,
    ) -> BoxFuture<'a, Result<Vec<PageBlockView>>> {
        async move {
            if depth >= self.config().max_depth {
                return Err(Error::internal(format!(
                    "block definitions nest deeper than {}",
                    self.config().max_depth
                )));
            }
            let mut views = Vec::with_capacity(blocks.len());
            for block in blocks {
                if block.kind == BlockKind::Block {
                    let name = block
                        .name
                        .as_deref()
                        .ok_or_else(|| Error::internal("block reference without a name"))?;
                    let def = self
                        .catalog()
                        .block(name)
                        .ok_or_else(|| Error::NotFound(format!("block {name:?}")))?
                        .clone();
                    let nested = self
                        .render_blocks(user, src, &def.spec.blocks, convert, depth + 1)
                        .await?;
                    views.extend(nested);
                    continue;
                }
                views.push(self.render_block(user, src, block, convert).await?);
            }
            Ok(views)
        }
        .boxed()
    }

    async fn render_block(
        &self,
        user: &UserInfo,
        src: &Source,
        block: &PageBlockLayout,
        convert: bool,
    ) -> Result<PageBlockView> {
        let mut view = PageBlockView {
            kind: block.kind,
            name: block.name.clone(),
            resource: Some(src.rid.clone()),
            ..Default::default()
        };
        let (objects, namespaced) = match block.kind {
            BlockKind::Self_ => (vec![src.data.clone()], src.rid.is_namespaced()),
            BlockKind::SubTable => {
                let path = block
                    .field_path
                    .as_deref()
                    .ok_or_else(|| Error::internal("subtable block without a fieldPath"))?;
                let found = ui_server_k8s_index::jsonpath::find(path, &src.data)
                    .map_err(Error::internal)?;
                let items = match found.as_slice() {
                    [Value::Array(items)] => items.clone(),
                    found => found.iter().map(|v| (*v).clone()).collect(),
                };
                (items, false)
            }
            BlockKind::Connection => {
                let locator = block
                    .locator
                    .as_ref()
                    .ok_or_else(|| Error::internal("connection block without a locator"))?;
                let Some(rid) = self.preferred(&locator.target.group, &locator.target.kind) else {
                    view.resource = None;
                    view.missing = true;
                    return Ok(view);
                };
                let ids = self.locate(&src.id, locator).await?;
                let objs = self.fetch(&ids).await?;
                let objs = self.authorized(user, &rid, objs).await?;
                let namespaced = rid.is_namespaced();
                view.resource = Some(rid);
                let items = objs
                    .iter()
                    .map(serde_json::to_value)
                    .collect::<serde_json::Result<Vec<_>>>()?;
                (items, namespaced)
            }
            BlockKind::Block => return Err(Error::internal("unexpanded block reference")),
        };

        if convert {
            let columns = match &block.view {
                Some(def) if !def.columns.is_empty() => def.columns.clone(),
                _ => table::default_columns(namespaced),
            };
            view.table = Some(table::build(self.templates(), &columns, &objects, false)?);
        } else {
            view.items = objects;
        }
        Ok(view)
    }
}

fn slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
