use crate::{calc, quantity, Error, Renderer, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DynamicObject, ResourceExt};
use serde_json::Value;
use ui_server_core::ResourceId;
use ui_server_k8s_api::{
    identity::UserInfo,
    ui::{ContainerView, PodResources, PodView, PodViewSpec},
};

const METRICS_GROUP: &str = "metrics.k8s.io";

impl Renderer {
    pub async fn list_pod_views(
        &self,
        user: &UserInfo,
        namespace: Option<&str>,
    ) -> Result<Vec<PodView>> {
        let rid = self.require("", "Pod")?;
        let pods = self.cluster().list(&rid, namespace, None).await?;
        let mut views = Vec::new();
        for pod in self.authorized(user, &rid, pods).await? {
            views.push(self.pod_view(&pod).await?);
        }
        views.sort_by(|a, b| {
            a.metadata
                .namespace
                .cmp(&b.metadata.namespace)
                .then_with(|| a.metadata.name.cmp(&b.metadata.name))
        });
        Ok(views)
    }

    pub async fn get_pod_view(
        &self,
        user: &UserInfo,
        namespace: &str,
        name: &str,
    ) -> Result<PodView> {
        let rid = self.require("", "Pod")?;
        self.check_get(user, &rid, namespace, name).await?;
        let pod = self
            .cluster()
            .get(&rid, Some(namespace), name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("pod {namespace}/{name}")))?;
        self.pod_view(&pod).await
    }

    async fn pod_view(&self, pod: &DynamicObject) -> Result<PodView> {
        let usage = match self.preferred(METRICS_GROUP, "PodMetrics") {
            Some(rid) => self.pod_usage(&rid, pod).await?,
            None => vec![],
        };
        let spec = pod.data.get("spec").unwrap_or(&Value::Null);

        let mut containers = Vec::new();
        let mut total_usage = quantity::Amounts::new();
        for c in spec.get("containers").and_then(Value::as_array).into_iter().flatten() {
            let name = c.get("name").and_then(Value::as_str).unwrap_or_default();
            let resources = c.get("resources");
            let used = usage
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, u)| u.clone())
                .unwrap_or_default();
            quantity::add(&mut total_usage, &used);
            containers.push(ContainerView {
                name: name.to_string(),
                image: c
                    .get("image")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                resources: PodResources {
                    requests: quantity::to_list(&quantity::amounts(
                        resources.and_then(|r| r.get("requests")),
                    )),
                    limits: quantity::to_list(&quantity::amounts(
                        resources.and_then(|r| r.get("limits")),
                    )),
                    usage: quantity::to_list(&used),
                },
            });
        }

        let app = calc::containers(spec, "containers");
        Ok(PodView {
            metadata: ObjectMeta {
                name: Some(pod.name_any()),
                namespace: pod.namespace(),
                uid: pod.uid(),
                creation_timestamp: pod.metadata.creation_timestamp.clone(),
                labels: pod.metadata.labels.clone(),
                ..Default::default()
            },
            spec: PodViewSpec {
                resources: PodResources {
                    requests: quantity::to_list(&app.requests),
                    limits: quantity::to_list(&app.limits),
                    usage: quantity::to_list(&total_usage),
                },
                containers,
            },
            status: pod.data.get("status").cloned().unwrap_or_default(),
        })
    }

    /// Live usage per container, from the pod's `PodMetrics`.
    async fn pod_usage(
        &self,
        rid: &ResourceId,
        pod: &DynamicObject,
    ) -> Result<Vec<(String, quantity::Amounts)>> {
        let ns = pod.namespace();
        let Some(metrics) = self.cluster().get(rid, ns.as_deref(), &pod.name_any()).await? else {
            return Ok(vec![]);
        };
        Ok(metrics
            .data
            .get("containers")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|c| {
                let name = c.get("name").and_then(Value::as_str).unwrap_or_default();
                (name.to_string(), quantity::amounts(c.get("usage")))
            })
            .collect())
    }
}
