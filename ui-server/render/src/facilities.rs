use crate::{exec, locate::Source, Renderer, Result};
use serde_json::json;
use ui_server_core::{EdgeLabel, GroupKind, ObjectId};
use ui_server_k8s_api::{
    meta::ObjectRef,
    ui::{ExecFacility, FacilityUsage, ServiceFacilities, ServiceFacility},
};

const STASH_GROUP: &str = "stash.appscode.com";
const MONITORING_GROUP: &str = "monitoring.coreos.com";

const EXPOSING_TYPES: [&str; 3] = ["LoadBalancer", "NodePort", "ExternalName"];
const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";

const BACKUP_QUERY: &str = r#"query Find($src: String!) {
  find(oid: $src) {
    backup_via(group: "stash.appscode.com", kind: "BackupConfiguration") {
      refs: offshoot(group: "stash.appscode.com", kind: "BackupSession") { group kind namespace name }
    }
  }
}"#;

const SERVICE_MONITOR_QUERY: &str = r#"query Find($src: String!) {
  find(oid: $src) {
    exposed_by(group: "", kind: "Service") {
      refs: monitored_by(group: "monitoring.coreos.com", kind: "ServiceMonitor") { group kind namespace name }
    }
  }
}"#;

const POD_MONITOR_QUERY: &str = r#"query Find($src: String!) {
  find(oid: $src) {
    refs: monitored_by(group: "monitoring.coreos.com", kind: "PodMonitor") { group kind namespace name }
  }
}"#;

impl Renderer {
    pub(crate) async fn facilities(&self, src: &Source) -> Result<ServiceFacilities> {
        Ok(ServiceFacilities {
            exposed: self.exposed(&src.id).await?,
            tls: self.tls(&src.id).await?,
            backup: self.backup(&src.id).await?,
            monitoring: self.monitoring(&src.id).await?,
            exec: self.exec(src).await?,
        })
    }

    async fn exposed(&self, src: &ObjectId) -> Result<ServiceFacility> {
        let svc = GroupKind::new("", "Service");
        if !self.is_served(&svc) {
            return Ok(ServiceFacility::default());
        }
        let ids = self.linked(src, EdgeLabel::ExposedBy, &svc);
        let refs = self
            .fetch(&ids)
            .await?
            .iter()
            .filter(|s| {
                s.data
                    .pointer("/spec/type")
                    .and_then(|t| t.as_str())
                    .is_some_and(|t| EXPOSING_TYPES.contains(&t))
            })
            .filter_map(|s| ui_server_k8s_index::object_id(s).ok())
            .collect();
        Ok(usage(refs))
    }

    async fn tls(&self, src: &ObjectId) -> Result<ServiceFacility> {
        let secret = GroupKind::new("", "Secret");
        if !self.is_served(&secret) {
            return Ok(ServiceFacility::default());
        }
        let ids = self.linked(src, EdgeLabel::Config, &secret);
        let refs = self
            .fetch(&ids)
            .await?
            .iter()
            .filter(|s| s.data.get("type").and_then(|t| t.as_str()) == Some(TLS_SECRET_TYPE))
            .filter_map(|s| ui_server_k8s_index::object_id(s).ok())
            .collect();
        Ok(usage(refs))
    }

    async fn backup(&self, src: &ObjectId) -> Result<ServiceFacility> {
        if !self.is_served(&GroupKind::new(STASH_GROUP, "BackupConfiguration")) {
            return Ok(ServiceFacility::default());
        }
        let vars = json!({ "src": src.oid().as_str() });
        let refs = ui_server_graphql::find_refs(self.schema(), BACKUP_QUERY, vars).await?;
        Ok(usage(refs))
    }

    async fn monitoring(&self, src: &ObjectId) -> Result<ServiceFacility> {
        let sm = self.is_served(&GroupKind::new(MONITORING_GROUP, "ServiceMonitor"));
        let pm = self.is_served(&GroupKind::new(MONITORING_GROUP, "PodMonitor"));
        if !sm && !pm {
            return Ok(ServiceFacility::default());
        }
        let vars = json!({ "src": src.oid().as_str() });
        let mut refs = vec![];
        if sm {
            refs = ui_server_graphql::find_refs(self.schema(), SERVICE_MONITOR_QUERY, vars.clone())
                .await?;
        }
        if refs.is_empty() && pm {
            refs = ui_server_graphql::find_refs(self.schema(), POD_MONITOR_QUERY, vars).await?;
        }
        Ok(usage(refs))
    }

    async fn exec(&self, src: &Source) -> Result<Vec<ExecFacility>> {
        let Some(desc) = self.catalog().descriptor(&src.id.group_kind()) else {
            return Ok(vec![]);
        };
        let mut execs = Vec::new();
        for def in &desc.spec.exec {
            if let Some(req) = &def.condition {
                if !self.satisfied(req, &src.id, &src.data).await? {
                    continue;
                }
            }
            let ns = src.id.namespace.clone();
            let (resource, name, target) = match &def.service_name_template {
                Some(tmpl) => {
                    let name = self.templates().render(tmpl, &src.data)?;
                    let Some(svc) = self.preferred("", "Service") else {
                        continue;
                    };
                    let target = format!("svc/{name}");
                    (svc, name, target)
                }
                None if src.id.kind == "Pod" => {
                    (src.rid.clone(), src.id.name.clone(), src.id.name.clone())
                }
                None => {
                    let target = format!("{}/{}", src.id.kind.to_lowercase(), src.id.name);
                    (src.rid.clone(), src.id.name.clone(), target)
                }
            };
            execs.push(ExecFacility {
                alias: def.alias.clone(),
                resource,
                kubectl_command: exec::kubectl_command(
                    &ns,
                    &target,
                    def.container.as_deref(),
                    &def.command,
                ),
                reference: ObjectRef {
                    namespace: ns,
                    name,
                },
                container: def.container.clone(),
                command: def.command.clone(),
                help: def.help.clone(),
            });
        }
        Ok(execs)
    }

    fn linked(&self, src: &ObjectId, label: EdgeLabel, gk: &GroupKind) -> Vec<ObjectId> {
        self.graph()
            .read()
            .links(&src.oid(), label)
            .remove(gk)
            .unwrap_or_default()
    }
}

fn usage(refs: Vec<ObjectId>) -> ServiceFacility {
    ServiceFacility {
        usage: if refs.is_empty() {
            FacilityUsage::Unused
        } else {
            FacilityUsage::Used
        },
        refs,
    }
}
