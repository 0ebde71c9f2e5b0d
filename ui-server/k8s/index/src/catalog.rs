//! Descriptor, layout and dashboard documents.
//!
//! A set of descriptors for built-in kinds is embedded in the binary. Operators may add to or
//! override them with YAML documents from a directory.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use ui_server_core::{version, GroupKind};
use ui_server_k8s_api::{
    descriptor::ResourceDescriptor,
    layout::{ResourceBlockDefinition, ResourceDashboard, ResourceLayout},
};

static EMBEDDED: &[(&str, &str)] = &[
    ("core.yaml", include_str!("../descriptors/core.yaml")),
    ("apps.yaml", include_str!("../descriptors/apps.yaml")),
    ("batch.yaml", include_str!("../descriptors/batch.yaml")),
    ("networking.yaml", include_str!("../descriptors/networking.yaml")),
    ("monitoring.yaml", include_str!("../descriptors/monitoring.yaml")),
    ("stash.yaml", include_str!("../descriptors/stash.yaml")),
];

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    descriptors: Vec<ResourceDescriptor>,
    layouts: Vec<ResourceLayout>,
    dashboards: Vec<ResourceDashboard>,
    blocks: Vec<ResourceBlockDefinition>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid document in {name}: {source}")]
    Yaml {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl Catalog {
    pub fn embedded() -> Result<Self, Error> {
        let mut catalog = Self::default();
        for (name, yaml) in EMBEDDED {
            catalog.load_str(name, yaml)?;
        }
        Ok(catalog)
    }

    /// Loads every `*.yaml`/`*.yml` file in `dir`, in file name order.
    pub fn load_dir(&mut self, dir: &Path) -> Result<(), Error> {
        let io = |source| Error::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = std::fs::read_dir(dir)
            .map_err(io)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect::<Vec<_>>();
        paths.sort();
        for path in paths {
            let yaml = std::fs::read_to_string(&path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            self.load_str(&path.display().to_string(), &yaml)?;
        }
        Ok(())
    }

    /// Loads a stream of YAML documents, dispatching on each document's `kind`.
    pub fn load_str(&mut self, name: &str, yaml: &str) -> Result<(), Error> {
        use serde::Deserialize;

        let yaml_err = |source| Error::Yaml {
            name: name.to_string(),
            source,
        };
        for doc in serde_yaml::Deserializer::from_str(yaml) {
            let value = serde_yaml::Value::deserialize(doc).map_err(yaml_err)?;
            if value.is_null() {
                continue;
            }
            let kind = value
                .get("kind")
                .and_then(|k| k.as_str())
                .unwrap_or_default()
                .to_string();
            match kind.as_str() {
                "ResourceDescriptor" => {
                    let d = serde_yaml::from_value(value).map_err(yaml_err)?;
                    self.add_descriptor(d);
                }
                "ResourceLayout" => {
                    let l: ResourceLayout = serde_yaml::from_value(value).map_err(yaml_err)?;
                    self.layouts.retain(|o| o.metadata.name != l.metadata.name);
                    self.layouts.push(l);
                }
                "ResourceDashboard" => {
                    let d: ResourceDashboard = serde_yaml::from_value(value).map_err(yaml_err)?;
                    self.dashboards.retain(|o| o.metadata.name != d.metadata.name);
                    self.dashboards.push(d);
                }
                "ResourceBlockDefinition" => {
                    let b: ResourceBlockDefinition =
                        serde_yaml::from_value(value).map_err(yaml_err)?;
                    self.blocks.retain(|o| o.metadata.name != b.metadata.name);
                    self.blocks.push(b);
                }
                other => warn!(%name, kind = %other, "ignoring unknown document kind"),
            }
        }
        Ok(())
    }

    /// Adds a descriptor, replacing any descriptor for the same group, version and kind.
    pub fn add_descriptor(&mut self, desc: ResourceDescriptor) {
        let res = &desc.spec.resource;
        debug!(kind = %res.kind, group = %res.group, version = %res.version, "loaded descriptor");
        self.descriptors.retain(|d| {
            let r = &d.spec.resource;
            (&r.group, &r.version, &r.kind) != (&res.group, &res.version, &res.kind)
        });
        self.descriptors.push(desc);
    }

    pub fn descriptors(&self) -> &[ResourceDescriptor] {
        &self.descriptors
    }

    /// The descriptor for the highest described version of a kind.
    pub fn descriptor(&self, gk: &GroupKind) -> Option<&ResourceDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| d.spec.resource.group_kind() == *gk)
            .max_by(|a, b| version::compare(&a.spec.resource.version, &b.spec.resource.version))
    }

    /// The layout for a kind: a named one if requested, otherwise the kind's default layout.
    pub fn layout(&self, gk: &GroupKind, name: Option<&str>) -> Option<&ResourceLayout> {
        if let Some(name) = name {
            return self.layouts.iter().find(|l| l.metadata.name == name);
        }
        let mut candidates = self
            .layouts
            .iter()
            .filter(|l| l.spec.resource.group_kind() == *gk);
        let first = candidates.clone().next();
        candidates.find(|l| l.spec.default_layout).or(first)
    }

    pub fn dashboards(&self, gk: &GroupKind) -> Option<&ResourceDashboard> {
        self.dashboards
            .iter()
            .find(|d| d.spec.resource.group_kind() == *gk)
    }

    pub fn block(&self, name: &str) -> Option<&ResourceBlockDefinition> {
        self.blocks.iter().find(|b| b.metadata.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_documents_load() {
        let catalog = Catalog::embedded().expect("embedded descriptors must parse");
        for (group, kind) in [
            ("apps", "Deployment"),
            ("apps", "ReplicaSet"),
            ("apps", "StatefulSet"),
            ("apps", "DaemonSet"),
            ("", "Pod"),
            ("batch", "Job"),
            ("batch", "CronJob"),
            ("", "Service"),
            ("", "PersistentVolumeClaim"),
            ("monitoring.coreos.com", "ServiceMonitor"),
            ("monitoring.coreos.com", "PodMonitor"),
            ("networking.k8s.io", "Ingress"),
        ] {
            assert!(
                catalog.descriptor(&GroupKind::new(group, kind)).is_some(),
                "missing descriptor for {kind}.{group}"
            );
        }
    }

    #[test]
    fn later_documents_override() {
        let mut catalog = Catalog::default();
        let doc = |n: usize| {
            format!(
                "kind: ResourceDescriptor\nmetadata:\n  name: d{n}\nspec:\n  resource:\n    group: apps\n    version: v1\n    name: deployments\n    kind: Deployment\n"
            )
        };
        catalog.load_str("a", &doc(1)).unwrap();
        catalog.load_str("b", &doc(2)).unwrap();
        assert_eq!(catalog.descriptors().len(), 1);
        assert_eq!(catalog.descriptors()[0].metadata.name, "d2");
    }

    #[test]
    fn picks_default_layout() {
        let mut catalog = Catalog::default();
        catalog
            .load_str(
                "layouts",
                r#"
kind: ResourceLayout
metadata: {name: other}
spec:
  resource: {group: apps, version: v1, name: deployments, kind: Deployment}
---
kind: ResourceLayout
metadata: {name: main}
spec:
  resource: {group: apps, version: v1, name: deployments, kind: Deployment}
  defaultLayout: true
"#,
            )
            .unwrap();
        let gk = GroupKind::new("apps", "Deployment");
        assert_eq!(catalog.layout(&gk, None).unwrap().metadata.name, "main");
        assert_eq!(catalog.layout(&gk, Some("other")).unwrap().metadata.name, "other");
        assert!(catalog.layout(&GroupKind::new("", "Pod"), None).is_none());
    }
}
