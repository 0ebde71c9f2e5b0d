//! Resource calculators for workload kinds.
//!
//! A calculator reads a workload's pod template and replica count and derives the resources
//! the workload requests. `app` totals count only regular containers; `total` totals use the
//! effective pod resources, which also cover init containers and pod overhead.

use crate::quantity::{self, Amounts};
use serde_json::Value;
use std::collections::BTreeMap;
use ui_server_core::GroupKind;

/// Kinds with a calculator, as `(group, kind, pod spec pointer)`.
const CALCULATORS: &[(&str, &str, &str)] = &[
    ("", "Pod", "/spec"),
    ("apps", "Deployment", "/spec/template/spec"),
    ("apps", "ReplicaSet", "/spec/template/spec"),
    ("apps", "StatefulSet", "/spec/template/spec"),
    ("apps", "DaemonSet", "/spec/template/spec"),
    ("batch", "Job", "/spec/template/spec"),
    ("batch", "CronJob", "/spec/jobTemplate/spec/template/spec"),
];

pub(crate) const MODE_STANDALONE: &str = "Standalone";
pub(crate) const MODE_REPLICATED: &str = "Replicated";
pub(crate) const MODE_DAEMON: &str = "DaemonSet";

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Totals {
    pub requests: Amounts,
    pub limits: Amounts,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Calculated {
    pub replicas: i64,
    pub role_replicas: BTreeMap<String, i64>,
    pub mode: String,
    pub total: Totals,
    pub app: Totals,
    pub role_limits: BTreeMap<String, Amounts>,
    pub role_requests: BTreeMap<String, Amounts>,
    pub version: String,
}

/// Kinds that can be calculated.
pub(crate) fn kinds() -> impl Iterator<Item = GroupKind> {
    CALCULATORS.iter().map(|(g, k, _)| GroupKind::new(*g, *k))
}

pub(crate) fn supports(gk: &GroupKind) -> bool {
    CALCULATORS
        .iter()
        .any(|(g, k, _)| gk.group == *g && gk.kind == *k)
}

pub(crate) fn calculate(gk: &GroupKind, obj: &Value) -> Option<Calculated> {
    let (_, _, pointer) = CALCULATORS
        .iter()
        .find(|(g, k, _)| gk.group == *g && gk.kind == *k)?;
    let pod = obj.pointer(pointer).unwrap_or(&Value::Null);

    let (replicas, mode) = match gk.kind.as_str() {
        "Pod" => (1, MODE_STANDALONE),
        "DaemonSet" => (
            obj.pointer("/status/desiredNumberScheduled")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            MODE_DAEMON,
        ),
        "Job" | "CronJob" => {
            let parallelism = match gk.kind.as_str() {
                "Job" => obj.pointer("/spec/parallelism"),
                _ => obj.pointer("/spec/jobTemplate/spec/parallelism"),
            };
            (parallelism.and_then(Value::as_i64).unwrap_or(1), MODE_STANDALONE)
        }
        _ => {
            let n = obj
                .pointer("/spec/replicas")
                .and_then(Value::as_i64)
                .unwrap_or(1);
            (n, if n > 1 { MODE_REPLICATED } else { MODE_STANDALONE })
        }
    };

    let app = containers(pod, "containers");
    let effective = effective(pod, &app);
    let n = replicas as f64;
    let role = gk.kind.to_lowercase();
    Some(Calculated {
        replicas,
        role_replicas: [(role.clone(), replicas)].into_iter().collect(),
        mode: mode.to_string(),
        total: Totals {
            requests: quantity::scale(&effective.requests, n),
            limits: quantity::scale(&effective.limits, n),
        },
        role_limits: [(role.clone(), app.limits.clone())].into_iter().collect(),
        role_requests: [(role, app.requests.clone())].into_iter().collect(),
        app: Totals {
            requests: quantity::scale(&app.requests, n),
            limits: quantity::scale(&app.limits, n),
        },
        version: image_version(pod),
    })
}

/// Sums the resources of the containers under `field` of a pod spec.
pub(crate) fn containers(pod: &Value, field: &str) -> Totals {
    let mut totals = Totals::default();
    for c in pod.get(field).and_then(Value::as_array).into_iter().flatten() {
        let resources = c.get("resources");
        quantity::add(
            &mut totals.requests,
            &quantity::amounts(resources.and_then(|r| r.get("requests"))),
        );
        quantity::add(
            &mut totals.limits,
            &quantity::amounts(resources.and_then(|r| r.get("limits"))),
        );
    }
    totals
}

/// The resources a pod reserves: the larger of its containers' sum and any single init
/// container, plus overhead.
fn effective(pod: &Value, app: &Totals) -> Totals {
    let mut totals = app.clone();
    for c in pod
        .get("initContainers")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let resources = c.get("resources");
        quantity::max(
            &mut totals.requests,
            &quantity::amounts(resources.and_then(|r| r.get("requests"))),
        );
        quantity::max(
            &mut totals.limits,
            &quantity::amounts(resources.and_then(|r| r.get("limits"))),
        );
    }
    let overhead = quantity::amounts(pod.get("overhead"));
    quantity::add(&mut totals.requests, &overhead);
    quantity::add(&mut totals.limits, &overhead);
    totals
}

/// The tag of the first container's image.
fn image_version(pod: &Value) -> String {
    let image = pod
        .pointer("/containers/0/image")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let image = image.split('@').next().unwrap_or_default();
    let name = image.rsplit('/').next().unwrap_or_default();
    match name.split_once(':') {
        Some((_, tag)) => tag.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use serde_json::json;

    #[test]
    fn deployment_totals() {
        let deploy = json!({
            "spec": {
                "replicas": 3,
                "template": { "spec": {
                    "initContainers": [{
                        "name": "init",
                        "resources": { "requests": { "cpu": "2" } },
                    }],
                    "containers": [
                        {
                            "name": "app",
                            "image": "registry:5000/team/app:1.4.2",
                            "resources": {
                                "requests": { "cpu": "500m", "memory": "128Mi" },
                                "limits": { "cpu": "1" },
                            },
                        },
                        {
                            "name": "sidecar",
                            "image": "sidecar",
                            "resources": { "requests": { "cpu": "250m" } },
                        },
                    ],
                }},
            },
        });
        let calc = calculate(&GroupKind::new("apps", "Deployment"), &deploy).expect("supported");
        assert_eq!(calc.replicas, 3);
        assert_eq!(calc.mode, MODE_REPLICATED);
        assert_eq!(calc.version, "1.4.2");
        assert_eq!(calc.app.requests["cpu"], 2.25);
        assert_eq!(calc.app.limits, btreemap! { "cpu".to_string() => 3.0 });
        // The init container's 2 CPUs exceed the regular containers' 750m.
        assert_eq!(calc.total.requests["cpu"], 6.0);
        assert_eq!(calc.role_replicas, btreemap! { "deployment".to_string() => 3 });
    }

    #[test]
    fn daemonsets_use_scheduled_count() {
        let ds = json!({
            "spec": { "template": { "spec": { "containers": [] } } },
            "status": { "desiredNumberScheduled": 4 },
        });
        let calc = calculate(&GroupKind::new("apps", "DaemonSet"), &ds).expect("supported");
        assert_eq!(calc.replicas, 4);
        assert_eq!(calc.mode, MODE_DAEMON);
    }

    #[test]
    fn unsupported_kinds() {
        assert!(calculate(&GroupKind::new("", "ConfigMap"), &json!({})).is_none());
        assert!(supports(&GroupKind::new("batch", "CronJob")));
        assert_eq!(kinds().count(), CALCULATORS.len());
    }
}
