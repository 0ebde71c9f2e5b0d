//! Computed readiness of arbitrary objects, following kstatus conventions.

use serde_json::Value;
use ui_server_k8s_api::ui::GenericResourceStatus;

pub const CURRENT: &str = "Current";
pub const IN_PROGRESS: &str = "InProgress";
pub const FAILED: &str = "Failed";
pub const TERMINATING: &str = "Terminating";

pub fn compute(obj: &Value) -> GenericResourceStatus {
    if obj.pointer("/metadata/deletionTimestamp").is_some_and(|v| !v.is_null()) {
        return status(TERMINATING, "Resource scheduled for deletion");
    }

    let generation = obj.pointer("/metadata/generation").and_then(Value::as_i64);
    let observed = obj.pointer("/status/observedGeneration").and_then(Value::as_i64);
    if let (Some(g), Some(o)) = (generation, observed) {
        if o < g {
            return status(IN_PROGRESS, "Generation not yet observed");
        }
    }

    let kind = obj.get("kind").and_then(Value::as_str).unwrap_or_default();
    let st = obj.get("status").unwrap_or(&Value::Null);
    match kind {
        "Deployment" | "ReplicaSet" | "StatefulSet" => replicated(obj, st),
        "DaemonSet" => {
            let desired = int(st, "desiredNumberScheduled");
            let ready = int(st, "numberReady");
            let updated = int(st, "updatedNumberScheduled");
            if ready < desired || updated < desired {
                status(IN_PROGRESS, &format!("Ready: {ready}/{desired}"))
            } else {
                status(CURRENT, "All replicas scheduled and ready")
            }
        }
        "Pod" => match st.get("phase").and_then(Value::as_str) {
            Some("Succeeded") => status(CURRENT, "Pod has completed successfully"),
            Some("Failed") => status(FAILED, "Pod has failed"),
            Some("Running") if condition(st, "Ready") == Some(true) => {
                status(CURRENT, "Pod is Ready")
            }
            _ => status(IN_PROGRESS, "Pod is not Ready"),
        },
        "Job" => {
            if condition(st, "Complete") == Some(true) {
                status(CURRENT, "Job Completed")
            } else if condition(st, "Failed") == Some(true) {
                status(FAILED, "Job Failed")
            } else {
                status(IN_PROGRESS, "Job in progress")
            }
        }
        "PersistentVolumeClaim" => match st.get("phase").and_then(Value::as_str) {
            Some("Bound") => status(CURRENT, "PVC is Bound"),
            _ => status(IN_PROGRESS, "PVC is not Bound"),
        },
        "Service" => {
            let lb = obj.pointer("/spec/type").and_then(Value::as_str) == Some("LoadBalancer");
            let ingress = st
                .pointer("/loadBalancer/ingress")
                .and_then(Value::as_array)
                .is_some_and(|i| !i.is_empty());
            if lb && !ingress {
                status(IN_PROGRESS, "Pending external IP")
            } else {
                status(CURRENT, "Service is ready")
            }
        }
        _ => match condition(st, "Ready") {
            Some(false) => status(IN_PROGRESS, "Ready condition is not True"),
            _ if condition(st, "Stalled") == Some(true) => status(FAILED, "Resource is stalled"),
            _ => status(CURRENT, "Resource is current"),
        },
    }
}

fn replicated(obj: &Value, st: &Value) -> GenericResourceStatus {
    let desired = obj
        .pointer("/spec/replicas")
        .and_then(Value::as_i64)
        .unwrap_or(1);
    let ready = int(st, "readyReplicas");
    let updated = st
        .get("updatedReplicas")
        .and_then(Value::as_i64)
        .unwrap_or(ready);
    if updated < desired {
        return status(IN_PROGRESS, &format!("Updated: {updated}/{desired}"));
    }
    if ready < desired {
        return status(IN_PROGRESS, &format!("Ready: {ready}/{desired}"));
    }
    status(CURRENT, &format!("Replicas: {ready}/{desired}"))
}

fn int(st: &Value, field: &str) -> i64 {
    st.get(field).and_then(Value::as_i64).unwrap_or(0)
}

/// The value of a standard condition, if present.
pub(crate) fn condition(st: &Value, type_: &str) -> Option<bool> {
    st.get("conditions")?
        .as_array()?
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(type_))
        .and_then(|c| c.get("status").and_then(Value::as_str))
        .map(|s| s == "True")
}

fn status(status: &str, message: &str) -> GenericResourceStatus {
    GenericResourceStatus {
        status: status.to_string(),
        message: message.to_string(),
    }
}
