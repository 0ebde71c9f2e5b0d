use super::*;
use maplit::btreemap;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use ui_server_core::{ResourceId, Scope};
use ui_server_k8s_api::{
    cluster::{reason, ClusterPhase},
    feature::{
        Feature, FeatureSet, FeatureSetSpec, FeatureSpec, FeatureStatus, GroupVersionKind,
        ReadinessChecks, Requirements, WorkloadInfo,
    },
};
use ui_server_k8s_index::{memory::InMemoryCluster, Registry, SharedRegistry};

struct Harness {
    cluster: Arc<InMemoryCluster>,
    registry: SharedRegistry,
    evaluator: FeatureEvaluator,
}

fn served_types() -> Vec<ResourceId> {
    use Scope::*;
    vec![
        ResourceId::new("", "v1", "pods", "Pod", Namespaced),
        ResourceId::new("apps", "v1", "deployments", "Deployment", Namespaced),
        ResourceId::new(HELM_GROUP, "v2", "helmreleases", "HelmRelease", Namespaced),
        ResourceId::new(FEATURE_GROUP, "v1alpha1", "features", "Feature", Cluster),
        ResourceId::new(FEATURE_GROUP, "v1alpha1", "featuresets", "FeatureSet", Cluster),
    ]
}

impl Harness {
    fn new() -> Self {
        let cluster = Arc::new(InMemoryCluster::default());
        let registry = Arc::new(parking_lot::RwLock::new(
            served_types().into_iter().collect::<Registry>(),
        ));
        let evaluator = FeatureEvaluator::new(cluster.clone(), registry.clone());
        Self {
            cluster,
            registry,
            evaluator,
        }
    }

    fn apply(&self, value: Value) {
        self.cluster.apply_json(value).expect("object must be valid");
    }

    async fn evaluate(&self, feature: &Feature) -> FeatureStatus {
        self.evaluator
            .evaluate(feature)
            .await
            .expect("evaluation must succeed")
    }

    fn poller(&self, required: &[&str]) -> ClusterStatusPoller {
        ClusterStatusPoller::new(
            self.cluster.clone(),
            self.registry.clone(),
            required.iter().map(|s| s.to_string()).collect(),
            Duration::from_secs(120),
        )
    }
}

fn kps() -> Feature {
    Feature::new(
        "kube-prometheus-stack",
        FeatureSpec {
            title: "Prometheus".to_string(),
            feature_set: "opscenter-monitoring".to_string(),
            readiness_checks: ReadinessChecks {
                workloads: vec![WorkloadInfo {
                    gvk: GroupVersionKind::new("apps", "v1", "Deployment"),
                    selector: btreemap! { "app".to_string() => "kps".to_string() },
                }],
                ..Default::default()
            },
            ..Default::default()
        },
    )
}

fn deployment(name: &str, ready: i64) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": name, "namespace": "monitoring", "labels": {"app": "kps"}},
        "spec": {"replicas": 1},
        "status": {"replicas": 1, "readyReplicas": ready},
    })
}

fn helm_release(ready: &str) -> Value {
    json!({
        "apiVersion": "helm.toolkit.fluxcd.io/v2",
        "kind": "HelmRelease",
        "metadata": {
            "name": "kube-prometheus-stack",
            "namespace": "kubeops",
            "labels": {
                "app.kubernetes.io/component": "kube-prometheus-stack",
                "app.kubernetes.io/part-of": "opscenter-monitoring",
            },
        },
        "status": {"conditions": [
            {"type": "Ready", "status": ready, "message": "install retries exhausted"},
        ]},
    })
}

fn status(enabled: bool, managed: bool, ready: bool) -> (Option<bool>, Option<bool>, Option<bool>) {
    (Some(enabled), Some(managed), Some(ready))
}

fn flags(st: &FeatureStatus) -> (Option<bool>, Option<bool>, Option<bool>) {
    (st.enabled, st.managed, st.ready)
}

#[tokio::test]
async fn feature_follows_its_helm_release() {
    let h = Harness::new();
    h.apply(deployment("kps-operator", 1));
    h.apply(helm_release("True"));

    let st = h.evaluate(&kps()).await;
    assert_eq!(flags(&st), status(true, true, true));
    assert_eq!(st.note, "");

    h.apply(helm_release("False"));
    let st = h.evaluate(&kps()).await;
    assert_eq!(flags(&st), status(true, true, false));
    assert_eq!(
        st.note,
        "HelmRelease kube-prometheus-stack is not ready: install retries exhausted"
    );
}

#[tokio::test]
async fn feature_without_release_is_externally_managed() {
    let h = Harness::new();
    h.apply(deployment("kps-operator", 1));
    let st = h.evaluate(&kps()).await;
    assert_eq!(flags(&st), status(true, false, true));
}

#[tokio::test]
async fn missing_workload_disables_feature() {
    let h = Harness::new();
    h.apply(helm_release("True"));
    let st = h.evaluate(&kps()).await;
    assert_eq!(flags(&st), status(false, false, false));
}

#[tokio::test]
async fn unready_workload_blocks_readiness() {
    let h = Harness::new();
    h.apply(deployment("kps-operator", 0));
    h.apply(helm_release("True"));
    let st = h.evaluate(&kps()).await;
    assert_eq!(flags(&st), status(true, true, false));
    assert_eq!(st.note, "Deployment kps-operator is not ready");
}

#[tokio::test]
async fn unregistered_resource_disables_feature() {
    let h = Harness::new();
    h.apply(deployment("kps-operator", 1));
    h.apply(helm_release("True"));
    let mut feature = kps();
    feature.spec.readiness_checks.resources =
        vec![GroupVersionKind::new("monitoring.coreos.com", "v1", "ServiceMonitor")];
    let st = h.evaluate(&feature).await;
    assert_eq!(st.enabled, Some(false));
    assert_eq!(
        st.note,
        "resource monitoring.coreos.com/v1/ServiceMonitor is not registered"
    );
}

#[tokio::test]
async fn disabled_dependency_blocks_readiness() {
    let h = Harness::new();
    h.apply(deployment("kps-operator", 1));
    h.apply(helm_release("True"));
    h.apply(json!({
        "apiVersion": "ui.k8s.appscode.com/v1alpha1",
        "kind": "Feature",
        "metadata": {"name": "cert-manager"},
        "spec": {"featureSet": "opscenter-security"},
        "status": {"enabled": false},
    }));
    let mut feature = kps();
    feature.spec.requirements = Requirements {
        features: vec!["cert-manager".to_string()],
    };
    let st = h.evaluate(&feature).await;
    assert_eq!(flags(&st), status(true, true, false));
    assert_eq!(st.note, "required feature cert-manager is not enabled");
}

fn with_status(name: &str, set: &str, st: (bool, bool, bool)) -> Feature {
    let mut f = Feature::new(
        name,
        FeatureSpec {
            feature_set: set.to_string(),
            ..Default::default()
        },
    );
    f.status = Some(FeatureStatus {
        enabled: Some(st.0),
        managed: Some(st.1),
        ready: Some(st.2),
        note: String::new(),
    });
    f
}

#[test]
fn rolls_up_required_features() {
    let set = FeatureSet::new(
        "opscenter-monitoring",
        FeatureSetSpec {
            required_features: vec!["kube-prometheus-stack".to_string(), "grafana".to_string()],
            ..Default::default()
        },
    );
    let mut features = vec![
        with_status("kube-prometheus-stack", "opscenter-monitoring", (true, true, true)),
        with_status("grafana", "opscenter-monitoring", (true, false, false)),
        with_status("panopticon", "opscenter-monitoring", (false, false, false)),
        with_status("cert-manager", "opscenter-security", (true, true, true)),
    ];

    let st = roll_up(&set, &features);
    assert_eq!(st.enabled, Some(true));
    assert_eq!(st.ready, Some(false));
    assert_eq!(st.note, "required features are not ready: grafana");
    let names = st.features.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["grafana", "kube-prometheus-stack", "panopticon"]);

    features[1] = with_status("grafana", "opscenter-monitoring", (true, true, true));
    let st = roll_up(&set, &features);
    assert_eq!((st.enabled, st.ready), (Some(true), Some(true)));
    assert_eq!(st.note, "");
}

#[test]
fn removed_feature_no_longer_enables_its_set() {
    let set = FeatureSet::new(
        "opscenter-monitoring",
        FeatureSetSpec {
            required_features: vec!["kube-prometheus-stack".to_string(), "grafana".to_string()],
            ..Default::default()
        },
    );
    let mut features = vec![
        with_status("kube-prometheus-stack", "opscenter-monitoring", (true, true, true)),
        with_status("grafana", "opscenter-monitoring", (false, false, true)),
    ];
    assert_eq!(roll_up(&set, &features).enabled, Some(true));

    feature::mark_removed(&mut features, "kube-prometheus-stack");
    let st = roll_up(&set, &features);
    assert_eq!(st.enabled, Some(false));
    assert_eq!(st.ready, Some(false));
    let removed = &st.features[1];
    assert_eq!(removed.name, "kube-prometheus-stack");
    assert_eq!((removed.enabled, removed.managed), (Some(false), None));
}

#[test]
fn claims_sort_features() {
    let features = vec![
        with_status("kubedb", "opscenter-datastore", (true, true, true)),
        with_status("cert-manager", "opscenter-security", (true, false, true)),
        with_status("grafana", "opscenter-monitoring", (true, true, false)),
        with_status("stash", "opscenter-backup", (false, false, false)),
        Feature::new("velero", FeatureSpec::default()),
    ];
    let claim = feature_claim(&features);
    assert_eq!(claim.enabled_features, vec!["grafana", "kubedb"]);
    assert_eq!(claim.externally_managed_features, vec!["cert-manager"]);
    assert_eq!(claim.disabled_features, vec!["stash", "velero"]);

    let yaml = serde_yaml::to_string(&claim).expect("claim must encode");
    assert!(yaml.starts_with("enabledFeatures:\n- grafana\n- kubedb\n"), "{yaml}");
}

fn flux_controller(name: &str, ready: i64) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": name, "namespace": "flux-system"},
        "spec": {"replicas": 1},
        "status": {"readyReplicas": ready},
    })
}

fn feature_set(name: &str, ready: bool) -> Value {
    json!({
        "apiVersion": "ui.k8s.appscode.com/v1alpha1",
        "kind": "FeatureSet",
        "metadata": {"name": name},
        "spec": {},
        "status": {"ready": ready},
    })
}

#[tokio::test]
async fn cluster_becomes_active_when_flux_and_feature_sets_are_ready() {
    let h = Harness::new();
    let poller = h.poller(&["opscenter-core"]);

    let st = poller.compute().await.expect("status must compute");
    assert_eq!(st.phase, ClusterPhase::NotReady);
    assert_eq!(st.reason, reason::FLUX_NOT_READY);

    h.apply(flux_controller("source-controller", 1));
    h.apply(flux_controller("helm-controller", 1));
    h.apply(feature_set("opscenter-core", false));
    let st = poller.compute().await.expect("status must compute");
    assert_eq!(st.reason, reason::FEATURE_SET_NOT_READY);
    assert_eq!(st.message, "Feature sets are not ready: opscenter-core");

    h.apply(feature_set("opscenter-core", true));
    let st = poller.compute().await.expect("status must compute");
    assert_eq!(st.phase, ClusterPhase::Active);
    assert_eq!(st.reason, "");
}

#[tokio::test]
async fn cluster_without_flux_or_feature_sets() {
    let h = Harness::new();
    let mut registry = served_types()
        .into_iter()
        .filter(|r| r.group != HELM_GROUP)
        .collect::<Registry>();
    registry.register(ResourceId::new(
        "operator.open-cluster-management.io",
        "v1",
        "klusterlets",
        "Klusterlet",
        Scope::Cluster,
    ));
    *h.registry.write() = registry;

    let st = h.poller(&[]).compute().await.expect("status must compute");
    assert_eq!(st.phase, ClusterPhase::NotReady);
    assert_eq!(st.reason, reason::FLUX_NOT_INSTALLED);
    assert_eq!(st.cluster_managers, vec!["OCM"]);

    *h.registry.write() = Registry::default();
    let st = h.poller(&[]).compute().await.expect("status must compute");
    assert_eq!(st.phase, ClusterPhase::Inactive);
    assert!(st.cluster_managers.is_empty());
}

#[tokio::test]
async fn reports_cluster_api_cluster() {
    let h = Harness::new();
    h.registry.write().register(ResourceId::new(
        "cluster.x-k8s.io",
        "v1beta1",
        "clusters",
        "Cluster",
        Scope::Namespaced,
    ));
    h.apply(json!({
        "apiVersion": "cluster.x-k8s.io/v1beta1",
        "kind": "Cluster",
        "metadata": {"name": "prod", "namespace": "capi"},
        "spec": {"infrastructureRef": {"kind": "AWSManagedCluster", "name": "prod"}},
    }));
    let st = h.poller(&[]).compute().await.expect("status must compute");
    let capi = st.cluster_api.expect("a CAPI cluster is visible");
    assert_eq!(
        (capi.provider.as_str(), capi.namespace.as_str(), capi.cluster_name.as_str()),
        ("aws", "capi", "prod")
    );
}
