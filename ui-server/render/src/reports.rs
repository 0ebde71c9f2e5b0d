//! Policy, vulnerability and runtime-security reports.
//!
//! Policy reports read Gatekeeper constraint statuses. CVE reports read the scanner's
//! cluster-scoped `ImageScanReport` objects, named by a hash of the image reference, through a
//! bounded cache. Falco reports read the `FalcoEvent`s recorded for pods.

use crate::{Error, Renderer, Result};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use kube::api::ResourceExt;
use moka::sync::Cache;
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};
use tracing::debug;
use ui_server_core::{EdgeLabel, ObjectId, Oid};
use ui_server_k8s_api::{
    identity::UserInfo,
    reports::{
        ConstraintReport, ConstraintStatus, CveReportResponse, FalcoEventInfo, FalcoEventSpec,
        FalcoReportResponse, ImageInfo, ImageResponse, ImageScanReportStatus,
        PolicyReportResponse, ReportRequest, RiskStats, Violation, Vulnerability,
        VulnerabilityInfo, SEVERITIES,
    },
    REPORTS_GROUP,
};

pub const GATEKEEPER_CONSTRAINTS_GROUP: &str = "constraints.gatekeeper.sh";
const SCAN_REPORT_KIND: &str = "ImageScanReport";
pub const FALCO_EVENTS_GROUP: &str = "falco.appscode.com";
const FALCO_EVENT_KIND: &str = "FalcoEvent";

/// Scan results by image reference. `None` records that an image has not been scanned.
#[derive(Clone)]
pub struct ImageCache {
    cache: Cache<String, Option<Arc<Vec<Vulnerability>>>>,
}

/// Cluster-wide report data, refreshed periodically for metrics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReportSnapshot {
    /// Vulnerability occurrences by `(namespace, image, severity)`.
    pub cve_occurrence: BTreeMap<(String, String, String), u64>,
    /// Pods running each image, as `(namespace, image, kind, name)`.
    pub image_lineage: BTreeSet<(String, String, String, String)>,
    /// Violations by `(namespace, constraint)`.
    pub policy_violations: BTreeMap<(String, String), u64>,
}

/// 64-bit FNV-1a. Only used to derive report names; equal hashes don't imply equal images.
pub fn fnv1a(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    data.iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}

pub fn report_name(image: &str) -> String {
    format!("{:x}", fnv1a(image.as_bytes()))
}

// === impl ImageCache ===

impl ImageCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn get(&self, image: &str) -> Option<Option<Arc<Vec<Vulnerability>>>> {
        self.cache.get(image)
    }

    pub fn insert(&self, image: String, vulns: Option<Arc<Vec<Vulnerability>>>) {
        self.cache.insert(image, vulns);
    }
}

// === impl Renderer ===

impl Renderer {
    /// Collects the Gatekeeper violations of objects in the source's offshoot closure.
    pub async fn policy_report(
        &self,
        user: &UserInfo,
        req: &ReportRequest,
    ) -> Result<PolicyReportResponse> {
        let src = self.source(user, &req.source).await?;
        let closure = self.closure(&src.id.oid());
        let mut constraints = Vec::new();
        for (kind, name, violations) in self.constraint_violations().await? {
            let violations = violations
                .into_iter()
                .filter(|v| closure.contains(&violation_oid(v)))
                .collect::<Vec<_>>();
            if !violations.is_empty() {
                constraints.push(ConstraintReport {
                    kind,
                    name,
                    violations,
                });
            }
        }
        Ok(PolicyReportResponse { constraints })
    }

    /// Aggregates the vulnerabilities of every image run by pods in the source's closure.
    pub async fn cve_report(
        &self,
        user: &UserInfo,
        req: &ReportRequest,
    ) -> Result<CveReportResponse> {
        let src = self.source(user, &req.source).await?;
        let pods = self.closure_pods(&src.id);

        let mut lineages = BTreeMap::<String, Vec<ObjectId>>::new();
        for pod in self.fetch(&pods).await? {
            let id = ui_server_k8s_index::object_id(&pod)?;
            for image in images(&pod.data) {
                lineages.entry(image).or_default().push(id.clone());
            }
        }

        let mut infos = Vec::with_capacity(lineages.len());
        let mut all = Vec::new();
        for (image, lineages) in lineages {
            let vulns = self.scan(&image).await?;
            if let Some(vulns) = &vulns {
                all.extend(vulns.iter().cloned());
            }
            infos.push(ImageInfo {
                image,
                lineages,
                scanned: vulns.is_some(),
            });
        }
        Ok(CveReportResponse {
            images: infos,
            vulnerabilities: summarize(all),
        })
    }

    /// Collects the Falco events raised by pods in the source's offshoot closure.
    pub async fn falco_report(
        &self,
        user: &UserInfo,
        req: &ReportRequest,
    ) -> Result<FalcoReportResponse> {
        let src = self.source(user, &req.source).await?;
        let pods = self
            .closure_pods(&src.id)
            .into_iter()
            .collect::<HashSet<_>>();
        let Some(rid) = self.preferred(FALCO_EVENTS_GROUP, FALCO_EVENT_KIND) else {
            debug!("Falco events are not served");
            return Ok(FalcoReportResponse::default());
        };

        let listed = match self.cluster().list(&rid, None, None).await {
            Ok(listed) => listed,
            Err(error) if error.is_absent() => return Ok(FalcoReportResponse::default()),
            Err(error) => return Err(error.into()),
        };
        let mut events = Vec::new();
        for event in listed {
            let spec = event
                .data
                .get("spec")
                .cloned()
                .map(serde_json::from_value::<FalcoEventSpec>)
                .transpose()?
                .unwrap_or_default();
            let pod = ObjectId::new("", "Pod", &spec.pod_ref.namespace, &spec.pod_ref.name);
            if pods.contains(&pod) {
                events.push(FalcoEventInfo {
                    name: event.name_any(),
                    pod,
                    spec,
                });
            }
        }
        events.sort_by(|a, b| a.spec.time.cmp(&b.spec.time).then_with(|| a.name.cmp(&b.name)));

        let mut stats = BTreeMap::<String, u64>::new();
        for e in &events {
            *stats.entry(e.spec.priority.clone()).or_default() += 1;
        }
        Ok(FalcoReportResponse { stats, events })
    }

    /// The scan report for one image reference.
    pub async fn image_report(&self, image: &str) -> Result<ImageResponse> {
        if image.is_empty() {
            return Err(Error::bad_request("image is required"));
        }
        let vulns = self.scan(image).await?;
        Ok(ImageResponse {
            image: image.to_string(),
            report_name: report_name(image),
            scanned: vulns.is_some(),
            vulnerabilities: summarize(vulns.map(|v| v.to_vec()).unwrap_or_default()),
        })
    }

    /// Counts vulnerabilities, images and violations across the cluster.
    pub async fn report_snapshot(&self) -> Result<ReportSnapshot> {
        let mut snapshot = ReportSnapshot::default();
        if let Some(pods) = self.preferred("", "Pod") {
            let mut seen = HashSet::new();
            for pod in self.cluster().list(&pods, None, None).await? {
                let ns = pod.namespace().unwrap_or_default();
                for image in images(&pod.data) {
                    snapshot.image_lineage.insert((
                        ns.clone(),
                        image.clone(),
                        "Pod".to_string(),
                        pod.name_any(),
                    ));
                    if !seen.insert((ns.clone(), image.clone())) {
                        continue;
                    }
                    let Some(vulns) = self.scan(&image).await? else {
                        continue;
                    };
                    for v in vulns.iter() {
                        *snapshot
                            .cve_occurrence
                            .entry((ns.clone(), image.clone(), severity(&v.severity)))
                            .or_default() += 1;
                    }
                }
            }
        }
        for (_, name, violations) in self.constraint_violations().await? {
            for v in violations {
                *snapshot
                    .policy_violations
                    .entry((v.namespace, name.clone()))
                    .or_default() += 1;
            }
        }
        Ok(snapshot)
    }

    /// The pods in the offshoot closure of `src`, including `src` itself when it is a pod.
    fn closure_pods(&self, src: &ObjectId) -> Vec<ObjectId> {
        let mut pods = self
            .closure(&src.oid())
            .into_iter()
            .filter_map(|oid| oid.parse().ok())
            .filter(|id: &ObjectId| id.group.is_empty() && id.kind == "Pod")
            .collect::<Vec<_>>();
        if src.group.is_empty() && src.kind == "Pod" && !pods.contains(src) {
            pods.push(src.clone());
        }
        pods.sort();
        pods
    }

    fn closure(&self, oid: &Oid) -> HashSet<Oid> {
        self.graph()
            .read()
            .connected_oids([oid.clone()], EdgeLabel::Offshoot)
            .into_iter()
            .collect()
    }

    /// Every Gatekeeper constraint with its violations, as `(kind, name, violations)`.
    async fn constraint_violations(&self) -> Result<Vec<(String, String, Vec<Violation>)>> {
        let kinds = self
            .registry()
            .read()
            .kinds_in_group(GATEKEEPER_CONSTRAINTS_GROUP);
        let mut found = Vec::new();
        for rid in kinds {
            for c in self.cluster().list(&rid, None, None).await? {
                let status = c
                    .data
                    .get("status")
                    .cloned()
                    .map(serde_json::from_value::<ConstraintStatus>)
                    .transpose()?
                    .unwrap_or_default();
                found.push((rid.kind.clone(), c.name_any(), status.violations));
            }
        }
        Ok(found)
    }

    /// Looks up an image's vulnerabilities, through the cache.
    async fn scan(&self, image: &str) -> Result<Option<Arc<Vec<Vulnerability>>>> {
        if let Some(hit) = self.inner.images.get(image) {
            return Ok(hit);
        }
        let Some(rid) = self.preferred(REPORTS_GROUP, SCAN_REPORT_KIND) else {
            return Ok(None);
        };
        let name = report_name(image);
        let vulns = match self.cluster().get(&rid, None, &name).await? {
            Some(report) => {
                let status = report
                    .data
                    .get("status")
                    .cloned()
                    .map(serde_json::from_value::<ImageScanReportStatus>)
                    .transpose()?
                    .unwrap_or_default();
                let vulns = status
                    .report
                    .results
                    .into_iter()
                    .flat_map(|r| r.vulnerabilities)
                    .collect::<Vec<_>>();
                Some(Arc::new(vulns))
            }
            None => {
                debug!(%image, report = %name, "Image has not been scanned");
                None
            }
        };
        self.inner.images.insert(image.to_string(), vulns.clone());
        Ok(vulns)
    }
}

fn violation_oid(v: &Violation) -> Oid {
    ObjectId::new(&v.group, &v.kind, &v.namespace, &v.name).oid()
}

/// Images of a pod's containers and init containers, deduplicated.
fn images(pod: &Value) -> Vec<String> {
    let mut images = Vec::new();
    for field in ["initContainers", "containers"] {
        let containers = pod
            .pointer(&format!("/spec/{field}"))
            .and_then(Value::as_array);
        for c in containers.into_iter().flatten() {
            if let Some(image) = c.get("image").and_then(Value::as_str) {
                if !images.iter().any(|i| i == image) {
                    images.push(image.to_string());
                }
            }
        }
    }
    images
}

fn severity(s: &str) -> String {
    let s = s.to_ascii_uppercase();
    if SEVERITIES.contains(&s.as_str()) {
        s
    } else {
        "UNKNOWN".to_string()
    }
}

/// Counts occurrences and distinct CVEs per severity. The CVE list is deduplicated.
fn summarize(vulns: Vec<Vulnerability>) -> VulnerabilityInfo {
    let mut stats = SEVERITIES
        .iter()
        .map(|s| (s.to_string(), RiskStats::default()))
        .collect::<BTreeMap<_, _>>();
    let mut unique = HashMap::<String, Vulnerability>::new();
    for v in vulns {
        let sev = severity(&v.severity);
        if let Some(s) = stats.get_mut(&sev) {
            s.occurrence += 1;
        }
        unique.entry(v.vulnerability_id.clone()).or_insert(v);
    }
    for v in unique.values() {
        if let Some(s) = stats.get_mut(&severity(&v.severity)) {
            s.unique += 1;
        }
    }
    let mut cves = unique.into_values().collect::<Vec<_>>();
    cves.sort();
    VulnerabilityInfo { stats, cves }
}
