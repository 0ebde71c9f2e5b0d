//! Policy, vulnerability and runtime-security reports, and the scanner, Gatekeeper and Falco
//! shapes they are built from.

use crate::meta::ObjectLocator;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ui_server_core::ObjectId;

pub const SEVERITIES: [&str; 5] = ["CRITICAL", "HIGH", "MEDIUM", "LOW", "UNKNOWN"];

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub source: ObjectLocator,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReport {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ReportRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<PolicyReportResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReportResponse {
    pub constraints: Vec<ConstraintReport>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintReport {
    pub kind: String,
    pub name: String,
    pub violations: Vec<Violation>,
}

/// One entry of a Gatekeeper constraint's `status.violations`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    #[serde(default)]
    pub enforcement_action: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintStatus {
    #[serde(default)]
    pub total_violations: Option<i64>,
    #[serde(default)]
    pub violations: Vec<Violation>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CveReport {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ReportRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<CveReportResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CveReportResponse {
    pub images: Vec<ImageInfo>,
    pub vulnerabilities: VulnerabilityInfo,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub image: String,
    /// The pods running this image.
    #[serde(default)]
    pub lineages: Vec<ObjectId>,
    #[serde(default)]
    pub scanned: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityInfo {
    pub stats: BTreeMap<String, RiskStats>,
    pub cves: Vec<Vulnerability>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskStats {
    pub occurrence: u64,
    pub unique: u64,
}

/// A scanner finding, in the scanner's field naming.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vulnerability {
    #[serde(rename = "VulnerabilityID")]
    pub vulnerability_id: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pkg_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub installed_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fixed_version: String,
    #[serde(default, rename = "PrimaryURL", skip_serializing_if = "String::is_empty")]
    pub primary_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ImageRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ImageResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub image: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub image: String,
    pub report_name: String,
    pub scanned: bool,
    pub vulnerabilities: VulnerabilityInfo,
}

/// The `status` of a scanner `ImageScanReport`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageScanReportStatus {
    #[serde(default)]
    pub report: ScanReport,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanReport {
    #[serde(default)]
    pub results: Vec<ScanResult>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanResult {
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FalcoReport {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ReportRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<FalcoReportResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FalcoReportResponse {
    /// Event counts by priority.
    pub stats: BTreeMap<String, u64>,
    pub events: Vec<FalcoEventInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FalcoEventInfo {
    pub name: String,
    pub pod: ObjectId,
    #[serde(flatten)]
    pub spec: FalcoEventSpec,
}

/// The `spec` of a `FalcoEvent` recorded by the Falco sidekick.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FalcoEventSpec {
    #[serde(default)]
    pub pod_ref: PodRef,
    #[serde(default, rename = "nodename", skip_serializing_if = "String::is_empty")]
    pub node_name: String,
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub time: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output_fields: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodRef {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}
