use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{Fix, Issue, Recommendation, TypeStatistics, VehicleType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub data_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub location_count: usize,
    pub total_capacity: i64,
    pub total_available: i64,
    pub overall_utilization: f64,
    pub issue_count: u64,
    pub fix_count: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRank {
    pub name: String,
    pub capacity: i64,
    pub available: i64,
    pub utilization: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u64,
    pub warning: u64,
    pub info: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub schema_version: String,
    pub tool_version: String,
    pub generated_at: String,
    pub mode: String,
    pub dry_run: bool,
    pub environment: Environment,
    pub summary: ReportSummary,
    pub by_type: BTreeMap<VehicleType, TypeStatistics>,
    pub top_utilization: Vec<LocationRank>,
    pub top_available: Vec<LocationRank>,
    pub severity: SeverityCounts,
    pub issues: Vec<Issue>,
    pub fixes: Vec<Fix>,
    pub recommendations: Vec<Recommendation>,
}
