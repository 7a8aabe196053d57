use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::core::{
    Dataset, Environment, Issue, LocationRank, Report, ReportSummary, Severity, SeverityCounts,
    Statistics, VehicleType, utilization,
};
use crate::process::ProcessOutcome;

pub const LATEST_REPORT_NAME: &str = "report-latest.json";
pub const REPORT_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone)]
pub struct ReportContext {
    pub mode: String,
    pub dry_run: bool,
    pub top: usize,
    pub environment: Environment,
    pub generated_at: String,
}

pub fn build_report(
    dataset: &Dataset,
    statistics: &Statistics,
    outcome: &ProcessOutcome,
    ctx: ReportContext,
) -> Report {
    Report {
        schema_version: REPORT_SCHEMA_VERSION.to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        generated_at: ctx.generated_at,
        mode: ctx.mode,
        dry_run: ctx.dry_run,
        environment: ctx.environment,
        summary: ReportSummary {
            location_count: statistics.location_count,
            total_capacity: statistics.total_capacity,
            total_available: statistics.total_available,
            overall_utilization: statistics.overall_utilization,
            issue_count: statistics.issue_count,
            fix_count: statistics.fix_count,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
        },
        by_type: statistics.by_type.clone(),
        top_utilization: top_by_utilization(dataset, ctx.top),
        top_available: top_by_available(dataset, ctx.top),
        severity: severity_counts(&outcome.issues),
        issues: outcome.issues.clone(),
        fixes: outcome.fixes.clone(),
        recommendations: outcome.recommendations.clone(),
    }
}

fn location_rank(location: &crate::core::Location) -> LocationRank {
    let mut capacity = 0;
    let mut available = 0;
    for vehicle_type in VehicleType::ALL {
        let slot = location.slot(vehicle_type);
        capacity += slot.total.as_i64().unwrap_or(0);
        available += slot.available.as_i64().unwrap_or(0);
    }
    LocationRank {
        name: location.name.clone(),
        capacity,
        available,
        utilization: utilization(capacity, available),
    }
}

fn top_by_utilization(dataset: &Dataset, top: usize) -> Vec<LocationRank> {
    let mut ranks: Vec<LocationRank> = dataset
        .locations
        .iter()
        .map(location_rank)
        .filter(|r| r.capacity > 0)
        .collect();
    // 安定ソートなので同率は入力順を保つ。
    ranks.sort_by(|a, b| {
        b.utilization
            .partial_cmp(&a.utilization)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranks.truncate(top);
    ranks
}

fn top_by_available(dataset: &Dataset, top: usize) -> Vec<LocationRank> {
    let mut ranks: Vec<LocationRank> = dataset.locations.iter().map(location_rank).collect();
    ranks.sort_by(|a, b| b.available.cmp(&a.available));
    ranks.truncate(top);
    ranks
}

/// critical/warning は付与済みタグの件数。info は課題を持つロケーション数
/// （元実装の数え方をそのまま踏襲している）。
pub fn severity_counts(issues: &[Issue]) -> SeverityCounts {
    let locations: BTreeSet<&str> = issues.iter().map(|i| i.location.as_str()).collect();
    SeverityCounts {
        critical: issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
            .count() as u64,
        warning: issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count() as u64,
        info: locations.len() as u64,
    }
}

pub fn render_text(report: &Report) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();

    let _ = writeln!(out, "parkir レポート（{}）", report.generated_at);
    let _ = writeln!(out, "モード: {}  ドライラン: {}", report.mode, report.dry_run);
    if let Some(commit) = &report.environment.git_commit {
        let branch = report.environment.git_branch.as_deref().unwrap_or("不明");
        let _ = writeln!(out, "git: {commit}（{branch}）");
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "概要: ロケーション{}件  容量={}  空き={}  利用率={:.1}%  課題={}  修正={}  所要={}ms",
        report.summary.location_count,
        report.summary.total_capacity,
        report.summary.total_available,
        report.summary.overall_utilization,
        report.summary.issue_count,
        report.summary.fix_count,
        report.summary.elapsed_ms
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "種別内訳:");
    for (vehicle_type, stats) in &report.by_type {
        let _ = writeln!(
            out,
            "- {}（{}）: 容量={} 空き={} 利用率={:.1}%",
            vehicle_type.label(),
            vehicle_type,
            stats.capacity,
            stats.available,
            stats.utilization
        );
    }

    if !report.top_utilization.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "利用率上位:");
        for rank in &report.top_utilization {
            let _ = writeln!(
                out,
                "- {}: {:.1}%（容量={} 空き={}）",
                rank.name, rank.utilization, rank.capacity, rank.available
            );
        }
    }

    if !report.top_available.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "空き台数上位:");
        for rank in &report.top_available {
            let _ = writeln!(out, "- {}: 空き={}", rank.name, rank.available);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "重大度: critical={} warning={} info={}",
        report.severity.critical, report.severity.warning, report.severity.info
    );

    if !report.issues.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "課題（{}件）:", report.issues.len());
        for issue in &report.issues {
            let _ = writeln!(
                out,
                "- [{}] {}: {}",
                issue.severity, issue.location, issue.message
            );
        }
    }

    if !report.fixes.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "修正（{}件）:", report.fixes.len());
        for fix in &report.fixes {
            let _ = writeln!(
                out,
                "- {}（{}）: {}",
                fix.location, fix.vehicle_type, fix.message
            );
        }
    }

    if !report.recommendations.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "推奨（{}件）:", report.recommendations.len());
        for rec in &report.recommendations {
            let _ = writeln!(
                out,
                "- [{}] {}: {}",
                rec.severity, rec.location, rec.message
            );
        }
    }

    out
}

#[derive(Debug, Clone)]
pub struct WrittenReports {
    pub dated_json: PathBuf,
    pub latest_json: PathBuf,
    pub dated_text: PathBuf,
}

pub fn write_reports(dir: &Path, report: &Report, now: OffsetDateTime) -> Result<WrittenReports> {
    std::fs::create_dir_all(dir).with_context(|| {
        format!(
            "レポートディレクトリの作成に失敗しました: {}",
            dir.display()
        )
    })?;

    let fmt = format_description!("[year][month][day]-[hour][minute][second]");
    let stamp = now.format(&fmt).unwrap_or_else(|_| "unknown".to_string());

    let buf = serde_json::to_vec_pretty(report).context("レポート(JSON)のシリアライズに失敗しました")?;

    let dated_json = dir.join(format!("report-{stamp}.json"));
    std::fs::write(&dated_json, &buf)
        .with_context(|| format!("レポートの書き込みに失敗しました: {}", dated_json.display()))?;

    let latest_json = dir.join(LATEST_REPORT_NAME);
    std::fs::write(&latest_json, &buf)
        .with_context(|| format!("レポートの書き込みに失敗しました: {}", latest_json.display()))?;

    let dated_text = dir.join(format!("report-{stamp}.txt"));
    std::fs::write(&dated_text, render_text(report))
        .with_context(|| format!("レポートの書き込みに失敗しました: {}", dated_text.display()))?;

    Ok(WrittenReports {
        dated_json,
        latest_json,
        dated_text,
    })
}
