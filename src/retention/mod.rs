use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use serde_json::json;
use walkdir::WalkDir;

use crate::backup::BACKUP_PREFIX;
use crate::logs::Logger;
use crate::reporting::LATEST_REPORT_NAME;

pub const REPORT_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// 更新時刻の新しい順に max_backups 件だけ残し、残りを削除する。
pub fn prune_backups(dir: &Path, max_backups: usize, logger: &Logger) -> Result<Vec<PathBuf>> {
    let mut backups = collect_files(dir, |name| {
        name.starts_with(BACKUP_PREFIX) && name.ends_with(".json")
    });
    backups.sort_by_key(|(_, modified)| std::cmp::Reverse(*modified));

    let mut removed = Vec::new();
    for (path, _) in backups.into_iter().skip(max_backups) {
        match std::fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(err) => logger.warn(
                "バックアップの削除に失敗しました",
                Some(json!({ "path": path.display().to_string(), "error": err.to_string() })),
            ),
        }
    }

    if !removed.is_empty() {
        logger.info(
            "古いバックアップを削除しました",
            Some(json!({
                "removed": removed.len(),
                "max_backups": max_backups,
            })),
        );
    }
    Ok(removed)
}

/// 30日より古いレポートを削除する。latest エイリアスだけは件数や
/// 経過日数に関わらず残す。
pub fn prune_reports(dir: &Path, now: SystemTime, logger: &Logger) -> Result<Vec<PathBuf>> {
    let reports = collect_files(dir, |name| {
        name != LATEST_REPORT_NAME && name.starts_with("report-")
    });

    let mut removed = Vec::new();
    for (path, modified) in reports {
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= REPORT_MAX_AGE {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(err) => logger.warn(
                "レポートの削除に失敗しました",
                Some(json!({ "path": path.display().to_string(), "error": err.to_string() })),
            ),
        }
    }

    if !removed.is_empty() {
        logger.info(
            "期限切れのレポートを削除しました",
            Some(json!({ "removed": removed.len() })),
        );
    }
    Ok(removed)
}

fn collect_files(dir: &Path, matches: impl Fn(&str) -> bool) -> Vec<(PathBuf, SystemTime)> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !matches(name) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let modified = metadata
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((entry.into_path(), modified));
    }
    files
}
