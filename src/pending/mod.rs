use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::core::{Dataset, PipelineError, VehicleType, coerce_int};
use crate::logs::Logger;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedUpdate {
    pub location: String,
    pub vehicle_type: VehicleType,
    pub total: i64,
    pub available: i64,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct QueueOutcome {
    pub accepted: usize,
    pub rejected: usize,
    pub archive_path: Option<PathBuf>,
}

/// 保留中の更新キューを検証する。データセットは照合用の読み取り専用
/// ルックアップとしてだけ使う。妥当な項目は正規化して同じファイルに
/// 書き戻し、不正な項目は理由付きで別ファイルに退避する。
/// ドライランでは書き戻しも退避もせず、件数の集計だけ行う。
pub fn process_queue(
    queue_path: &Path,
    dataset: &Dataset,
    dry_run: bool,
    now: OffsetDateTime,
    logger: &Logger,
) -> Result<QueueOutcome> {
    let raw = std::fs::read(queue_path).map_err(|source| PipelineError::Io {
        path: queue_path.to_path_buf(),
        source,
    })?;

    let root: Value = serde_json::from_slice(&raw).map_err(|source| PipelineError::Parse {
        path: queue_path.to_path_buf(),
        source,
    })?;

    let entries = root.as_array().ok_or_else(|| PipelineError::Schema {
        detail: "更新キューが配列ではありません".to_string(),
    })?;

    let known: BTreeSet<&str> = dataset.locations.iter().map(|l| l.name.as_str()).collect();

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for entry in entries {
        match validate_entry(entry, &known) {
            Ok(update) => accepted.push(update),
            Err(reason) => {
                logger.warn(
                    "更新キューの項目を却下しました",
                    Some(json!({ "reason": reason, "entry": entry })),
                );
                rejected.push(json!({ "reason": reason, "entry": entry }));
            }
        }
    }

    let archive_path = if dry_run || rejected.is_empty() {
        None
    } else {
        Some(archive_rejected(queue_path, &rejected, now)?)
    };

    if !dry_run {
        let buf = serde_json::to_vec_pretty(&accepted)
            .context("更新キュー(JSON)のシリアライズに失敗しました")?;
        std::fs::write(queue_path, buf).with_context(|| {
            format!(
                "更新キューの書き戻しに失敗しました: {}",
                queue_path.display()
            )
        })?;
    }

    logger.info(
        "更新キューを処理しました",
        Some(json!({
            "accepted": accepted.len(),
            "rejected": rejected.len(),
            "dry_run": dry_run,
        })),
    );

    Ok(QueueOutcome {
        accepted: accepted.len(),
        rejected: rejected.len(),
        archive_path,
    })
}

fn validate_entry(entry: &Value, known: &BTreeSet<&str>) -> Result<NormalizedUpdate, String> {
    let obj = entry
        .as_object()
        .ok_or_else(|| "項目がオブジェクトではありません".to_string())?;

    let location = obj
        .get("location")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "location がありません".to_string())?;
    if !known.contains(location) {
        return Err(format!("未知のロケーションです: {location}"));
    }

    let vehicle_type = obj
        .get("vehicleType")
        .and_then(Value::as_str)
        .ok_or_else(|| "vehicleType がありません".to_string())?
        .parse::<VehicleType>()?;

    let total = non_negative_int(obj, "total")?;
    let available = non_negative_int(obj, "available")?;

    let timestamp = obj
        .get("timestamp")
        .and_then(Value::as_str)
        .ok_or_else(|| "timestamp がありません".to_string())?;
    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| format!("timestamp を解釈できません: {timestamp}"))?
        .format(&Rfc3339)
        .map_err(|_| "timestamp を正規化できません".to_string())?;

    Ok(NormalizedUpdate {
        location: location.to_string(),
        vehicle_type,
        total,
        available,
        timestamp,
    })
}

fn non_negative_int(
    obj: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<i64, String> {
    let value = obj
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| format!("{field} がありません"))?;
    // 空文字列は coerce_int が既定値に解釈するため、先に数値以外として弾く。
    if matches!(value, Value::String(s) if s.trim().is_empty()) {
        return Err(format!("{field} が数値ではありません: {value}"));
    }
    let parsed = coerce_int(value, -1);
    if parsed.warned {
        return Err(format!("{field} が数値ではありません: {value}"));
    }
    if parsed.value < 0 {
        return Err(format!("{field} が負の値です: {}", parsed.value));
    }
    Ok(parsed.value)
}

fn archive_rejected(queue_path: &Path, rejected: &[Value], now: OffsetDateTime) -> Result<PathBuf> {
    let fmt = format_description!("[year][month][day]-[hour][minute][second]");
    let stamp = now.format(&fmt).unwrap_or_else(|_| "unknown".to_string());
    let dir = queue_path.parent().unwrap_or_else(|| Path::new("."));
    let path = dir.join(format!("invalid-{stamp}.json"));

    let buf = serde_json::to_vec_pretty(rejected)
        .context("却下項目(JSON)のシリアライズに失敗しました")?;
    std::fs::write(&path, buf)
        .with_context(|| format!("却下項目の書き込みに失敗しました: {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LogLevel;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn make_temp_dir() -> PathBuf {
        static DIR_SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = DIR_SEQ.fetch_add(1, Ordering::Relaxed);
        let dir =
            std::env::temp_dir().join(format!("parkir-queue-test-{}-{seq}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create dir");
        dir
    }

    fn lookup_dataset() -> Dataset {
        serde_json::from_value(json!({
            "locations": [
                { "name": "Lokasi A" },
                { "name": "Lokasi B" }
            ],
            "statistics": {}
        }))
        .expect("build dataset")
    }

    #[test]
    fn valid_entries_are_normalized_and_rewritten_in_place() {
        let dir = make_temp_dir();
        let queue = dir.join("pending-updates.json");
        std::fs::write(
            &queue,
            serde_json::to_vec_pretty(&json!([
                {
                    "location": "Lokasi A",
                    "vehicleType": "bus",
                    "total": "12.4",
                    "available": 3,
                    "timestamp": "2026-08-30T10:15:30Z"
                }
            ]))
            .expect("serialize"),
        )
        .expect("write queue");

        let logger = Logger::new(&dir, LogLevel::Error, false);
        let outcome = process_queue(
            &queue,
            &lookup_dataset(),
            false,
            OffsetDateTime::UNIX_EPOCH,
            &logger,
        )
        .expect("process queue");

        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.rejected, 0);
        assert!(outcome.archive_path.is_none());

        let rewritten: Value =
            serde_json::from_slice(&std::fs::read(&queue).expect("read queue")).expect("parse");
        let entry = &rewritten.as_array().expect("array")[0];
        assert_eq!(entry.get("total").and_then(|n| n.as_i64()), Some(12));
        assert_eq!(
            entry.get("vehicleType").and_then(|s| s.as_str()),
            Some("bus")
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn invalid_entries_are_archived_with_reasons() {
        let dir = make_temp_dir();
        let queue = dir.join("pending-updates.json");
        std::fs::write(
            &queue,
            serde_json::to_vec_pretty(&json!([
                { "location": "Tidak Ada", "vehicleType": "bus", "total": 1,
                  "available": 1, "timestamp": "2026-08-30T10:15:30Z" },
                { "location": "Lokasi A", "vehicleType": "becak", "total": 1,
                  "available": 1, "timestamp": "2026-08-30T10:15:30Z" },
                { "location": "Lokasi A", "vehicleType": "bus", "total": -2,
                  "available": 1, "timestamp": "2026-08-30T10:15:30Z" },
                { "location": "Lokasi A", "vehicleType": "bus", "total": 1,
                  "available": "abc", "timestamp": "2026-08-30T10:15:30Z" },
                { "location": "Lokasi A", "vehicleType": "bus", "total": 1,
                  "available": 1, "timestamp": "kemarin" },
                { "location": "Lokasi B", "vehicleType": "motor", "total": 8,
                  "available": 2, "timestamp": "2026-08-30T11:00:00Z" }
            ]))
            .expect("serialize"),
        )
        .expect("write queue");

        let logger = Logger::new(&dir, LogLevel::Error, false);
        let outcome = process_queue(
            &queue,
            &lookup_dataset(),
            false,
            OffsetDateTime::UNIX_EPOCH,
            &logger,
        )
        .expect("process queue");

        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.rejected, 5);

        let archive = outcome.archive_path.expect("archive path");
        let archived: Value =
            serde_json::from_slice(&std::fs::read(&archive).expect("read archive"))
                .expect("parse archive");
        let entries = archived.as_array().expect("array");
        assert_eq!(entries.len(), 5);
        assert!(
            entries[0]
                .get("reason")
                .and_then(|r| r.as_str())
                .is_some_and(|r| r.contains("未知のロケーション"))
        );

        let rewritten: Value =
            serde_json::from_slice(&std::fs::read(&queue).expect("read queue")).expect("parse");
        assert_eq!(rewritten.as_array().expect("array").len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn dry_run_counts_without_rewriting_or_archiving() {
        let dir = make_temp_dir();
        let queue = dir.join("pending-updates.json");
        let original = serde_json::to_vec_pretty(&json!([
            { "location": "Lokasi A", "vehicleType": "bus", "total": 12,
              "available": 4, "timestamp": "2026-08-30T10:15:30Z" },
            { "location": "Tidak Ada", "vehicleType": "bus", "total": 1,
              "available": 1, "timestamp": "2026-08-30T10:15:30Z" }
        ]))
        .expect("serialize");
        std::fs::write(&queue, &original).expect("write queue");

        let logger = Logger::new(&dir, LogLevel::Error, false);
        let outcome = process_queue(
            &queue,
            &lookup_dataset(),
            true,
            OffsetDateTime::UNIX_EPOCH,
            &logger,
        )
        .expect("process queue");

        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.rejected, 1);
        assert!(outcome.archive_path.is_none());
        // キューはバイト単位で無傷、退避ファイルも作られない。
        assert_eq!(std::fs::read(&queue).expect("read queue"), original);
        assert!(!dir.join("invalid-19700101-000000.json").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_string_counts_are_rejected_as_non_numeric() {
        let value = json!({ "total": "" });
        let err = non_negative_int(value.as_object().expect("object"), "total")
            .expect_err("empty string");
        assert!(err.contains("数値ではありません"), "err={err}");
        assert!(!err.contains("-1"), "err={err}");

        let blank = json!({ "total": "   " });
        let err = non_negative_int(blank.as_object().expect("object"), "total")
            .expect_err("blank string");
        assert!(err.contains("数値ではありません"), "err={err}");
    }

    #[test]
    fn missing_queue_file_is_io_error() {
        let dir = make_temp_dir();
        let logger = Logger::new(&dir, LogLevel::Error, false);
        let err = process_queue(
            &dir.join("nope.json"),
            &lookup_dataset(),
            false,
            OffsetDateTime::UNIX_EPOCH,
            &logger,
        )
        .expect_err("missing file");
        assert_eq!(
            err.downcast_ref::<PipelineError>().map(PipelineError::kind),
            Some("io_error")
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn non_array_queue_is_schema_error() {
        let dir = make_temp_dir();
        let queue = dir.join("pending-updates.json");
        std::fs::write(&queue, b"{}").expect("write");
        let logger = Logger::new(&dir, LogLevel::Error, false);
        let err = process_queue(
            &queue,
            &lookup_dataset(),
            false,
            OffsetDateTime::UNIX_EPOCH,
            &logger,
        )
        .expect_err("non array");
        assert_eq!(
            err.downcast_ref::<PipelineError>().map(PipelineError::kind),
            Some("schema_error")
        );
        let _ = std::fs::remove_dir_all(&dir);
    }
}
