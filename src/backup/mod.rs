use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::OffsetDateTime;
use time::macros::format_description;

pub const BACKUP_PREFIX: &str = "parking-data-";

/// 変更前の生バイト列をそのままスナップショットとして残す。
/// ファイル名のタイムスタンプは文字列ソートで時系列になる形式。
pub fn write_backup(dir: &Path, raw_bytes: &[u8], now: OffsetDateTime) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| {
        format!(
            "バックアップディレクトリの作成に失敗しました: {}",
            dir.display()
        )
    })?;

    let fmt = format_description!("[year][month][day]-[hour][minute][second]");
    let stamp = now.format(&fmt).unwrap_or_else(|_| "unknown".to_string());
    let path = dir.join(format!("{BACKUP_PREFIX}{stamp}.json"));

    std::fs::write(&path, raw_bytes)
        .with_context(|| format!("バックアップの書き込みに失敗しました: {}", path.display()))?;
    Ok(path)
}
