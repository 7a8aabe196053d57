use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug)]
pub enum PipelineError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Schema {
        detail: String,
    },
    Timeout {
        budget: Duration,
        elapsed: Duration,
    },
}

impl PipelineError {
    pub const fn kind(&self) -> &'static str {
        match self {
            PipelineError::Io { .. } => "io_error",
            PipelineError::Parse { .. } => "parse_error",
            PipelineError::Schema { .. } => "schema_error",
            PipelineError::Timeout { .. } => "timeout_error",
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Io { path, source } => write!(
                f,
                "データファイルを読み取れません: {}（{source}）",
                path.display()
            ),
            PipelineError::Parse { path, source } => write!(
                f,
                "データファイル(JSON)の解析に失敗しました: {}（{source}）",
                path.display()
            ),
            PipelineError::Schema { detail } => {
                write!(f, "データ構造が不正です: {detail}")
            }
            PipelineError::Timeout { budget, elapsed } => write!(
                f,
                "処理がタイムアウトしました（上限{budget:?} 経過{elapsed:?}）。変更は破棄されました"
            ),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Io { source, .. } => Some(source),
            PipelineError::Parse { source, .. } => Some(source),
            PipelineError::Schema { .. } | PipelineError::Timeout { .. } => None,
        }
    }
}
