use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(format!(
                "ログレベルが不正です: {s}（error|warn|info|debug を指定してください）"
            )),
        }
    }
}

#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    timestamp: String,
    level: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct Logger {
    dir: PathBuf,
    level: LogLevel,
    verbose: bool,
}

impl Logger {
    pub fn new(dir: impl Into<PathBuf>, level: LogLevel, verbose: bool) -> Self {
        Self {
            dir: dir.into(),
            level,
            verbose,
        }
    }

    pub fn error(&self, message: &str, data: Option<Value>) {
        self.write(LogLevel::Error, message, data);
    }

    pub fn warn(&self, message: &str, data: Option<Value>) {
        self.write(LogLevel::Warn, message, data);
    }

    pub fn info(&self, message: &str, data: Option<Value>) {
        self.write(LogLevel::Info, message, data);
    }

    pub fn debug(&self, message: &str, data: Option<Value>) {
        self.write(LogLevel::Debug, message, data);
    }

    pub fn file_path(&self, now: OffsetDateTime) -> PathBuf {
        let fmt = format_description!("[year]-[month]-[day]");
        let day = now
            .format(&fmt)
            .unwrap_or_else(|_| "unknown".to_string());
        self.dir.join(format!("log-{day}.jsonl"))
    }

    fn write(&self, level: LogLevel, message: &str, data: Option<Value>) {
        if level > self.level {
            return;
        }

        let now = OffsetDateTime::now_utc();
        let entry = LogEntry {
            timestamp: now
                .format(&Rfc3339)
                .unwrap_or_else(|_| "unknown".to_string()),
            level: level.as_str(),
            message,
            data,
        };
        let Ok(line) = serde_json::to_string(&entry) else {
            return;
        };

        if self.verbose {
            eprintln!("{line}");
        }

        // ログ書き込みの失敗で処理本体を止めない。
        let _ = append_line(&self.dir, &self.file_path(now), &line);
    }
}

fn append_line(dir: &Path, path: &Path, line: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")
}
