use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Strict,
    Fix,
}

impl Mode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Mode::Strict => "strict",
            Mode::Fix => "fix",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Mode::Strict),
            "fix" => Ok(Mode::Fix),
            _ => Err(format!(
                "モードが不正です: {s}（strict|fix を指定してください）"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub run: RunConfig,
    pub rules: RuleConfig,
    pub paths: PathsConfig,
    pub log: LogConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub mode: Mode,
    pub force: bool,
    pub backup: bool,
    pub max_backups: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub top: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleConfig {
    pub min_capacity: i64,
    pub max_capacity: i64,
    pub default_count: i64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathsConfig {
    pub data_file: PathBuf,
    pub backups_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub queue_file: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub verbose: bool,
}

impl EffectiveConfig {
    pub fn force_fix(&self) -> bool {
        self.run.mode == Mode::Fix || self.run.force
    }
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            run: RunConfig {
                mode: Mode::Strict,
                force: false,
                backup: true,
                max_backups: 5,
                batch_size: 10,
                timeout_secs: 30,
                top: 5,
            },
            rules: RuleConfig {
                min_capacity: 0,
                max_capacity: 1000,
                default_count: 0,
                warning_threshold: 75.0,
                critical_threshold: 90.0,
            },
            paths: PathsConfig {
                data_file: PathBuf::from("data/parking-data.json"),
                backups_dir: PathBuf::from("data/backups"),
                reports_dir: PathBuf::from("data/reports"),
                logs_dir: PathBuf::from("data/logs"),
                queue_file: PathBuf::from("data/pending-updates.json"),
            },
            log: LogConfig {
                level: LogLevel::Info,
                verbose: false,
            },
            config_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    run: Option<RawRunConfig>,
    rules: Option<RawRuleConfig>,
    paths: Option<RawPathsConfig>,
    log: Option<RawLogConfig>,
}

#[derive(Debug, Deserialize)]
struct RawRunConfig {
    mode: Option<Mode>,
    force: Option<bool>,
    backup: Option<bool>,
    max_backups: Option<usize>,
    batch_size: Option<usize>,
    timeout_secs: Option<u64>,
    top: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawRuleConfig {
    min_capacity: Option<i64>,
    max_capacity: Option<i64>,
    default_count: Option<i64>,
    warning_threshold: Option<f64>,
    critical_threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPathsConfig {
    data_file: Option<PathBuf>,
    backups_dir: Option<PathBuf>,
    reports_dir: Option<PathBuf>,
    logs_dir: Option<PathBuf>,
    queue_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawLogConfig {
    level: Option<LogLevel>,
    verbose: Option<bool>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/parkir/config.toml")
}

pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = config_path
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| default_config_path(home_dir));

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("設定ファイルの読み取りに失敗しました: {}", path.display()))?;
        let raw: RawConfig =
            toml::from_str(&s).context("設定ファイル(TOML)の解析に失敗しました")?;
        apply_raw_config(&mut cfg, raw);
        cfg.config_path = Some(path.display().to_string());
    }

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(run) = raw.run {
        if let Some(mode) = run.mode {
            cfg.run.mode = mode;
        }
        if let Some(force) = run.force {
            cfg.run.force = force;
        }
        if let Some(backup) = run.backup {
            cfg.run.backup = backup;
        }
        if let Some(max_backups) = run.max_backups {
            cfg.run.max_backups = max_backups;
        }
        if let Some(batch_size) = run.batch_size {
            cfg.run.batch_size = batch_size.max(1);
        }
        if let Some(timeout_secs) = run.timeout_secs {
            cfg.run.timeout_secs = timeout_secs;
        }
        if let Some(top) = run.top {
            cfg.run.top = top;
        }
    }

    if let Some(rules) = raw.rules {
        if let Some(min_capacity) = rules.min_capacity {
            cfg.rules.min_capacity = min_capacity;
        }
        if let Some(max_capacity) = rules.max_capacity {
            cfg.rules.max_capacity = max_capacity;
        }
        if let Some(default_count) = rules.default_count {
            cfg.rules.default_count = default_count;
        }
        if let Some(warning_threshold) = rules.warning_threshold {
            cfg.rules.warning_threshold = warning_threshold;
        }
        if let Some(critical_threshold) = rules.critical_threshold {
            cfg.rules.critical_threshold = critical_threshold;
        }
    }

    if let Some(paths) = raw.paths {
        if let Some(data_file) = paths.data_file {
            cfg.paths.data_file = data_file;
        }
        if let Some(backups_dir) = paths.backups_dir {
            cfg.paths.backups_dir = backups_dir;
        }
        if let Some(reports_dir) = paths.reports_dir {
            cfg.paths.reports_dir = reports_dir;
        }
        if let Some(logs_dir) = paths.logs_dir {
            cfg.paths.logs_dir = logs_dir;
        }
        if let Some(queue_file) = paths.queue_file {
            cfg.paths.queue_file = queue_file;
        }
    }

    if let Some(log) = raw.log {
        if let Some(level) = log.level {
            cfg.log.level = level;
        }
        if let Some(verbose) = log.verbose {
            cfg.log.verbose = verbose;
        }
    }
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Ok(v) = std::env::var("PARKIR_MODE") {
        cfg.run.mode = v
            .parse::<Mode>()
            .map_err(anyhow::Error::msg)
            .with_context(|| "PARKIR_MODE")?;
    }
    if let Ok(v) = std::env::var("PARKIR_FORCE") {
        cfg.run.force = parse_bool(&v).with_context(|| "PARKIR_FORCE")?;
    }
    if let Ok(v) = std::env::var("PARKIR_BACKUP") {
        cfg.run.backup = parse_bool(&v).with_context(|| "PARKIR_BACKUP")?;
    }
    if let Ok(v) = std::env::var("PARKIR_MAX_BACKUPS") {
        cfg.run.max_backups = v
            .trim()
            .parse::<usize>()
            .with_context(|| "PARKIR_MAX_BACKUPS")?;
    }
    if let Ok(v) = std::env::var("PARKIR_TIMEOUT") {
        cfg.run.timeout_secs = v.trim().parse::<u64>().with_context(|| "PARKIR_TIMEOUT")?;
    }
    if let Ok(v) = std::env::var("PARKIR_THRESHOLD") {
        cfg.rules.warning_threshold = v
            .trim()
            .parse::<f64>()
            .with_context(|| "PARKIR_THRESHOLD")?;
    }
    if let Ok(v) = std::env::var("PARKIR_DATA_FILE") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.paths.data_file = PathBuf::from(v);
        }
    }
    if let Ok(v) = std::env::var("PARKIR_LOG_LEVEL") {
        cfg.log.level = v
            .parse::<LogLevel>()
            .map_err(anyhow::Error::msg)
            .with_context(|| "PARKIR_LOG_LEVEL")?;
    }
    if let Ok(v) = std::env::var("PARKIR_VERBOSE") {
        cfg.log.verbose = parse_bool(&v).with_context(|| "PARKIR_VERBOSE")?;
    }

    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "真偽値が不正です: {s}（true|false|1|0|yes|no|on|off を指定してください）"
        )),
    }
}
