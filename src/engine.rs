use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::aggregate;
use crate::backup;
use crate::config::EffectiveConfig;
use crate::core::{Dataset, Environment, PipelineError, Report};
use crate::loader;
use crate::logs::Logger;
use crate::pending::{self, QueueOutcome};
use crate::platform;
use crate::process::{ProcessorOptions, RecordProcessor};
use crate::reporting::{self, ReportContext, WrittenReports};
use crate::retention;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub dry_run: bool,
    pub show_progress: bool,
}

pub struct Engine {
    cfg: EffectiveConfig,
    logger: Logger,
    opts: EngineOptions,
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: Report,
    pub backup_path: Option<PathBuf>,
    pub written: Option<WrittenReports>,
}

impl Engine {
    pub fn new(cfg: EffectiveConfig, logger: Logger, opts: EngineOptions) -> Self {
        Self { cfg, logger, opts }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// 検証パイプライン本体。ドライランではバックアップ・データセット更新・
    /// レポートファイル・保持期限の削除をすべて省き、レポートの組み立てだけ行う。
    pub fn validate(&self) -> Result<RunOutput> {
        let now = OffsetDateTime::now_utc();
        self.logger.info(
            "検証を開始します",
            Some(json!({
                "data_file": self.cfg.paths.data_file.display().to_string(),
                "mode": self.cfg.run.mode.as_str(),
                "dry_run": self.opts.dry_run,
            })),
        );

        let loaded = match loader::load(&self.cfg.paths.data_file) {
            Ok(loaded) => loaded,
            Err(err) => {
                self.log_failure(&err);
                return Err(err);
            }
        };
        let mut dataset = loaded.dataset;

        let backup_path = if self.opts.dry_run || !self.cfg.run.backup {
            None
        } else {
            let path =
                match backup::write_backup(&self.cfg.paths.backups_dir, &loaded.raw_bytes, now) {
                    Ok(path) => path,
                    Err(err) => {
                        self.log_failure(&err);
                        return Err(err);
                    }
                };
            self.logger.info(
                "バックアップを作成しました",
                Some(json!({ "path": path.display().to_string() })),
            );
            Some(path)
        };

        use std::io::IsTerminal;
        let progress_enabled = self.opts.show_progress && std::io::stderr().is_terminal();
        let pb = if progress_enabled {
            let pb = indicatif::ProgressBar::new_spinner();
            pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            pb.set_message("ロケーションを検証中...");
            pb.enable_steady_tick(Duration::from_millis(120));
            Some(pb)
        } else {
            None
        };

        let processor = RecordProcessor::new(self.processor_options(), &self.logger);
        let outcome = processor.process(&mut dataset, loaded.structural_warnings, now);

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                self.log_failure(&err);
                return Err(err);
            }
        };

        let statistics = aggregate::aggregate(&mut dataset, &outcome, self.cfg.run.mode, now);

        let report = reporting::build_report(
            &dataset,
            &statistics,
            &outcome,
            ReportContext {
                mode: self.cfg.run.mode.as_str().to_string(),
                dry_run: self.opts.dry_run,
                top: self.cfg.run.top,
                environment: self.environment(),
                generated_at: now
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| "unknown".to_string()),
            },
        );

        let written = if self.opts.dry_run {
            None
        } else {
            match self.persist(&dataset, &report, now) {
                Ok(written) => Some(written),
                Err(err) => {
                    self.log_failure(&err);
                    return Err(err);
                }
            }
        };

        Ok(RunOutput {
            report,
            backup_path,
            written,
        })
    }

    /// 保留中の更新キューを検証する。データセットは照合にだけ使い、更新しない。
    /// ドライランでは件数の報告にとどめ、ファイルへの変更は行わない。
    pub fn queue(&self) -> Result<QueueOutcome> {
        let now = OffsetDateTime::now_utc();
        let loaded = match loader::load(&self.cfg.paths.data_file) {
            Ok(loaded) => loaded,
            Err(err) => {
                self.log_failure(&err);
                return Err(err);
            }
        };

        match pending::process_queue(
            &self.cfg.paths.queue_file,
            &loaded.dataset,
            self.opts.dry_run,
            now,
            &self.logger,
        ) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.log_failure(&err);
                Err(err)
            }
        }
    }

    fn persist(
        &self,
        dataset: &Dataset,
        report: &Report,
        now: OffsetDateTime,
    ) -> Result<WrittenReports> {
        let written = reporting::write_reports(&self.cfg.paths.reports_dir, report, now)?;
        loader::save(&self.cfg.paths.data_file, dataset)?;
        retention::prune_backups(
            &self.cfg.paths.backups_dir,
            self.cfg.run.max_backups,
            &self.logger,
        )?;
        retention::prune_reports(
            &self.cfg.paths.reports_dir,
            std::time::SystemTime::now(),
            &self.logger,
        )?;
        Ok(written)
    }

    fn processor_options(&self) -> ProcessorOptions {
        ProcessorOptions {
            force_fix: self.cfg.force_fix(),
            min_capacity: self.cfg.rules.min_capacity,
            max_capacity: self.cfg.rules.max_capacity,
            default_count: self.cfg.rules.default_count,
            warning_threshold: self.cfg.rules.warning_threshold,
            critical_threshold: self.cfg.rules.critical_threshold,
            batch_size: self.cfg.run.batch_size,
            budget: Duration::from_secs(self.cfg.run.timeout_secs),
        }
    }

    fn environment(&self) -> Environment {
        let git = platform::git_metadata(std::cmp::min(
            Duration::from_secs(self.cfg.run.timeout_secs),
            Duration::from_secs(2),
        ));
        Environment {
            data_path: self.cfg.paths.data_file.display().to_string(),
            hostname: platform::hostname(),
            git_commit: git.commit,
            git_branch: git.branch,
        }
    }

    fn log_failure(&self, err: &anyhow::Error) {
        let kind = err
            .downcast_ref::<PipelineError>()
            .map(PipelineError::kind)
            .unwrap_or("other");
        self.logger.error(
            "実行を中断しました",
            Some(json!({ "kind": kind, "error": err.to_string() })),
        );
    }
}
