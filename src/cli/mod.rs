use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde_json::json;

use crate::engine::{Engine, EngineOptions};
use crate::logs::Logger;
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "parkir",
    version,
    about = "駐車場データセット(JSON)を検証・補正し、統計・レポート・バックアップを管理する"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Validate(ValidateArgs),
    Queue(QueueArgs),
    Config(ConfigArgs),
    Completion(CompletionArgs),
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[arg(long)]
    pub mode: Option<String>,
    #[arg(long)]
    pub force: bool,
    #[arg(long = "no-backup")]
    pub no_backup: bool,
    #[arg(long)]
    pub max_backups: Option<usize>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub threshold: Option<f64>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub data: Option<PathBuf>,
    #[arg(long)]
    pub top: Option<usize>,
}

#[derive(Debug, Args)]
pub struct QueueArgs {
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let stderr_is_tty = std::io::stderr().is_terminal();

    let home_dir = crate::platform::effective_home_dir()?;
    let env_config_path = std::env::var_os("PARKIR_CONFIG").map(PathBuf::from);
    let mut cfg = crate::config::load(
        cli.config.as_deref().or(env_config_path.as_deref()),
        &home_dir,
    )
    .map_err(crate::exit::invalid_args_err)?;

    if let Some(timeout) = cli.timeout {
        cfg.run.timeout_secs = timeout;
    }
    if cli.verbose {
        cfg.log.verbose = true;
    }

    let ui_cfg = UiConfig {
        quiet: cli.quiet,
        verbose: cli.verbose,
    };
    let show_progress = stderr_is_tty && !cli.quiet && !cli.json;

    match cli.command {
        Commands::Validate(args) => {
            if let Some(mode) = &args.mode {
                cfg.run.mode = mode.parse().map_err(crate::exit::invalid_args)?;
            }
            if args.force {
                cfg.run.force = true;
            }
            if args.no_backup {
                cfg.run.backup = false;
            }
            if let Some(max_backups) = args.max_backups {
                cfg.run.max_backups = max_backups;
            }
            if let Some(batch_size) = args.batch_size {
                cfg.run.batch_size = batch_size.max(1);
            }
            if let Some(threshold) = args.threshold {
                cfg.rules.warning_threshold = threshold;
            }
            if let Some(level) = &args.log_level {
                cfg.log.level = level.parse().map_err(crate::exit::invalid_args)?;
            }
            if let Some(data) = args.data {
                cfg.paths.data_file = data;
            }
            if let Some(top) = args.top {
                cfg.run.top = top;
            }

            let logger = Logger::new(&cfg.paths.logs_dir, cfg.log.level, cfg.log.verbose);
            let engine = Engine::new(
                cfg,
                logger,
                EngineOptions {
                    dry_run: cli.dry_run,
                    show_progress,
                },
            );
            let output = engine.validate()?;
            if cli.json {
                write_json(&output.report)?;
            } else {
                crate::ui::print_run(&output, &ui_cfg);
            }
        }
        Commands::Queue(args) => {
            if let Some(file) = args.file {
                cfg.paths.queue_file = file;
            }

            let logger = Logger::new(&cfg.paths.logs_dir, cfg.log.level, cfg.log.verbose);
            let engine = Engine::new(
                cfg,
                logger,
                EngineOptions {
                    dry_run: cli.dry_run,
                    show_progress: false,
                },
            );
            let outcome = engine.queue()?;
            if cli.json {
                write_json(&json!({
                    "accepted": outcome.accepted,
                    "rejected": outcome.rejected,
                    "archivePath": outcome
                        .archive_path
                        .as_ref()
                        .map(|p| p.display().to_string()),
                }))?;
            } else {
                crate::ui::print_queue(&outcome, &ui_cfg);
            }
        }
        Commands::Config(args) => {
            if args.show {
                if cli.json {
                    write_json(&cfg)?;
                } else {
                    println!("{}", toml::to_string_pretty(&cfg)?);
                }
            } else if !ui_cfg.quiet {
                eprintln!("config: `parkir config --show` を使用してください");
            }
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = std::io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "parkir", &mut out);
        }
    }

    Ok(())
}

fn write_json<T: serde::Serialize>(value: &T) -> Result<()> {
    use std::io::Write;

    let buf = serde_json::to_vec_pretty(value)?;

    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::invalid_args(format!(
            "未対応のシェルです: {other}（bash|zsh|fish を指定してください）"
        ))),
    }
}
