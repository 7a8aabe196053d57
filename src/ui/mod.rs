use anyhow::Error;
use std::io::{self, Write};

use crate::engine::RunOutput;
use crate::pending::QueueOutcome;
use crate::reporting;

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub quiet: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "エラー:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "原因:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "次に:");
    let _ = writeln!(
        stderr,
        "  - 詳細を見るには `--verbose` を付けて再実行してください"
    );
    let _ = writeln!(
        stderr,
        "  - 利用可能なコマンド/オプションは `parkir --help` を参照してください"
    );
}

pub fn print_run(output: &RunOutput, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    let _ = out.write_all(reporting::render_text(&output.report).as_bytes());

    if let Some(path) = &output.backup_path {
        let _ = writeln!(out);
        let _ = writeln!(out, "バックアップ: {}", path.display());
    }
    if let Some(written) = &output.written {
        let _ = writeln!(out, "レポート: {}", written.dated_json.display());
        if cfg.verbose {
            let _ = writeln!(out, "レポート（最新）: {}", written.latest_json.display());
            let _ = writeln!(out, "レポート（テキスト）: {}", written.dated_text.display());
        }
    }
}

pub fn print_queue(outcome: &QueueOutcome, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    let _ = writeln!(
        out,
        "更新キュー: 受理={} 却下={}",
        outcome.accepted, outcome.rejected
    );
    if let Some(path) = &outcome.archive_path {
        let _ = writeln!(out, "却下項目の退避先: {}", path.display());
    }
}
