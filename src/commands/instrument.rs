//! Multi-file driver for `coveron instrument`.
//!
//! Each file runs through its own pipeline pass; a failure is reported for
//! that file and the others carry on. The compiler runs only when every
//! file succeeded.

use super::compile::{run_compiler, CompileJob};
use crate::cli::InstrumentArgs;
use crate::config::{load_config, InstrumenterConfig, SourceFile};
use crate::errors::InstrumentError;
use crate::io::ensure_dir;
use crate::observability::{increment_processed, set_progress};
use crate::pipeline::{instrument_file, FileOutcome};
use crate::syntax::{SyntaxProvider, TreeSitterProvider};
use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::warn;

/// Worker stack size (8MB for deeply nested syntax trees)
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

const TEMPLATE_FILES: &str = "{spinner} {msg} {pos}/{len} files ({percent}%) - {eta}";

#[derive(Debug)]
pub struct FileReport {
    pub file: SourceFile,
    pub result: std::result::Result<FileOutcome, InstrumentError>,
}

impl FileReport {
    /// One colored result line.
    pub fn line(&self) -> String {
        let input = self.file.input.display();
        match &self.result {
            Ok(FileOutcome::Instrumented {
                markers, decisions, ..
            }) => format!(
                "{} {input} ({markers} markers, {decisions} decisions)",
                "instrumented".green()
            ),
            Ok(FileOutcome::Reused) => format!("{} {input}", "up to date".cyan()),
            Err(e) if e.is_internal() => format!(
                "{} {input} [{}]: {e} (internal error, please report it)",
                "failed".red().bold(),
                e.category()
            ),
            Err(e) => format!("{} {input} [{}]: {e}", "failed".red(), e.category()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub instrumented: usize,
    pub reused: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_reports(reports: &[FileReport]) -> Self {
        reports
            .iter()
            .fold(Self::default(), |mut summary, report| {
                match report.result {
                    Ok(FileOutcome::Instrumented { .. }) => summary.instrumented += 1,
                    Ok(FileOutcome::Reused) => summary.reused += 1,
                    Err(_) => summary.failed += 1,
                }
                summary
            })
    }

    pub fn total(&self) -> usize {
        self.instrumented + self.reused + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} instrumented, {} up to date, {} failed",
            self.instrumented, self.reused, self.failed
        )
    }
}

/// One entry per distinct output, in first-seen order.
pub fn plan_files(sources: &[PathBuf], config: &InstrumenterConfig) -> Vec<SourceFile> {
    let mut seen = HashSet::new();
    sources
        .iter()
        .map(|source| config.source_file(source))
        .filter(|file| seen.insert(file.output.clone()))
        .collect()
}

fn create_progress_bar(len: usize, verbosity: u8) -> ProgressBar {
    if verbosity > 0 || len < 2 || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(TEMPLATE_FILES) {
        pb.set_style(style);
    }
    pb.set_message("Instrumenting");
    pb
}

fn run_one(
    file: &SourceFile,
    provider: &dyn SyntaxProvider,
    config: &InstrumenterConfig,
    progress: &ProgressBar,
) -> FileReport {
    let report = FileReport {
        file: file.clone(),
        result: instrument_file(file, provider, config),
    };
    increment_processed();
    progress.inc(1);
    let line = report.line();
    progress.suspend(|| println!("{line}"));
    report
}

/// Instrument every file, in parallel unless disabled. Reports keep the
/// order of `files`.
pub fn instrument_all(
    files: &[SourceFile],
    provider: &dyn SyntaxProvider,
    config: &InstrumenterConfig,
    progress: &ProgressBar,
) -> Vec<FileReport> {
    set_progress(0, files.len());
    let sequential = || -> Vec<FileReport> {
        files
            .iter()
            .map(|file| run_one(file, provider, config, progress))
            .collect()
    };
    if !config.parallel || files.len() < 2 {
        return sequential();
    }

    match rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .stack_size(WORKER_STACK_SIZE)
        .build()
    {
        Ok(pool) => pool.install(|| {
            files
                .par_iter()
                .map(|file| run_one(file, provider, config, progress))
                .collect()
        }),
        Err(e) => {
            warn!(error = %e, "cannot build thread pool, instrumenting sequentially");
            sequential()
        }
    }
}

pub fn handle_instrument(args: InstrumentArgs) -> Result<RunSummary> {
    let file_config = load_config(args.config.as_deref())?;
    let sources = args.sources.clone();
    let config = args.into_config(file_config);

    ensure_dir(&config.output_dir)?;
    let files = plan_files(&sources, &config);
    let progress = create_progress_bar(files.len(), config.verbosity);
    let reports = instrument_all(&files, &TreeSitterProvider::new(), &config, &progress);
    progress.finish_and_clear();

    let summary = RunSummary::from_reports(&reports);
    println!("{summary}");
    if summary.has_failures() {
        anyhow::bail!("{} of {} files failed", summary.failed, summary.total());
    }

    if let Some(program) = &config.compiler {
        let job = CompileJob::for_files(
            program,
            &config.compiler_args,
            &files,
            &config.runtime_source,
        );
        run_compiler(&job).context("Compilation of instrumented sources failed")?;
    }
    Ok(summary)
}
