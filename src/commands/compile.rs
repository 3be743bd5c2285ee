//! Runs the native compiler on the instrumented outputs.

use crate::config::SourceFile;
use crate::errors::{InstrumentError, Result};
use crate::observability::{set_phase, InstrumentPhase};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

/// Compiler invocation assembled from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileJob {
    pub program: String,
    /// Directories of the original inputs, searched for quoted includes.
    pub include_dirs: Vec<PathBuf>,
    pub args: Vec<String>,
    pub sources: Vec<PathBuf>,
    pub runtime_source: PathBuf,
}

impl CompileJob {
    /// Compile the outputs of `files` together with the runtime helper.
    pub fn for_files(
        program: &str,
        args: &[String],
        files: &[SourceFile],
        runtime_source: &Path,
    ) -> Self {
        Self {
            program: program.to_string(),
            include_dirs: input_dirs(files),
            args: args.to_vec(),
            sources: files.iter().map(|file| file.output.clone()).collect(),
            runtime_source: runtime_source.to_path_buf(),
        }
    }

    /// `program [-iquote <dir>...] <args...> <instrumented sources...> <runtime source>`
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        for dir in &self.include_dirs {
            command.arg("-iquote").arg(dir);
        }
        command
            .args(&self.args)
            .args(&self.sources)
            .arg(&self.runtime_source);
        command
    }
}

/// Distinct parent directories of the inputs in first-seen order. The
/// instrumented copies live in the output directory, so `#include "x.h"`
/// must still find headers beside the original file.
pub fn input_dirs(files: &[SourceFile]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for file in files {
        let dir = match file.input.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

fn require_runtime_source(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(InstrumentError::RuntimeHelperMissing(path.to_path_buf()))
    }
}

pub fn run_compiler(job: &CompileJob) -> Result<()> {
    let _phase = set_phase(InstrumentPhase::Compiling);
    require_runtime_source(&job.runtime_source)?;

    info!(program = %job.program, sources = job.sources.len(), "invoking compiler");
    let status = job
        .command()
        .status()
        .map_err(|e| InstrumentError::Compiler {
            program: job.program.clone(),
            message: e.to_string(),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(InstrumentError::Compiler {
            program: job.program.clone(),
            message: format!("exited with {status}"),
        })
    }
}
