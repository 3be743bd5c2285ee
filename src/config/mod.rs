//! Instrumenter configuration.
//!
//! [`InstrumenterConfig`] is built once per invocation from `.coveron.toml`
//! (see [`loader`]) and the command line, then shared read-only by every
//! per-file pipeline.

pub mod loader;

pub use loader::{
    directory_ancestors, find_config_file, load_config, parse_config, CoveronFileConfig,
    ProbeSection, CONFIG_FILE_NAME,
};

use crate::cid::calculate_hash;
use crate::syntax::Dialect;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_DIR: &str = ".coveron";
pub const DEFAULT_RUNTIME_HEADER: &str = "coveron_helper.h";
pub const DEFAULT_RUNTIME_SOURCE: &str = "coveron_helper.c";

/// Which nodes of a decision tree receive evaluation markers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionPolicy {
    /// Root decision and leaf conditions only
    #[default]
    Leaves,
    /// Also every intermediate `&&`/`||` node
    AllNodes,
}

/// Symbol names of the runtime probe functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeNames {
    pub checkpoint: String,
    pub evaluation: String,
}

impl Default for ProbeNames {
    fn default() -> Self {
        Self {
            checkpoint: "__coveron_checkpoint".to_string(),
            evaluation: "__coveron_evaluation".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumenterConfig {
    pub force: bool,
    pub verbosity: u8,
    pub output_dir: PathBuf,
    /// Compiler to invoke after instrumentation, if any.
    pub compiler: Option<String>,
    /// Passed to the compiler, and consulted for the parsing dialect.
    pub compiler_args: Vec<String>,
    pub parallel: bool,
    /// Worker threads; 0 lets rayon decide.
    pub jobs: usize,
    pub decision_policy: DecisionPolicy,
    pub probes: ProbeNames,
    pub runtime_header: PathBuf,
    pub runtime_source: PathBuf,
    /// Write CID files gzip-compressed.
    pub compress_cid: bool,
}

impl Default for InstrumenterConfig {
    fn default() -> Self {
        Self {
            force: false,
            verbosity: 0,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            compiler: None,
            compiler_args: Vec::new(),
            parallel: true,
            jobs: 0,
            decision_policy: DecisionPolicy::default(),
            probes: ProbeNames::default(),
            runtime_header: PathBuf::from(DEFAULT_RUNTIME_HEADER),
            runtime_source: PathBuf::from(DEFAULT_RUNTIME_SOURCE),
            compress_cid: false,
        }
    }
}

impl InstrumenterConfig {
    /// Apply the values set in a configuration file.
    pub fn merge_file(mut self, file: CoveronFileConfig) -> Self {
        if let Some(output_dir) = file.output_dir {
            self.output_dir = output_dir;
        }
        if file.compiler.is_some() {
            self.compiler = file.compiler;
        }
        if let Some(args) = file.compiler_args {
            self.compiler_args = args;
        }
        if let Some(parallel) = file.parallel {
            self.parallel = parallel;
        }
        if let Some(jobs) = file.jobs {
            self.jobs = jobs;
        }
        if let Some(policy) = file.decision_policy {
            self.decision_policy = policy;
        }
        if let Some(header) = file.runtime_header {
            self.runtime_header = header;
        }
        if let Some(source) = file.runtime_source {
            self.runtime_source = source;
        }
        if let Some(compress) = file.compress_cid {
            self.compress_cid = compress;
        }
        if let Some(probes) = file.probes {
            if let Some(checkpoint) = probes.checkpoint {
                self.probes.checkpoint = checkpoint;
            }
            if let Some(evaluation) = probes.evaluation {
                self.probes.evaluation = evaluation;
            }
        }
        self
    }

    /// Hash of every setting that changes the instrumented text of `input`.
    /// Stored in the CID so a cached output is only reused with the same
    /// settings.
    pub fn fingerprint(&self, input: &Path) -> String {
        let dialect = Dialect::from_flags(&self.compiler_args)
            .unwrap_or_else(|| Dialect::from_path(input));
        let settings = format!(
            "checkpoint={}\nevaluation={}\npolicy={:?}\nheader={}\ndialect={dialect:?}\n",
            self.probes.checkpoint,
            self.probes.evaluation,
            self.decision_policy,
            self.runtime_header.display(),
        );
        calculate_hash(settings.as_bytes())
    }

    pub fn source_file(&self, input: &Path) -> SourceFile {
        SourceFile::in_output_dir(input, &self.output_dir)
    }
}

/// Paths belonging to one compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFile {
    pub input: PathBuf,
    pub output: PathBuf,
    pub cid: PathBuf,
}

impl SourceFile {
    /// `dir/name.ext` maps to `<out>/name_<h>.ext` and `<out>/name_<h>.cid`,
    /// `<h>` being the first 8 hex digits of the hash of the absolute input
    /// path.
    pub fn in_output_dir(input: &Path, output_dir: &Path) -> Self {
        let absolute = std::path::absolute(input).unwrap_or_else(|_| input.to_path_buf());
        let path_hash = calculate_hash(absolute.to_string_lossy().as_bytes());
        let tag = &path_hash[..8];

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string());
        let output_name = match input.extension() {
            Some(ext) => format!("{stem}_{tag}.{}", ext.to_string_lossy()),
            None => format!("{stem}_{tag}"),
        };

        Self {
            input: input.to_path_buf(),
            output: output_dir.join(output_name),
            cid: output_dir.join(format!("{stem}_{tag}.cid")),
        }
    }
}
