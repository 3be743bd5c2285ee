use crate::config::{CoveronFileConfig, DecisionPolicy, InstrumenterConfig};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "coveron")]
#[command(about = "Source-level coverage instrumentation for C and C++", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Insert coverage probes and write a CID file per source
    Instrument(InstrumentArgs),

    /// Remove coverage probes from an instrumented file
    Strip {
        /// Instrumented file
        file: PathBuf,

        /// Where to write the restored source (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Treat the file as C++ regardless of its extension
        #[arg(long)]
        cpp: bool,

        /// Configuration file with custom probe names
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write a default .coveron.toml in the current directory
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct InstrumentArgs {
    /// Source files to instrument
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,

    /// Arguments passed to the compiler; `-x` and `-std=` also select the dialect
    #[arg(last = true)]
    pub compiler_args: Vec<String>,

    /// Directory for instrumented sources and CID files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Reinstrument even when the cached output is current
    #[arg(short, long)]
    pub force: bool,

    /// Increase verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Configuration file (defaults to the nearest .coveron.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Which decision tree nodes get evaluation markers
    #[arg(long, value_enum)]
    pub decision_policy: Option<DecisionPolicy>,

    /// Header declaring the probe functions
    #[arg(long)]
    pub runtime_header: Option<PathBuf>,

    /// Compiler to invoke on the instrumented sources
    #[arg(long)]
    pub compiler: Option<String>,

    /// Runtime helper source compiled together with the outputs
    #[arg(long)]
    pub runtime_source: Option<PathBuf>,

    /// Write CID files gzip-compressed
    #[arg(long)]
    pub compress_cid: bool,

    /// Number of worker threads (0 = all cores)
    #[arg(short = 'j', long = "jobs")]
    pub jobs: Option<usize>,

    /// Instrument files one at a time
    #[arg(long = "no-parallel")]
    pub no_parallel: bool,
}

impl InstrumentArgs {
    /// Defaults, then the file configuration, then the command line.
    pub fn into_config(self, file: CoveronFileConfig) -> InstrumenterConfig {
        let mut config = InstrumenterConfig::default().merge_file(file);
        config.force = self.force;
        config.verbosity = self.verbosity;
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if !self.compiler_args.is_empty() {
            config.compiler_args = self.compiler_args;
        }
        if let Some(policy) = self.decision_policy {
            config.decision_policy = policy;
        }
        if let Some(header) = self.runtime_header {
            config.runtime_header = header;
        }
        if self.compiler.is_some() {
            config.compiler = self.compiler;
        }
        if let Some(source) = self.runtime_source {
            config.runtime_source = source;
        }
        if self.compress_cid {
            config.compress_cid = true;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if self.no_parallel {
            config.parallel = false;
        }
        config
    }
}
