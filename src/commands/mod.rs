//! CLI command implementations.
//!
//! - **instrument**: instrument sources, then optionally compile them
//! - **strip**: restore the original text of an instrumented file
//! - **init**: write a default `.coveron.toml`

pub mod compile;
pub mod init;
pub mod instrument;
pub mod strip;

pub use compile::{run_compiler, CompileJob};
pub use init::{init_config, init_config_in};
pub use instrument::{handle_instrument, instrument_all, plan_files, FileReport, RunSummary};
pub use strip::{handle_strip, strip_file, StripConfig};
