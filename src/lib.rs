// Export modules for library usage
pub mod analysis;
pub mod cid;
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod errors;
pub mod instrument;
pub mod io;
pub mod observability;
pub mod pipeline;
pub mod syntax;

// Re-export commonly used types
pub use crate::cid::{CidDocument, CidManager, ConditionNode, DecisionRecord};
pub use crate::config::{DecisionPolicy, InstrumenterConfig, ProbeNames, SourceFile};
pub use crate::core::{CodePosition, CodeSection, EvaluationType, Marker, MarkerId};
pub use crate::errors::{InstrumentError, Result};
pub use crate::instrument::{strip_probes, ProbeSet};
pub use crate::pipeline::{instrument_file, instrument_source, FileOutcome, Instrumentation};
pub use crate::syntax::{Dialect, SyntaxProvider, TreeSitterProvider};
