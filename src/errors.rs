//! Error types for the instrumentation pipeline.
//!
//! Every variant is scoped to one source file except the invocation-level
//! ones (`Config`, `RuntimeHelperMissing`, `Compiler`). The multi-file driver
//! isolates per-file errors; `CacheRead` never leaves the cache check.

use crate::core::{CodePosition, CodeSection, EvaluationType, MarkerId};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstrumentError {
    /// Source file could not be read
    #[error("cannot read source file {path}: {source}")]
    InputIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The syntax provider rejected the source
    #[error("parse error in {path}:{line}:{column}: {message}")]
    Parse {
        path: PathBuf,
        line: u32,
        column: u32,
        message: String,
    },

    /// A statement position was registered twice as a checkpoint
    #[error("duplicate checkpoint at {position} (already marker {existing})")]
    DuplicateCheckpoint {
        position: CodePosition,
        existing: MarkerId,
    },

    /// The same section was registered twice with the same evaluation type
    #[error("duplicate {eval_type} evaluation at {section} (already marker {existing})")]
    DuplicateEvaluation {
        section: CodeSection,
        eval_type: EvaluationType,
        existing: MarkerId,
    },

    /// Two marker sections cross, or a section does not fit the source text
    #[error("marker {marker} cannot be applied: {reason}")]
    OverlappingMarker { marker: MarkerId, reason: String },

    /// The CID file is missing, unreadable, or inconsistent
    #[error("cannot use CID file {path}: {reason}")]
    CacheRead { path: PathBuf, reason: String },

    /// Instrumented output or CID could not be written
    #[error("cannot write {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be loaded
    #[error("configuration error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("runtime helper not found at {0}")]
    RuntimeHelperMissing(PathBuf),

    /// The native compiler failed or could not be started
    #[error("compiler `{program}` failed: {message}")]
    Compiler { program: String, message: String },
}

impl InstrumentError {
    pub fn input_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::InputIo {
            path: path.into(),
            source,
        }
    }

    pub fn output_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OutputWrite {
            path: path.into(),
            source,
        }
    }

    pub fn cache_read(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CacheRead {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn overlapping(marker: MarkerId, reason: impl Into<String>) -> Self {
        Self::OverlappingMarker {
            marker,
            reason: reason.into(),
        }
    }

    /// Invariant violations point at a bug in the finder or decomposer.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::DuplicateCheckpoint { .. }
                | Self::DuplicateEvaluation { .. }
                | Self::OverlappingMarker { .. }
        )
    }

    /// Short label shown in the per-file failure line.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InputIo { .. } => "input",
            Self::Parse { .. } => "parse",
            Self::DuplicateCheckpoint { .. } | Self::DuplicateEvaluation { .. } => "duplicate-marker",
            Self::OverlappingMarker { .. } => "overlapping-marker",
            Self::CacheRead { .. } => "cache",
            Self::OutputWrite { .. } => "output",
            Self::Config { .. } => "config",
            Self::RuntimeHelperMissing(_) => "runtime-helper",
            Self::Compiler { .. } => "compiler",
        }
    }
}

pub type Result<T> = std::result::Result<T, InstrumentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_message_includes_location() {
        let err = InstrumentError::Parse {
            path: PathBuf::from("src/main.c"),
            line: 12,
            column: 4,
            message: "unexpected token".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "parse error in src/main.c:12:4: unexpected token"
        );
    }

    #[test]
    fn test_marker_violations_are_internal() {
        let overlap = InstrumentError::overlapping(MarkerId(3), "crosses marker 2");
        let duplicate = InstrumentError::DuplicateCheckpoint {
            position: CodePosition::new(1, 1),
            existing: MarkerId(1),
        };
        let cache = InstrumentError::cache_read("a.cid", "hash mismatch");

        assert!(overlap.is_internal());
        assert!(duplicate.is_internal());
        assert!(!cache.is_internal());
        assert_eq!(overlap.category(), "overlapping-marker");
    }
}
