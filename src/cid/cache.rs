//! Decides whether an existing instrumented output can be reused.

use super::document::CidDocument;
use crate::config::SourceFile;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheMiss {
    Forced,
    OutputMissing,
    /// The CID file is missing or could not be loaded.
    CidUnavailable(String),
    HashMismatch,
    /// Same source, but instrumented with different settings.
    ConfigChanged,
}

impl fmt::Display for CacheMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forced => write!(f, "forced"),
            Self::OutputMissing => write!(f, "instrumented output missing"),
            Self::CidUnavailable(reason) => write!(f, "CID unavailable ({reason})"),
            Self::HashMismatch => write!(f, "source changed"),
            Self::ConfigChanged => write!(f, "configuration changed"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheDecision {
    Reuse,
    Instrument(CacheMiss),
}

impl CacheDecision {
    pub fn is_reuse(&self) -> bool {
        matches!(self, Self::Reuse)
    }
}

/// Reuse iff not forced, the output exists, the CID loads, its hash equals
/// `source_hash` and it was written with the same `config_fingerprint`. A
/// CID that fails to load is a miss, never an error.
pub fn check_cache(
    force: bool,
    file: &SourceFile,
    source_hash: &str,
    config_fingerprint: &str,
) -> CacheDecision {
    if force {
        return CacheDecision::Instrument(CacheMiss::Forced);
    }
    if !file.output.is_file() {
        return CacheDecision::Instrument(CacheMiss::OutputMissing);
    }
    match CidDocument::load(&file.cid) {
        Ok(document) if document.source_code_hash != source_hash => {
            CacheDecision::Instrument(CacheMiss::HashMismatch)
        }
        Ok(document) if document.config_fingerprint != config_fingerprint => {
            CacheDecision::Instrument(CacheMiss::ConfigChanged)
        }
        Ok(_) => CacheDecision::Reuse,
        Err(e) => {
            log::debug!("{e}");
            CacheDecision::Instrument(CacheMiss::CidUnavailable(e.to_string()))
        }
    }
}
