//! Per-file instrumentation pipeline.
//!
//! One pass reads the source, checks the cache, parses, registers markers in
//! a ledger it owns, rewrites the text and writes the output/CID pair. Passes
//! for different files share nothing but the read-only configuration.

use crate::analysis::{find_markers, FinderStats};
use crate::cid::{calculate_hash, check_cache, CacheDecision, CacheMiss, CidDocument, CidManager};
use crate::config::{InstrumenterConfig, SourceFile};
use crate::errors::{InstrumentError, Result};
use crate::instrument::{prelude, rewrite, ProbeSet};
use crate::io::{read_source, remove_if_exists, StagedFile};
use crate::observability::{set_current_file, set_phase, InstrumentPhase};
use crate::syntax::SyntaxProvider;
use std::path::Path;
use tracing::{debug, info, info_span, warn};

/// What happened to one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Instrumented {
        markers: usize,
        decisions: usize,
        reason: CacheMiss,
    },
    /// Output and CID were current and left untouched.
    Reused,
}

/// Instrumented text and its CID, not yet written anywhere.
#[derive(Debug, Clone)]
pub struct Instrumentation {
    pub document: CidDocument,
    pub output: String,
    pub stats: FinderStats,
}

/// Instrument `source` in memory. `input` is the path recorded in the
/// `#line` directive and used to pick the dialect.
pub fn instrument_source(
    input: &Path,
    source: &str,
    provider: &dyn SyntaxProvider,
    config: &InstrumenterConfig,
) -> Result<Instrumentation> {
    instrument_with_hash(input, source, calculate_hash(source.as_bytes()), provider, config)
}

fn instrument_with_hash(
    input: &Path,
    source: &str,
    source_hash: String,
    provider: &dyn SyntaxProvider,
    config: &InstrumenterConfig,
) -> Result<Instrumentation> {
    let tree = {
        let _phase = set_phase(InstrumentPhase::Parsing);
        provider.parse(input, source, &config.compiler_args)?
    };

    let mut ledger = CidManager::with_hash(source_hash);
    let stats = {
        let _phase = set_phase(InstrumentPhase::Finding);
        find_markers(&tree.root, &mut ledger, config.decision_policy)?
    };
    let mut document = ledger.finalize();
    document.config_fingerprint = config.fingerprint(input);
    debug!(
        markers = document.markers.len(),
        checkpoints = stats.checkpoints,
        decisions = stats.decisions,
        "markers registered"
    );

    let output = {
        let _phase = set_phase(InstrumentPhase::Rewriting);
        let probes = ProbeSet::new(config.probes.clone(), tree.dialect);
        let prelude = prelude(&config.runtime_header, input);
        rewrite(source, &document, &probes, &prelude)?
    };

    Ok(Instrumentation {
        document,
        output,
        stats,
    })
}

/// Write output then CID. A stale CID is removed first so that a crash in
/// between never leaves a CID describing a different output; if the CID
/// cannot be committed the fresh output is removed again.
pub fn write_pair(
    file: &SourceFile,
    instrumentation: &Instrumentation,
    compress_cid: bool,
) -> Result<()> {
    let _phase = set_phase(InstrumentPhase::Writing);
    let cid_bytes = instrumentation.document.encode(compress_cid)?;

    let output = StagedFile::stage(&file.output, instrumentation.output.as_bytes())
        .map_err(|e| InstrumentError::output_write(&file.output, e))?;
    let cid = StagedFile::stage(&file.cid, &cid_bytes)
        .map_err(|e| InstrumentError::output_write(&file.cid, e))?;

    remove_if_exists(&file.cid).map_err(|e| InstrumentError::output_write(&file.cid, e))?;
    output
        .commit()
        .map_err(|e| InstrumentError::output_write(&file.output, e))?;

    if let Err(e) = cid.commit() {
        if let Err(cleanup) = remove_if_exists(&file.output) {
            warn!(path = %file.output.display(), error = %cleanup, "cannot roll back output");
        }
        return Err(InstrumentError::output_write(&file.cid, e));
    }
    Ok(())
}

/// Run the full pass for one file.
pub fn instrument_file(
    file: &SourceFile,
    provider: &dyn SyntaxProvider,
    config: &InstrumenterConfig,
) -> Result<FileOutcome> {
    let span = info_span!("instrument_file", path = %file.input.display());
    let _enter = span.enter();
    let _file = set_current_file(&file.input);

    let source = {
        let _phase = set_phase(InstrumentPhase::Reading);
        read_source(&file.input)?
    };
    let source_hash = calculate_hash(&source.bytes);

    let reason = {
        let _phase = set_phase(InstrumentPhase::CacheCheck);
        let fingerprint = config.fingerprint(&file.input);
        match check_cache(config.force, file, &source_hash, &fingerprint) {
            CacheDecision::Reuse => {
                info!("up to date, reusing instrumented output");
                return Ok(FileOutcome::Reused);
            }
            CacheDecision::Instrument(reason) => reason,
        }
    };
    debug!(%reason, "instrumenting");

    let instrumentation =
        instrument_with_hash(&file.input, &source.text, source_hash, provider, config)?;
    write_pair(file, &instrumentation, config.compress_cid)?;

    info!(
        markers = instrumentation.document.markers.len(),
        output = %file.output.display(),
        "instrumented"
    );
    Ok(FileOutcome::Instrumented {
        markers: instrumentation.document.markers.len(),
        decisions: instrumentation.stats.decisions,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::TreeSitterProvider;
    use std::fs;
    use tempfile::TempDir;

    fn setup(source: &str) -> (TempDir, SourceFile, InstrumenterConfig) {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("main.c");
        fs::write(&input, source).unwrap();
        let config = InstrumenterConfig {
            output_dir: dir.path().join("out"),
            ..InstrumenterConfig::default()
        };
        let file = config.source_file(&input);
        (dir, file, config)
    }

    #[test]
    fn test_instrument_source_prelude_and_probes() {
        let config = InstrumenterConfig::default();
        let result = instrument_source(
            Path::new("main.c"),
            "int f(int a) {\n    return a;\n}\n",
            &TreeSitterProvider::new(),
            &config,
        )
        .unwrap();

        assert!(result
            .output
            .starts_with("#include \"coveron_helper.h\"\n#line 1 \"main.c\"\n"));
        assert!(result.output.contains("__coveron_checkpoint(1); return a;"));
        assert_eq!(result.document.markers.len(), 1);
        assert_eq!(result.stats.checkpoints, 1);
    }

    #[test]
    fn test_second_run_reuses_output() {
        let (_dir, file, config) = setup("int main(void) {\n    return 0;\n}\n");
        let provider = TreeSitterProvider::new();

        let first = instrument_file(&file, &provider, &config).unwrap();
        assert!(matches!(
            first,
            FileOutcome::Instrumented {
                reason: CacheMiss::OutputMissing,
                ..
            }
        ));
        assert!(file.output.is_file());
        assert!(file.cid.is_file());

        let second = instrument_file(&file, &provider, &config).unwrap();
        assert_eq!(second, FileOutcome::Reused);
    }

    #[test]
    fn test_force_reinstruments() {
        let (_dir, file, config) = setup("int main(void) {\n    return 0;\n}\n");
        let provider = TreeSitterProvider::new();
        instrument_file(&file, &provider, &config).unwrap();

        let forced = InstrumenterConfig {
            force: true,
            ..config
        };
        let outcome = instrument_file(&file, &provider, &forced).unwrap();
        assert!(matches!(
            outcome,
            FileOutcome::Instrumented {
                reason: CacheMiss::Forced,
                ..
            }
        ));
    }

    #[test]
    fn test_renamed_checkpoint_symbol_reinstruments() {
        let (_dir, file, config) = setup("int main(void) {\n    return 0;\n}\n");
        let provider = TreeSitterProvider::new();
        instrument_file(&file, &provider, &config).unwrap();

        let mut renamed = config;
        renamed.probes.checkpoint = "my_cp".to_string();
        let outcome = instrument_file(&file, &provider, &renamed).unwrap();
        assert!(matches!(
            outcome,
            FileOutcome::Instrumented {
                reason: CacheMiss::ConfigChanged,
                ..
            }
        ));
        assert!(fs::read_to_string(&file.output).unwrap().contains("my_cp(1);"));
        assert_eq!(instrument_file(&file, &provider, &renamed).unwrap(), FileOutcome::Reused);
    }

    #[test]
    fn test_compressed_cid_is_reused() {
        let (_dir, file, config) = setup("int main(void) {\n    return 0;\n}\n");
        let config = InstrumenterConfig {
            compress_cid: true,
            ..config
        };
        let provider = TreeSitterProvider::new();
        instrument_file(&file, &provider, &config).unwrap();

        let bytes = fs::read(&file.cid).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        assert_eq!(instrument_file(&file, &provider, &config).unwrap(), FileOutcome::Reused);
    }

    #[test]
    fn test_parse_error_writes_nothing() {
        let (_dir, file, config) = setup("int main( {\n");
        let err = instrument_file(&file, &TreeSitterProvider::new(), &config).unwrap_err();

        assert!(matches!(err, InstrumentError::Parse { .. }));
        assert!(!file.output.exists());
        assert!(!file.cid.exists());
    }

    #[test]
    fn test_missing_input_is_input_error() {
        let dir = TempDir::new().unwrap();
        let config = InstrumenterConfig {
            output_dir: dir.path().join("out"),
            ..InstrumenterConfig::default()
        };
        let file = config.source_file(&dir.path().join("absent.c"));
        let err = instrument_file(&file, &TreeSitterProvider::new(), &config).unwrap_err();
        assert!(matches!(err, InstrumentError::InputIo { .. }));
    }

    #[test]
    fn test_blocked_cid_path_leaves_no_output() {
        let (_dir, file, _config) = setup("");
        let instrumentation = Instrumentation {
            document: CidManager::new(b"").finalize(),
            output: "int x;\n".to_string(),
            stats: FinderStats::default(),
        };
        fs::create_dir_all(&file.cid).unwrap();
        fs::write(file.cid.join("blocker"), "x").unwrap();

        let err = write_pair(&file, &instrumentation, false).unwrap_err();
        assert!(matches!(err, InstrumentError::OutputWrite { .. }));
        assert!(!file.output.exists());
    }
}
