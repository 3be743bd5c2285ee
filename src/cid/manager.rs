//! Per-file marker ledger.
//!
//! A [`CidManager`] is created for one source file, populated during a single
//! walk of its syntax tree, and consumed by [`CidManager::finalize`]. Ids are
//! handed out by an owned [`IdSequence`], so they are `1..=N` in discovery
//! order no matter how many files are processed concurrently.

use super::document::{CidDocument, DecisionRecord, CID_FORMAT_VERSION};
use crate::core::{CodePosition, CodeSection, EvaluationType, Marker, MarkerId};
use crate::errors::{InstrumentError, Result};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Lowercase hex SHA-256 of `bytes`.
pub fn calculate_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Default)]
pub struct IdSequence {
    last: u32,
}

impl IdSequence {
    pub fn next_id(&mut self) -> MarkerId {
        self.last += 1;
        MarkerId(self.last)
    }
}

#[derive(Debug)]
pub struct CidManager {
    source_hash: String,
    ids: IdSequence,
    markers: Vec<Marker>,
    checkpoints: HashMap<CodePosition, MarkerId>,
    evaluations: HashMap<(CodeSection, EvaluationType), MarkerId>,
    decisions: Vec<DecisionRecord>,
}

impl CidManager {
    pub fn new(source: &[u8]) -> Self {
        Self::with_hash(calculate_hash(source))
    }

    pub fn with_hash(source_hash: String) -> Self {
        Self {
            source_hash,
            ids: IdSequence::default(),
            markers: Vec::new(),
            checkpoints: HashMap::new(),
            evaluations: HashMap::new(),
            decisions: Vec::new(),
        }
    }

    pub fn source_hash(&self) -> &str {
        &self.source_hash
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn add_checkpoint(&mut self, position: CodePosition) -> Result<MarkerId> {
        self.insert_checkpoint(position, None)
    }

    /// Checkpoint for a statement that the rewriter must enclose in braces.
    pub fn add_scoped_checkpoint(&mut self, section: CodeSection) -> Result<MarkerId> {
        self.insert_checkpoint(section.start, Some(section.end))
    }

    fn insert_checkpoint(
        &mut self,
        position: CodePosition,
        scope_end: Option<CodePosition>,
    ) -> Result<MarkerId> {
        if let Some(&existing) = self.checkpoints.get(&position) {
            return Err(InstrumentError::DuplicateCheckpoint { position, existing });
        }
        let id = self.ids.next_id();
        let mut marker = Marker::checkpoint(id, position);
        marker.scope_end = scope_end;
        self.checkpoints.insert(position, id);
        self.markers.push(marker);
        Ok(id)
    }

    pub fn add_evaluation(
        &mut self,
        section: CodeSection,
        eval_type: EvaluationType,
    ) -> Result<MarkerId> {
        if let Some(&existing) = self.evaluations.get(&(section, eval_type)) {
            return Err(InstrumentError::DuplicateEvaluation {
                section,
                eval_type,
                existing,
            });
        }
        let id = self.ids.next_id();
        self.evaluations.insert((section, eval_type), id);
        self.markers.push(Marker::evaluation(id, section, eval_type));
        Ok(id)
    }

    pub fn record_decision(&mut self, record: DecisionRecord) {
        self.decisions.push(record);
    }

    /// Consume the ledger into a position-sorted document.
    pub fn finalize(self) -> CidDocument {
        let mut markers = self.markers;
        markers.sort_by(compare_markers);
        let mut decisions = self.decisions;
        decisions.sort_by_key(|record| record.decision);

        CidDocument {
            format_version: CID_FORMAT_VERSION,
            source_code_hash: self.source_hash,
            config_fingerprint: String::new(),
            markers,
            decisions,
        }
    }
}

/// Start ascending; at one start the checkpoint first, then enclosing
/// evaluations before enclosed ones, Decision before Condition, then id.
pub fn compare_markers(a: &Marker, b: &Marker) -> Ordering {
    a.location
        .start()
        .cmp(&b.location.start())
        .then_with(|| b.is_checkpoint().cmp(&a.is_checkpoint()))
        .then_with(|| match (a.section(), b.section()) {
            (Some(x), Some(y)) => y.end.cmp(&x.end),
            _ => Ordering::Equal,
        })
        .then_with(|| a.eval_type().cmp(&b.eval_type()))
        .then_with(|| a.id.cmp(&b.id))
}
