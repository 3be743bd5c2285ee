//! The CID (Coverage Instrumentation Data) document.
//!
//! One JSON document per source file. Coordinates are exact positions in the
//! original, pre-instrumentation file: 1-based lines, 1-based byte columns,
//! section ends exclusive. Report tooling relies on `id` uniqueness and on
//! these coordinates; `decisions` carries the condition structure needed for
//! MC/DC analysis.
//!
//! Ids are issued in discovery order. A decision's own conditions are
//! numbered before any decision nested inside one of them, so for
//! `f(a && b) || f(!c)` the `a && b` decision comes after the `f(!c)`
//! condition: ids are not a strict pre-order of the syntax tree.
//!
//! The file is plain JSON or, when `compress_cid` is set, gzip-compressed
//! JSON. Loading accepts both.

use crate::core::{EvaluationType, Marker, MarkerId};
use crate::errors::{InstrumentError, Result};
use crate::io::atomic::write_atomically;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

pub const CID_FORMAT_VERSION: u32 = 1;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Polarity of a condition within its decision: `Inverted` under an odd
/// number of negations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Direct,
    Inverted,
}

impl Polarity {
    pub fn flip(self) -> Self {
        match self {
            Self::Direct => Self::Inverted,
            Self::Inverted => Self::Direct,
        }
    }
}

/// Short-circuit structure of one decision over its condition markers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ConditionNode {
    Condition {
        id: MarkerId,
    },
    Not {
        operand: Box<ConditionNode>,
    },
    And {
        left: Box<ConditionNode>,
        right: Box<ConditionNode>,
        /// Marker of this intermediate node, when intermediate nodes are instrumented.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        evaluation: Option<MarkerId>,
    },
    Or {
        left: Box<ConditionNode>,
        right: Box<ConditionNode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        evaluation: Option<MarkerId>,
    },
}

/// Result of evaluating a [`ConditionNode`] with C short-circuit semantics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub outcome: bool,
    /// Conditions that were actually evaluated, in evaluation order.
    pub evaluated: Vec<MarkerId>,
}

impl ConditionNode {
    /// Condition ids in source order.
    pub fn conditions(&self) -> Vec<MarkerId> {
        self.polarities().into_iter().map(|(id, _)| id).collect()
    }

    /// Condition ids in source order with the polarity they have in the decision.
    pub fn polarities(&self) -> Vec<(MarkerId, Polarity)> {
        let mut out = Vec::new();
        self.collect_polarities(Polarity::Direct, &mut out);
        out
    }

    fn collect_polarities(&self, polarity: Polarity, out: &mut Vec<(MarkerId, Polarity)>) {
        match self {
            Self::Condition { id } => out.push((*id, polarity)),
            Self::Not { operand } => operand.collect_polarities(polarity.flip(), out),
            Self::And { left, right, .. } | Self::Or { left, right, .. } => {
                left.collect_polarities(polarity, out);
                right.collect_polarities(polarity, out);
            }
        }
    }

    /// Markers of instrumented intermediate nodes, pre-order.
    pub fn intermediate_markers(&self) -> Vec<MarkerId> {
        let mut out = Vec::new();
        self.collect_intermediates(&mut out);
        out
    }

    fn collect_intermediates(&self, out: &mut Vec<MarkerId>) {
        match self {
            Self::Condition { .. } => {}
            Self::Not { operand } => operand.collect_intermediates(out),
            Self::And {
                left,
                right,
                evaluation,
            }
            | Self::Or {
                left,
                right,
                evaluation,
            } => {
                out.extend(evaluation.iter().copied());
                left.collect_intermediates(out);
                right.collect_intermediates(out);
            }
        }
    }

    /// Evaluate under `value_of`, skipping operands exactly as `&&`/`||` do.
    pub fn evaluate<F>(&self, value_of: &F) -> Evaluation
    where
        F: Fn(MarkerId) -> bool,
    {
        let mut evaluated = Vec::new();
        let outcome = self.evaluate_into(value_of, &mut evaluated);
        Evaluation { outcome, evaluated }
    }

    fn evaluate_into<F>(&self, value_of: &F, evaluated: &mut Vec<MarkerId>) -> bool
    where
        F: Fn(MarkerId) -> bool,
    {
        match self {
            Self::Condition { id } => {
                evaluated.push(*id);
                value_of(*id)
            }
            Self::Not { operand } => !operand.evaluate_into(value_of, evaluated),
            Self::And { left, right, .. } => {
                left.evaluate_into(value_of, evaluated) && right.evaluate_into(value_of, evaluated)
            }
            Self::Or { left, right, .. } => {
                left.evaluate_into(value_of, evaluated) || right.evaluate_into(value_of, evaluated)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: MarkerId,
    pub tree: ConditionNode,
}

/// Finalized, position-sorted markers of one source file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidDocument {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub source_code_hash: String,
    /// Hash of the settings that shape the output: runtime symbol names,
    /// decision policy, runtime header and dialect. Empty in files written
    /// without one.
    #[serde(default)]
    pub config_fingerprint: String,
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub decisions: Vec<DecisionRecord>,
}

fn default_format_version() -> u32 {
    CID_FORMAT_VERSION
}

impl CidDocument {
    /// Reads a plain or gzip-compressed CID file; every failure is reported
    /// as `CacheRead`.
    pub fn load(path: &Path) -> Result<Self> {
        let mut bytes =
            fs::read(path).map_err(|e| InstrumentError::cache_read(path, e.to_string()))?;
        if bytes.starts_with(&GZIP_MAGIC) {
            let mut json = Vec::new();
            GzDecoder::new(bytes.as_slice())
                .read_to_end(&mut json)
                .map_err(|e| InstrumentError::cache_read(path, format!("corrupt gzip: {e}")))?;
            bytes = json;
        }
        let document: CidDocument = serde_json::from_slice(&bytes)
            .map_err(|e| InstrumentError::cache_read(path, format!("malformed CID: {e}")))?;
        if document.format_version != CID_FORMAT_VERSION {
            return Err(InstrumentError::cache_read(
                path,
                format!("unsupported format version {}", document.format_version),
            ));
        }
        document
            .validate()
            .map_err(|reason| InstrumentError::cache_read(path, reason))?;
        Ok(document)
    }

    /// Writes the document through a temporary file and rename.
    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        write_atomically(path, &bytes).map_err(|source| InstrumentError::output_write(path, source))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| {
            InstrumentError::output_write(
                "<cid>",
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }

    /// File contents: the JSON text, gzip-compressed if `compress`.
    pub fn encode(&self, compress: bool) -> Result<Vec<u8>> {
        let json = self.to_bytes()?;
        if !compress {
            return Ok(json);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&json)
            .map_err(|e| InstrumentError::output_write("<cid>", e))?;
        encoder
            .finish()
            .map_err(|e| InstrumentError::output_write("<cid>", e))
    }

    /// Ids must be unique and every decision must reference known markers.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut seen = HashSet::with_capacity(self.markers.len());
        for marker in &self.markers {
            if !seen.insert(marker.id) {
                return Err(format!("marker id {} appears twice", marker.id));
            }
        }
        for record in &self.decisions {
            let referenced = std::iter::once(record.decision)
                .chain(record.tree.conditions())
                .chain(record.tree.intermediate_markers());
            for id in referenced {
                if !seen.contains(&id) {
                    return Err(format!(
                        "decision {} references unknown marker {id}",
                        record.decision
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn marker(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.iter().find(|marker| marker.id == id)
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter().filter(|marker| marker.is_checkpoint())
    }

    pub fn evaluations(&self, eval_type: EvaluationType) -> impl Iterator<Item = &Marker> {
        self.markers
            .iter()
            .filter(move |marker| marker.eval_type() == Some(eval_type))
    }

    pub fn decision(&self, id: MarkerId) -> Option<&DecisionRecord> {
        self.decisions.iter().find(|record| record.decision == id)
    }
}
