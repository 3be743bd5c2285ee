//! Marker types recorded in the CID document.

use super::position::{CodePosition, CodeSection};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a marker, unique within one CID document. Ids start at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerId(pub u32);

impl MarkerId {
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationType {
    /// A full boolean control expression.
    Decision,
    /// An atomic boolean sub-expression of a decision.
    Condition,
}

impl fmt::Display for EvaluationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decision => write!(f, "decision"),
            Self::Condition => write!(f, "condition"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// A statement was reached.
    Checkpoint,
    /// A boolean sub-expression was evaluated.
    Evaluation(EvaluationType),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MarkerLocation {
    Point(CodePosition),
    Section(CodeSection),
}

impl MarkerLocation {
    pub fn start(&self) -> CodePosition {
        match self {
            Self::Point(position) => *position,
            Self::Section(section) => section.start,
        }
    }
}

/// One instrumentation point.
///
/// On disk a marker is a flat record (see [`MarkerRecord`]); `scope_end` only
/// lives in memory and tells the rewriter to put braces around a statement
/// that is the unbraced body of a control statement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "MarkerRecord", try_from = "MarkerRecord")]
pub struct Marker {
    pub id: MarkerId,
    pub kind: MarkerKind,
    pub location: MarkerLocation,
    pub scope_end: Option<CodePosition>,
}

impl Marker {
    pub fn checkpoint(id: MarkerId, position: CodePosition) -> Self {
        Self {
            id,
            kind: MarkerKind::Checkpoint,
            location: MarkerLocation::Point(position),
            scope_end: None,
        }
    }

    pub fn evaluation(id: MarkerId, section: CodeSection, eval_type: EvaluationType) -> Self {
        Self {
            id,
            kind: MarkerKind::Evaluation(eval_type),
            location: MarkerLocation::Section(section),
            scope_end: None,
        }
    }

    pub fn is_checkpoint(&self) -> bool {
        matches!(self.kind, MarkerKind::Checkpoint)
    }

    pub fn eval_type(&self) -> Option<EvaluationType> {
        match self.kind {
            MarkerKind::Evaluation(eval_type) => Some(eval_type),
            MarkerKind::Checkpoint => None,
        }
    }

    /// Section of an evaluation marker; `None` for checkpoints.
    pub fn section(&self) -> Option<CodeSection> {
        match self.location {
            MarkerLocation::Section(section) => Some(section),
            MarkerLocation::Point(_) => None,
        }
    }

    /// Statement extent of a scoped checkpoint.
    pub fn scope(&self) -> Option<CodeSection> {
        self.scope_end
            .map(|end| CodeSection::new(self.location.start(), end))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKindTag {
    Checkpoint,
    Evaluation,
}

/// Serialized form of a [`Marker`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub id: MarkerId,
    pub kind: MarkerKindTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_type: Option<EvaluationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<CodePosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<CodeSection>,
}

impl From<Marker> for MarkerRecord {
    fn from(marker: Marker) -> Self {
        match (marker.kind, marker.location) {
            (MarkerKind::Checkpoint, location) => Self {
                id: marker.id,
                kind: MarkerKindTag::Checkpoint,
                eval_type: None,
                position: Some(location.start()),
                section: None,
            },
            (MarkerKind::Evaluation(eval_type), MarkerLocation::Section(section)) => Self {
                id: marker.id,
                kind: MarkerKindTag::Evaluation,
                eval_type: Some(eval_type),
                position: None,
                section: Some(section),
            },
            (MarkerKind::Evaluation(eval_type), MarkerLocation::Point(position)) => Self {
                id: marker.id,
                kind: MarkerKindTag::Evaluation,
                eval_type: Some(eval_type),
                position: None,
                section: Some(CodeSection::new(position, position)),
            },
        }
    }
}

impl TryFrom<MarkerRecord> for Marker {
    type Error = String;

    fn try_from(record: MarkerRecord) -> Result<Self, Self::Error> {
        match record.kind {
            MarkerKindTag::Checkpoint => {
                let position = record
                    .position
                    .ok_or_else(|| format!("checkpoint {} has no position", record.id))?;
                Ok(Marker::checkpoint(record.id, position))
            }
            MarkerKindTag::Evaluation => {
                let eval_type = record
                    .eval_type
                    .ok_or_else(|| format!("evaluation {} has no eval_type", record.id))?;
                let section = record
                    .section
                    .ok_or_else(|| format!("evaluation {} has no section", record.id))?;
                Ok(Marker::evaluation(record.id, section, eval_type))
            }
        }
    }
}
