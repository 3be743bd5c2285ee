//! Inserts probes into the original text.
//!
//! Marker coordinates are turned into byte offsets, the evaluation sections
//! and checkpoint scopes are checked to nest properly, and then every probe
//! text is spliced in at its offset. At a single offset the inserted texts
//! read, left to right: closers (innermost first), the checkpoint opener,
//! evaluation openers (outermost first). The source bytes themselves are
//! copied unchanged.

use super::probes::ProbeSet;
use crate::cid::CidDocument;
use crate::core::{CodePosition, CodeSection, EvaluationType, Marker, MarkerId, MarkerKind};
use crate::errors::{InstrumentError, Result};
use std::cmp::{Ordering, Reverse};

/// Byte offset of every line start.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            text.bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            starts,
            len: text.len(),
        }
    }

    /// Offset of `position`, which may point one past the last byte of its
    /// line but not beyond.
    pub fn offset(&self, position: CodePosition) -> Option<usize> {
        let line = usize::try_from(position.line).ok()?.checked_sub(1)?;
        let column = usize::try_from(position.column).ok()?.checked_sub(1)?;
        let start = *self.starts.get(line)?;
        let line_end = match self.starts.get(line + 1) {
            Some(next) => next - 1,
            None => self.len,
        };
        let offset = start + column;
        (offset <= line_end).then_some(offset)
    }
}

/// Nesting rank at an identical section: scope encloses Decision encloses Condition.
fn rank(kind: MarkerKind) -> u8 {
    match kind {
        MarkerKind::Checkpoint => 0,
        MarkerKind::Evaluation(EvaluationType::Decision) => 1,
        MarkerKind::Evaluation(EvaluationType::Condition) => 2,
    }
}

#[derive(Debug, Clone, Copy)]
struct Span {
    id: MarkerId,
    start: usize,
    end: usize,
    rank: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EditClass {
    Close,
    CheckpointOpen,
    EvaluationOpen,
}

#[derive(Debug)]
struct Edit {
    offset: usize,
    class: EditClass,
    span: Span,
    text: String,
}

impl Edit {
    /// Final left-to-right order of edits sharing one offset.
    fn order(&self, other: &Self) -> Ordering {
        self.class.cmp(&other.class).then_with(|| match self.class {
            EditClass::Close => (Reverse(self.span.start), Reverse(self.span.rank))
                .cmp(&(Reverse(other.span.start), Reverse(other.span.rank))),
            EditClass::CheckpointOpen => Ordering::Equal,
            EditClass::EvaluationOpen => (Reverse(self.span.end), self.span.rank)
                .cmp(&(Reverse(other.span.end), other.span.rank)),
        })
        .then_with(|| self.span.id.cmp(&other.span.id))
    }
}

pub struct Rewriter<'a> {
    source: &'a str,
    lines: LineIndex,
    probes: &'a ProbeSet,
}

impl<'a> Rewriter<'a> {
    pub fn new(source: &'a str, probes: &'a ProbeSet) -> Self {
        Self {
            source,
            lines: LineIndex::new(source),
            probes,
        }
    }

    fn offset_of(&self, marker: MarkerId, position: CodePosition) -> Result<usize> {
        let offset = self.lines.offset(position).ok_or_else(|| {
            InstrumentError::overlapping(marker, format!("position {position} is outside the source"))
        })?;
        if !self.source.is_char_boundary(offset) {
            return Err(InstrumentError::overlapping(
                marker,
                format!("position {position} is inside a UTF-8 character"),
            ));
        }
        Ok(offset)
    }

    fn span_of(&self, marker: &Marker, section: CodeSection) -> Result<Span> {
        if !section.is_well_formed() {
            return Err(InstrumentError::overlapping(
                marker.id,
                format!("malformed section {section}"),
            ));
        }
        Ok(Span {
            id: marker.id,
            start: self.offset_of(marker.id, section.start)?,
            end: self.offset_of(marker.id, section.end)?,
            rank: rank(marker.kind),
        })
    }

    fn edits(&self, markers: &[Marker]) -> Result<(Vec<Edit>, Vec<Span>)> {
        let mut edits = Vec::with_capacity(markers.len() * 2);
        let mut spans = Vec::with_capacity(markers.len());

        for marker in markers {
            match (marker.kind, marker.section(), marker.scope()) {
                (MarkerKind::Checkpoint, _, None) => {
                    let offset = self.offset_of(marker.id, marker.location.start())?;
                    let span = Span {
                        id: marker.id,
                        start: offset,
                        end: offset,
                        rank: 0,
                    };
                    edits.push(Edit {
                        offset,
                        class: EditClass::CheckpointOpen,
                        span,
                        text: self.probes.checkpoint(marker.id),
                    });
                }
                (MarkerKind::Checkpoint, _, Some(scope)) => {
                    let span = self.span_of(marker, scope)?;
                    edits.push(Edit {
                        offset: span.start,
                        class: EditClass::CheckpointOpen,
                        span,
                        text: self.probes.scope_open(marker.id),
                    });
                    edits.push(Edit {
                        offset: span.end,
                        class: EditClass::Close,
                        span,
                        text: self.probes.scope_close().to_string(),
                    });
                    spans.push(span);
                }
                (MarkerKind::Evaluation(_), Some(section), _) => {
                    let span = self.span_of(marker, section)?;
                    edits.push(Edit {
                        offset: span.start,
                        class: EditClass::EvaluationOpen,
                        span,
                        text: self.probes.evaluation_open(marker.id),
                    });
                    edits.push(Edit {
                        offset: span.end,
                        class: EditClass::Close,
                        span,
                        text: self.probes.evaluation_close().to_string(),
                    });
                    spans.push(span);
                }
                (MarkerKind::Evaluation(_), None, _) => {
                    return Err(InstrumentError::overlapping(
                        marker.id,
                        "evaluation marker without a section",
                    ))
                }
            }
        }
        Ok((edits, spans))
    }

    /// Produce `prelude` followed by the instrumented source.
    pub fn rewrite(&self, document: &CidDocument, prelude: &str) -> Result<String> {
        let (mut edits, mut spans) = self.edits(&document.markers)?;
        check_laminar(&mut spans)?;

        edits.sort_by(|a, b| a.offset.cmp(&b.offset).then_with(|| a.order(b)));

        let inserted: usize = edits.iter().map(|edit| edit.text.len()).sum();
        let mut out = String::with_capacity(prelude.len() + self.source.len() + inserted);
        out.push_str(prelude);

        let mut copied = 0;
        for edit in &edits {
            out.push_str(&self.source[copied..edit.offset]);
            out.push_str(&edit.text);
            copied = edit.offset;
        }
        out.push_str(&self.source[copied..]);
        Ok(out)
    }
}

/// Any two spans must be disjoint or nested.
fn check_laminar(spans: &mut [Span]) -> Result<()> {
    spans.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| b.end.cmp(&a.end))
            .then_with(|| a.rank.cmp(&b.rank))
    });

    let mut open: Vec<Span> = Vec::new();
    for span in spans.iter() {
        while open.last().is_some_and(|top| top.end <= span.start) {
            open.pop();
        }
        if let Some(top) = open.last() {
            if span.end > top.end {
                return Err(InstrumentError::overlapping(
                    span.id,
                    format!("section crosses marker {}", top.id),
                ));
            }
        }
        open.push(*span);
    }
    Ok(())
}

/// Instrument `source` according to `document`.
pub fn rewrite(
    source: &str,
    document: &CidDocument,
    probes: &ProbeSet,
    prelude: &str,
) -> Result<String> {
    Rewriter::new(source, probes).rewrite(document, prelude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::CidManager;
    use crate::config::ProbeNames;
    use crate::syntax::Dialect;
    use pretty_assertions::assert_eq;

    fn c_probes() -> ProbeSet {
        ProbeSet::new(ProbeNames::default(), Dialect::C)
    }

    #[test]
    fn test_line_index_offsets() {
        let index = LineIndex::new("ab\ncd\n");
        assert_eq!(index.offset(CodePosition::new(1, 1)), Some(0));
        assert_eq!(index.offset(CodePosition::new(1, 3)), Some(2));
        assert_eq!(index.offset(CodePosition::new(2, 2)), Some(4));
        assert_eq!(index.offset(CodePosition::new(1, 4)), None);
        assert_eq!(index.offset(CodePosition::new(4, 1)), None);
        assert_eq!(index.offset(CodePosition::new(0, 1)), None);
    }

    #[test]
    fn test_condition_and_decision_on_same_section() {
        let source = "if (f()) y = 2;";
        let mut ledger = CidManager::new(source.as_bytes());
        ledger
            .add_evaluation(CodeSection::on_line(1, 5, 8), EvaluationType::Decision)
            .unwrap();
        ledger
            .add_evaluation(CodeSection::on_line(1, 5, 8), EvaluationType::Condition)
            .unwrap();
        ledger
            .add_scoped_checkpoint(CodeSection::on_line(1, 10, 16))
            .unwrap();

        let out = rewrite(source, &ledger.finalize(), &c_probes(), "").unwrap();

        assert_eq!(
            out,
            "if (__coveron_evaluation(1, (__coveron_evaluation(2, (f()) ? 1 : 0)) ? 1 : 0)) \
             { __coveron_checkpoint(3u); y = 2; }"
        );
    }

    #[test]
    fn test_adjacent_conditions_close_before_opening() {
        let source = "a&&b";
        let mut ledger = CidManager::new(source.as_bytes());
        ledger
            .add_evaluation(CodeSection::on_line(1, 1, 5), EvaluationType::Decision)
            .unwrap();
        ledger
            .add_evaluation(CodeSection::on_line(1, 1, 2), EvaluationType::Condition)
            .unwrap();
        ledger
            .add_evaluation(CodeSection::on_line(1, 4, 5), EvaluationType::Condition)
            .unwrap();

        let probes = ProbeSet::new(
            ProbeNames {
                checkpoint: "C".to_string(),
                evaluation: "E".to_string(),
            },
            Dialect::Cpp,
        );
        let out = rewrite(source, &ledger.finalize(), &probes, "").unwrap();

        assert_eq!(
            out,
            "E(1, (E(2, (a) ? true : false)&&E(3, (b) ? true : false)) ? true : false)"
        );
    }

    #[test]
    fn test_checkpoint_precedes_evaluation_at_statement_start() {
        let source = "x && y;";
        let mut ledger = CidManager::new(source.as_bytes());
        ledger.add_checkpoint(CodePosition::new(1, 1)).unwrap();
        ledger
            .add_evaluation(CodeSection::on_line(1, 1, 7), EvaluationType::Decision)
            .unwrap();

        let out = rewrite(source, &ledger.finalize(), &c_probes(), "").unwrap();
        assert!(out.starts_with("__coveron_checkpoint(1); __coveron_evaluation(2, (x && y"));
    }

    #[test]
    fn test_prelude_is_prepended_and_text_outside_probes_is_unchanged() {
        let source = "int main(void)\t{ return 0; }\n";
        let mut ledger = CidManager::new(source.as_bytes());
        ledger.add_checkpoint(CodePosition::new(1, 18)).unwrap();

        let out = rewrite(source, &ledger.finalize(), &c_probes(), "#include \"h.h\"\n").unwrap();
        assert_eq!(
            out,
            "#include \"h.h\"\nint main(void)\t{ __coveron_checkpoint(1); return 0; }\n"
        );
    }

    #[test]
    fn test_crossing_sections_are_rejected() {
        let source = "abcdefgh";
        let mut ledger = CidManager::new(source.as_bytes());
        ledger
            .add_evaluation(CodeSection::on_line(1, 1, 5), EvaluationType::Decision)
            .unwrap();
        ledger
            .add_evaluation(CodeSection::on_line(1, 3, 8), EvaluationType::Condition)
            .unwrap();

        let err = rewrite(source, &ledger.finalize(), &c_probes(), "").unwrap_err();
        assert!(matches!(err, InstrumentError::OverlappingMarker { marker: MarkerId(2), .. }));
    }

    #[test]
    fn test_out_of_range_and_inverted_sections_are_rejected() {
        let source = "ab\n";
        let mut ledger = CidManager::new(source.as_bytes());
        ledger
            .add_evaluation(CodeSection::on_line(1, 1, 9), EvaluationType::Decision)
            .unwrap();
        let err = rewrite(source, &ledger.finalize(), &c_probes(), "").unwrap_err();
        assert!(matches!(err, InstrumentError::OverlappingMarker { .. }));

        let mut ledger = CidManager::new(source.as_bytes());
        ledger
            .add_evaluation(CodeSection::on_line(1, 3, 1), EvaluationType::Decision)
            .unwrap();
        let err = rewrite(source, &ledger.finalize(), &c_probes(), "").unwrap_err();
        assert!(err.to_string().contains("malformed section"));
    }

    #[test]
    fn test_adjacent_disjoint_sections_are_laminar() {
        let mut spans = vec![
            Span { id: MarkerId(1), start: 0, end: 3, rank: 2 },
            Span { id: MarkerId(2), start: 3, end: 6, rank: 2 },
            Span { id: MarkerId(3), start: 0, end: 6, rank: 1 },
            Span { id: MarkerId(4), start: 3, end: 3, rank: 2 },
        ];
        assert!(check_laminar(&mut spans).is_ok());
    }
}
