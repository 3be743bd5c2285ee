//! Removes probes from instrumented text.
//!
//! The inverse of the rewriter: drops the two-line prelude and every probe
//! opener and closer. Closers are matched to their openers by brace and
//! parenthesis depth, counted only outside comments and literals, so
//! subexpressions that happen to look like a closer are left alone.

use super::probes::ProbeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StripError {
    #[error("probe {id} opened at byte {offset} is never closed")]
    Unclosed { id: String, offset: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Scope,
    Evaluation,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    depth: usize,
    id: String,
    offset: usize,
}

/// Drop a leading `#include "..."` + `#line 1 "..."` pair.
fn strip_prelude(text: &str) -> &str {
    let mut lines = text.splitn(3, '\n');
    match (lines.next(), lines.next(), lines.next()) {
        (Some(include), Some(line), rest)
            if include.starts_with("#include \"") && line.starts_with("#line 1 \"") =>
        {
            rest.unwrap_or("")
        }
        _ => text,
    }
}

struct Stripper<'a> {
    bytes: &'a [u8],
    probes: &'a ProbeSet,
    out: Vec<u8>,
    pos: usize,
    parens: usize,
    braces: usize,
    frames: Vec<Frame>,
}

fn is_ident_byte(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}

impl<'a> Stripper<'a> {
    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    fn at_ident_start(&self) -> bool {
        self.pos == 0 || !is_ident_byte(self.bytes[self.pos - 1])
    }

    /// `NAME(<digits>` followed by `suffix`; returns the id and total length.
    fn match_call(&self, name: &str, suffix: &str) -> Option<(String, usize)> {
        let rest = self.rest();
        let after_name = rest.strip_prefix(name.as_bytes())?.strip_prefix(b"(")?;
        let digits = after_name.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return None;
        }
        after_name[digits..].strip_prefix(suffix.as_bytes())?;
        let id = String::from_utf8_lossy(&after_name[..digits]).into_owned();
        Some((id, name.len() + 1 + digits + suffix.len()))
    }

    fn copy(&mut self, len: usize) {
        let end = (self.pos + len).min(self.bytes.len());
        self.out.extend_from_slice(&self.bytes[self.pos..end]);
        self.pos = end;
    }

    fn try_probe(&mut self) -> bool {
        let names = &self.probes.names;

        if self.rest().starts_with(b"{ ") {
            let saved = self.pos;
            self.pos += 2;
            if self.at_ident_start() {
                if let Some((id, len)) = self.match_call(&names.checkpoint, "u); ") {
                    self.frames.push(Frame {
                        kind: FrameKind::Scope,
                        depth: self.braces,
                        id,
                        offset: saved,
                    });
                    self.pos += len;
                    return true;
                }
            }
            self.pos = saved;
        }

        if !self.at_ident_start() {
            return false;
        }
        if let Some((_, len)) = self.match_call(&names.checkpoint, "); ") {
            self.pos += len;
            return true;
        }
        if let Some((id, len)) = self.match_call(&names.evaluation, ", (") {
            self.frames.push(Frame {
                kind: FrameKind::Evaluation,
                depth: self.parens,
                id,
                offset: self.pos,
            });
            self.pos += len;
            return true;
        }
        false
    }

    fn try_closer(&mut self) -> bool {
        let Some(top) = self.frames.last() else {
            return false;
        };
        let (closer, depth) = match top.kind {
            FrameKind::Scope => (self.probes.scope_close(), self.braces),
            FrameKind::Evaluation => (self.probes.evaluation_close(), self.parens),
        };
        if depth == top.depth && self.rest().starts_with(closer.as_bytes()) {
            self.frames.pop();
            self.pos += closer.len();
            return true;
        }
        false
    }

    fn skip_line_comment(&mut self) {
        let len = self
            .rest()
            .iter()
            .position(|&b| b == b'\n')
            .unwrap_or(self.rest().len());
        self.copy(len);
    }

    fn skip_block_comment(&mut self) {
        let len = self.rest()[2..]
            .windows(2)
            .position(|w| w == b"*/")
            .map(|p| p + 4)
            .unwrap_or(self.rest().len());
        self.copy(len);
    }

    fn skip_quoted(&mut self, quote: u8) {
        let rest = self.rest();
        let mut i = 1;
        while i < rest.len() {
            match rest[i] {
                b'\\' => i += 2,
                b'\n' => break,
                b if b == quote => {
                    i += 1;
                    break;
                }
                _ => i += 1,
            }
        }
        self.copy(i);
    }

    /// `R"delim( ... )delim"`, starting at the opening quote.
    fn skip_raw_string(&mut self) -> bool {
        let rest = self.rest();
        let Some(open) = rest.iter().position(|&b| b == b'(') else {
            return false;
        };
        let delimiter = &rest[1..open];
        if delimiter.len() > 16 || delimiter.iter().any(|b| b.is_ascii_whitespace() || *b == b'"') {
            return false;
        }
        let mut terminator = Vec::with_capacity(delimiter.len() + 2);
        terminator.push(b')');
        terminator.extend_from_slice(delimiter);
        terminator.push(b'"');
        let len = rest[open..]
            .windows(terminator.len())
            .position(|w| w == terminator.as_slice())
            .map(|p| open + p + terminator.len())
            .unwrap_or(rest.len());
        self.copy(len);
        true
    }

    /// Numbers, including C++14 digit separators such as `1'000`.
    fn skip_number(&mut self) {
        let rest = self.rest();
        let mut i = 1;
        while i < rest.len() {
            let b = rest[i];
            let separator = b == b'\'' && rest.get(i + 1).is_some_and(|n| n.is_ascii_alphanumeric());
            let exponent_sign = matches!(b, b'+' | b'-') && matches!(rest[i - 1], b'e' | b'E' | b'p' | b'P');
            if is_ident_byte(b) || b == b'.' || separator || exponent_sign {
                i += 1;
            } else {
                break;
            }
        }
        self.copy(i);
    }

    fn run(mut self) -> Result<String, StripError> {
        while self.pos < self.bytes.len() {
            if self.try_closer() || self.try_probe() {
                continue;
            }
            let rest = self.rest();
            match rest[0] {
                b'/' if rest.get(1) == Some(&b'/') => self.skip_line_comment(),
                b'/' if rest.get(1) == Some(&b'*') => self.skip_block_comment(),
                b'"' if self.pos > 0 && self.bytes[self.pos - 1] == b'R' => {
                    if !self.skip_raw_string() {
                        self.skip_quoted(b'"');
                    }
                }
                b'"' => self.skip_quoted(b'"'),
                b'\'' => self.skip_quoted(b'\''),
                b if b.is_ascii_digit() && self.at_ident_start() => self.skip_number(),
                b if is_ident_byte(b) => {
                    let len = rest.iter().take_while(|&&b| is_ident_byte(b)).count();
                    self.copy(len);
                }
                b'(' => {
                    self.parens += 1;
                    self.copy(1);
                }
                b')' => {
                    self.parens = self.parens.saturating_sub(1);
                    self.copy(1);
                }
                b'{' => {
                    self.braces += 1;
                    self.copy(1);
                }
                b'}' => {
                    self.braces = self.braces.saturating_sub(1);
                    self.copy(1);
                }
                _ => self.copy(1),
            }
        }

        if let Some(frame) = self.frames.pop() {
            return Err(StripError::Unclosed {
                id: frame.id,
                offset: frame.offset,
            });
        }
        Ok(String::from_utf8_lossy(&self.out).into_owned())
    }
}

/// Reconstruct the original text from instrumented text.
pub fn strip_probes(instrumented: &str, probes: &ProbeSet) -> Result<String, StripError> {
    let body = strip_prelude(instrumented);
    Stripper {
        bytes: body.as_bytes(),
        probes,
        out: Vec::with_capacity(body.len()),
        pos: 0,
        parens: 0,
        braces: 0,
        frames: Vec::new(),
    }
    .run()
}
