//! Source coordinates.
//!
//! Lines and columns are 1-based. A column counts bytes of the UTF-8 line, so
//! a tab is a single column. Sections are half-open: `end` points one byte
//! past the last byte covered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point within source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodePosition {
    pub line: u32,
    pub column: u32,
}

impl CodePosition {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for CodePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open range `[start, end)` within source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeSection {
    pub start: CodePosition,
    pub end: CodePosition,
}

impl CodeSection {
    pub const fn new(start: CodePosition, end: CodePosition) -> Self {
        Self { start, end }
    }

    /// Shorthand for single-line sections, mostly used by tests.
    pub const fn on_line(line: u32, start_column: u32, end_column: u32) -> Self {
        Self {
            start: CodePosition::new(line, start_column),
            end: CodePosition::new(line, end_column),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.start <= self.end
    }

    /// True when `other` lies entirely inside `self` (equal sections contain each other).
    pub fn contains(&self, other: &CodeSection) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// True when the two sections share at least one byte.
    pub fn intersects(&self, other: &CodeSection) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for CodeSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_order_by_line_then_column() {
        assert!(CodePosition::new(1, 40) < CodePosition::new(2, 1));
        assert!(CodePosition::new(3, 2) < CodePosition::new(3, 10));
    }

    #[test]
    fn test_section_containment_and_intersection() {
        let outer = CodeSection::on_line(4, 9, 20);
        let inner = CodeSection::on_line(4, 9, 10);
        let crossing = CodeSection::on_line(4, 15, 25);
        let after = CodeSection::on_line(4, 20, 22);

        assert!(outer.contains(&inner));
        assert!(outer.contains(&outer));
        assert!(!outer.contains(&crossing));
        assert!(outer.intersects(&crossing));
        assert!(!outer.intersects(&after));
    }

    #[test]
    fn test_inverted_section_is_malformed() {
        let section = CodeSection::on_line(2, 8, 3);
        assert!(!section.is_well_formed());
    }

    #[test]
    fn test_section_display() {
        assert_eq!(CodeSection::on_line(6, 9, 15).to_string(), "6:9-6:15");
    }
}
