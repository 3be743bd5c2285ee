//! Instrumentation analysis
//!
//! This module finds what gets instrumented:
//! - Checkpoints for every executable simple statement
//! - Decisions for control conditions and free-standing logical expressions
//! - Condition decomposition of each decision for MC/DC

pub mod condition_decomposer;
pub mod decision_finder;

pub use condition_decomposer::{decompose, strip_parentheses, BoolExpr, Decomposition};
pub use decision_finder::{find_markers, DecisionFinder, FinderStats};
