//! Text rewriting: probe insertion and its inverse.

pub mod probes;
pub mod rewriter;
pub mod strip;

pub use probes::{prelude, ProbeSet};
pub use rewriter::{rewrite, LineIndex, Rewriter};
pub use strip::{strip_probes, StripError};
