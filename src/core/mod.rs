//! Value types shared by every stage of the instrumenter.

pub mod marker;
pub mod position;

pub use marker::{EvaluationType, Marker, MarkerId, MarkerKind, MarkerLocation, MarkerRecord};
pub use position::{CodePosition, CodeSection};
