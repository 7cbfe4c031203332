//! Core text types shared by the analysis scheduler: ranges, documents, and
//! edit-tracking markers.

/// Document identity, the document abstraction, and a rope-backed buffer.
pub mod document;
/// Range markers whose bounds follow edits.
pub mod marker;
/// Half-open char ranges.
pub mod range;

pub use document::{Document, DocumentId, EditError, TextDocument, TextEdit};
pub use marker::{MarkerSet, RangeMarker};
pub use range::{CharIdx, CharLen, TextRange};
pub use ropey::Rope;
