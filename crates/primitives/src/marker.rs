//! Range markers that follow document edits.
//!
//! A [`RangeMarker`] is a shared handle onto a range owned by a document's
//! [`MarkerSet`]. Every edit applied through the set adjusts all live markers;
//! a marker whose whole content is deleted becomes invalid.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::document::TextEdit;
use crate::range::TextRange;

type MarkerCell = Mutex<Option<TextRange>>;

/// Edit-tracking handle onto a text range.
///
/// Clones share the same underlying bounds.
#[derive(Debug, Clone)]
pub struct RangeMarker {
	cell: Arc<MarkerCell>,
}

impl RangeMarker {
	/// Returns the current bounds, or `None` once the marker was invalidated.
	pub fn range(&self) -> Option<TextRange> {
		*self.cell.lock()
	}

	pub fn is_valid(&self) -> bool {
		self.cell.lock().is_some()
	}

	/// Invalidates the marker without an edit.
	pub fn invalidate(&self) {
		*self.cell.lock() = None;
	}
}

/// Registry of markers owned by one document.
///
/// Markers are held weakly; dropped handles are pruned during edits.
#[derive(Debug, Default)]
pub struct MarkerSet {
	cells: Mutex<Vec<Weak<MarkerCell>>>,
}

impl MarkerSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a marker over `range` that follows subsequent edits.
	pub fn create(&self, range: TextRange) -> RangeMarker {
		let cell = Arc::new(Mutex::new(Some(range)));
		self.cells.lock().push(Arc::downgrade(&cell));
		RangeMarker { cell }
	}

	/// Adjusts every live marker for `edit` and prunes dead ones.
	pub fn apply_edit(&self, edit: &TextEdit) {
		self.cells.lock().retain(|weak| {
			let Some(cell) = weak.upgrade() else {
				return false;
			};
			let mut bounds = cell.lock();
			if let Some(range) = *bounds {
				*bounds = edit.map_range(range);
			}
			true
		});
	}

	/// Number of markers still referenced by a handle.
	pub fn live_count(&self) -> usize {
		self.cells.lock().iter().filter(|weak| weak.strong_count() > 0).count()
	}
}
