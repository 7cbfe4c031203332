use ropey::Rope;
use thiserror::Error;

use crate::marker::{MarkerSet, RangeMarker};
use crate::range::{CharIdx, CharLen, TextRange};

/// Stable identity of a document across edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

impl std::fmt::Display for DocumentId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "doc#{}", self.0)
	}
}

/// Minimal view of a mutable text buffer needed by analysis scheduling.
///
/// Implementors own the [`MarkerSet`] so that markers created through
/// [`Document::create_marker`] follow the buffer's edits.
pub trait Document: Send + Sync {
	fn id(&self) -> DocumentId;

	/// Current length in chars.
	fn len(&self) -> CharLen;

	/// Monotonic counter bumped on every modification.
	fn modification_stamp(&self) -> u64;

	fn markers(&self) -> &MarkerSet;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Range covering the whole document.
	fn whole_range(&self) -> TextRange {
		TextRange::whole(self.len())
	}

	/// Creates an edit-tracking marker over `range`.
	fn create_marker(&self, range: TextRange) -> RangeMarker {
		self.markers().create(range)
	}
}

/// A single replacement applied to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEdit {
	start: CharIdx,
	old_len: CharLen,
	new_len: CharLen,
}

impl TextEdit {
	pub const fn new(start: CharIdx, old_len: CharLen, new_len: CharLen) -> Self {
		Self { start, old_len, new_len }
	}

	/// Range of the replaced text, in pre-edit coordinates.
	pub fn old_range(&self) -> TextRange {
		TextRange::new(self.start, self.start + self.old_len)
	}

	/// Range of the inserted text, in post-edit coordinates.
	pub fn new_range(&self) -> TextRange {
		TextRange::new(self.start, self.start + self.new_len)
	}

	/// Signed change in document length.
	pub fn delta(&self) -> isize {
		self.new_len as isize - self.old_len as isize
	}

	/// Maps `range` through this edit, or `None` if its whole content is
	/// deleted.
	///
	/// Insertions at a range's start push it right; insertions at the end of
	/// a non-empty range leave it alone. An edit straddling a bound widens
	/// the range to cover the replacement.
	pub fn map_range(&self, range: TextRange) -> Option<TextRange> {
		let old = self.old_range();
		let delta = self.delta();

		if old.start() > range.end() || (old.is_empty() && old.start() == range.end() && !range.is_empty()) {
			return Some(range);
		}
		if old.end() < range.start() || (old.is_empty() && old.start() == range.start()) {
			return Some(range.shift(delta));
		}
		if old.end() == range.start() && !old.is_empty() {
			return Some(range.shift(delta));
		}
		if !range.is_empty() && old.contains_range(range) {
			return None;
		}

		let start = range.start().min(old.start());
		let end = range.end().max(old.end()).saturating_add_signed(delta);
		Some(TextRange::new(start, end.max(start)))
	}
}

/// Errors from applying an edit to a [`TextDocument`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EditError {
	#[error("edit range {range} is out of bounds for document of length {len}")]
	OutOfBounds { range: TextRange, len: CharLen },
}

/// Rope-backed [`Document`] implementation.
#[derive(Debug)]
pub struct TextDocument {
	id: DocumentId,
	text: Rope,
	stamp: u64,
	markers: MarkerSet,
}

impl TextDocument {
	pub fn new(id: DocumentId, text: &str) -> Self {
		Self {
			id,
			text: Rope::from_str(text),
			stamp: 0,
			markers: MarkerSet::new(),
		}
	}

	pub fn text(&self) -> &Rope {
		&self.text
	}

	/// Replaces `range` with `text`, shifting every live marker.
	pub fn replace(&mut self, range: TextRange, text: &str) -> Result<TextEdit, EditError> {
		let len = self.text.len_chars();
		if range.end() > len {
			return Err(EditError::OutOfBounds { range, len });
		}

		self.text.remove(range.start()..range.end());
		self.text.insert(range.start(), text);
		self.stamp += 1;

		let edit = TextEdit::new(range.start(), range.len(), text.chars().count());
		self.markers.apply_edit(&edit);
		Ok(edit)
	}

	/// Inserts `text` at `at`.
	pub fn insert(&mut self, at: CharIdx, text: &str) -> Result<TextEdit, EditError> {
		self.replace(TextRange::empty(at), text)
	}

	/// Deletes `range`.
	pub fn delete(&mut self, range: TextRange) -> Result<TextEdit, EditError> {
		self.replace(range, "")
	}
}

impl Document for TextDocument {
	fn id(&self) -> DocumentId {
		self.id
	}

	fn len(&self) -> CharLen {
		self.text.len_chars()
	}

	fn modification_stamp(&self) -> u64 {
		self.stamp
	}

	fn markers(&self) -> &MarkerSet {
		&self.markers
	}
}
