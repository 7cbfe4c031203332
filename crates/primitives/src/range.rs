/// A position in the text, measured in characters (not bytes).
///
/// This is the canonical coordinate space for analysis ranges.
pub type CharIdx = usize;

/// A length or count in the text, measured in characters (not bytes).
pub type CharLen = usize;

/// A half-open text range `[start, end)`.
///
/// Unlike a selection there is no direction; reversed bounds are normalized
/// on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TextRange {
	start: CharIdx,
	end: CharIdx,
}

impl TextRange {
	/// Creates a range spanning `start..end`, swapping reversed bounds.
	pub fn new(start: CharIdx, end: CharIdx) -> Self {
		if start <= end { Self { start, end } } else { Self { start: end, end: start } }
	}

	/// Creates a zero-width range at `at`.
	pub const fn empty(at: CharIdx) -> Self {
		Self { start: at, end: at }
	}

	/// Creates the range covering a whole document of `len` chars.
	pub const fn whole(len: CharLen) -> Self {
		Self { start: 0, end: len }
	}

	#[inline]
	pub const fn start(&self) -> CharIdx {
		self.start
	}

	#[inline]
	pub const fn end(&self) -> CharIdx {
		self.end
	}

	#[inline]
	pub const fn len(&self) -> CharLen {
		self.end - self.start
	}

	#[inline]
	pub const fn is_empty(&self) -> bool {
		self.start == self.end
	}

	/// Returns true if `pos` lies within the range (exclusive of end).
	#[inline]
	pub fn contains_offset(&self, pos: CharIdx) -> bool {
		pos >= self.start && pos < self.end
	}

	/// Returns true if `other` lies entirely within this range.
	///
	/// An empty range at `end` is contained.
	#[inline]
	pub fn contains_range(&self, other: TextRange) -> bool {
		self.start <= other.start && other.end <= self.end
	}

	/// Returns true if this range overlaps with another.
	///
	/// Non-empty ranges must share at least one char. An empty range overlaps
	/// any range containing its offset, and two empty ranges overlap only when
	/// they sit at the same offset.
	pub fn overlaps(&self, other: TextRange) -> bool {
		if self.start < other.end && other.start < self.end {
			return true;
		}
		match (self.is_empty(), other.is_empty()) {
			(true, true) => self.start == other.start,
			(true, false) => other.contains_offset(self.start),
			(false, true) => self.contains_offset(other.start),
			(false, false) => false,
		}
	}

	/// Returns the smallest range covering both.
	pub fn union(self, other: TextRange) -> Self {
		Self {
			start: self.start.min(other.start),
			end: self.end.max(other.end),
		}
	}

	/// Returns the shared part of both ranges, if they touch or overlap.
	pub fn intersection(self, other: TextRange) -> Option<Self> {
		let start = self.start.max(other.start);
		let end = self.end.min(other.end);
		(start <= end).then_some(Self { start, end })
	}

	/// Clamps both bounds to `[0, len]`.
	pub fn clamp(self, len: CharLen) -> Self {
		Self {
			start: self.start.min(len),
			end: self.end.min(len),
		}
	}

	/// Moves both bounds by a signed delta, saturating at zero.
	pub fn shift(self, delta: isize) -> Self {
		Self {
			start: self.start.saturating_add_signed(delta),
			end: self.end.saturating_add_signed(delta),
		}
	}
}

impl From<std::ops::Range<CharIdx>> for TextRange {
	fn from(range: std::ops::Range<CharIdx>) -> Self {
		Self::new(range.start, range.end)
	}
}

impl From<TextRange> for std::ops::Range<CharIdx> {
	fn from(range: TextRange) -> Self {
		range.start..range.end
	}
}

impl std::fmt::Display for TextRange {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "[{}, {})", self.start, self.end)
	}
}
