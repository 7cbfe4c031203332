/// Identifier of one analysis pass.
///
/// Ids up to [`PassId::LAST_RESERVED`] are reserved for well-known passes and
/// may be forced at registration; everything above is handed out by the
/// registrar and stays stable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub u32);

impl PassId {
	/// General highlighting over the dirty region.
	pub const UPDATE_ALL: Self = Self(1);
	/// Local inspections (lints) over the dirty region.
	pub const LOCAL_INSPECTIONS: Self = Self(2);
	/// External annotators (out-of-process tools).
	pub const EXTERNAL_TOOLS: Self = Self(3);
	/// Gutter line markers.
	pub const LINE_MARKERS: Self = Self(4);
	/// Highlighting of injected fragments.
	pub const INJECTED_GENERAL: Self = Self(5);
	/// Whole-document liveness signal.
	///
	/// Not range-tracked: the dirty tracker keeps a single "finished" flag for
	/// it and reports a zero-width range while it is pending.
	pub const LIVENESS: Self = Self(6);
	/// Highest reserved id; auto-assigned ids start right above it.
	pub const LAST_RESERVED: Self = Self(15);

	pub const fn is_reserved(self) -> bool {
		self.0 <= Self::LAST_RESERVED.0
	}

	pub(crate) const fn first_dynamic() -> Self {
		Self(Self::LAST_RESERVED.0 + 1)
	}

	pub(crate) const fn next(self) -> Self {
		Self(self.0 + 1)
	}
}

impl std::fmt::Display for PassId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "pass#{}", self.0)
	}
}
