//! Per-document, per-pass dirty scope tracking.
//!
//! Each document maps every registered pass to the range it still has to
//! (re)analyze. A document with no entry is maximally dirty: every pass must
//! analyze the whole file. Entries appear when a pass first reports itself up
//! to date and disappear on global invalidation or document disposal.
//!
//! Every operation runs under one mutex, so union/narrow sequences are never
//! interleaved with reads.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use xeno_primitives::{CharLen, Document, DocumentId, RangeMarker, TextRange};

use crate::pass_id::PassId;


/// Stale region of one pass.
#[derive(Debug, Clone)]
enum DirtyScope {
	Clean,
	WholeFile,
	Range(RangeMarker),
}

#[derive(Debug)]
struct FileStatus {
	scopes: FxHashMap<PassId, DirtyScope>,
	/// Something probably changed but the caller has not said where yet.
	defensively_marked: bool,
	liveness_finished: bool,
	error_found: bool,
}

impl FileStatus {
	fn new(tracked: &FxHashSet<PassId>) -> Self {
		Self {
			scopes: tracked
				.iter()
				.filter(|id| **id != PassId::LIVENESS)
				.map(|id| (*id, DirtyScope::WholeFile))
				.collect(),
			defensively_marked: false,
			liveness_finished: false,
			error_found: false,
		}
	}

	fn mark_whole_file_dirty(&mut self) {
		for scope in self.scopes.values_mut() {
			*scope = DirtyScope::WholeFile;
		}
		self.liveness_finished = false;
	}

	/// Widens everything to whole-file if a defensive mark is pending.
	fn consume_defensive_mark(&mut self) {
		if self.defensively_marked {
			self.mark_whole_file_dirty();
			self.defensively_marked = false;
		}
	}
}

#[derive(Debug)]
struct TrackerState {
	files: FxHashMap<DocumentId, FileStatus>,
	/// Dirtying events per document, absent entries and disposals included.
	/// Never reset, so a version read before a disposal cannot match after it.
	edits: FxHashMap<DocumentId, u64>,
	allow_dirt: bool,
}

impl TrackerState {
	fn bump(&mut self, doc: DocumentId) {
		*self.edits.entry(doc).or_default() += 1;
	}
}

/// Snapshot of everything that can dirty one document.
///
/// Read it before deciding a pass is clean and hand it back to
/// [`DirtyScopeTracker::mark_up_to_date_since`], so dirt recorded in between
/// is never wiped out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtVersion {
	resets: u64,
	edits: u64,
}

/// Tracks which text range of each document every pass must recompute.
#[derive(Debug)]
pub struct DirtyScopeTracker {
	tracked: FxHashSet<PassId>,
	state: Mutex<TrackerState>,
	resets: AtomicU64,
}

impl DirtyScopeTracker {
	/// Creates a tracker for the given registered pass ids.
	pub fn new(tracked: impl IntoIterator<Item = PassId>) -> Self {
		Self {
			tracked: tracked.into_iter().collect(),
			state: Mutex::new(TrackerState {
				files: FxHashMap::default(),
				edits: FxHashMap::default(),
				allow_dirt: true,
			}),
			resets: AtomicU64::new(0),
		}
	}

	pub fn is_tracked(&self, pass: PassId) -> bool {
		self.tracked.contains(&pass)
	}

	/// Number of global resets so far.
	///
	/// Consumers compare it with a previously read value to detect a
	/// [`Self::mark_all_dirty`] in between.
	pub fn reset_count(&self) -> u64 {
		self.resets.load(Ordering::Acquire)
	}

	/// Current [`DirtVersion`] of `doc`.
	pub fn version(&self, doc: &dyn Document) -> DirtVersion {
		let state = self.state.lock();
		self.version_locked(&state, doc.id())
	}

	fn version_locked(&self, state: &TrackerState, doc: DocumentId) -> DirtVersion {
		DirtVersion {
			resets: self.resets.load(Ordering::Acquire),
			edits: state.edits.get(&doc).copied().unwrap_or(0),
		}
	}

	/// Forgets every document, making all of them whole-file dirty.
	pub fn mark_all_dirty(&self, reason: &str) {
		let mut state = self.state.lock();
		let dropped = state.files.len();
		state.files.clear();
		let resets = self.resets.fetch_add(1, Ordering::AcqRel) + 1;
		tracing::debug!(reason, dropped, resets, "dirty.mark_all");
	}

	/// Returns the range `pass` still has to analyze, or `None` if it is up to date.
	///
	/// # Panics
	///
	/// Panics if `pass` was never registered.
	pub fn get_dirty_range(&self, doc: &dyn Document, pass: PassId) -> Option<TextRange> {
		self.assert_tracked(pass);
		let whole = doc.whole_range();
		let mut state = self.state.lock();
		let Some(status) = state.files.get_mut(&doc.id()) else {
			return Some(whole);
		};
		status.consume_defensive_mark();

		if pass == PassId::LIVENESS {
			return (!status.liveness_finished).then_some(TextRange::empty(0));
		}
		match status.scopes.get(&pass) {
			Some(DirtyScope::Clean) => None,
			Some(DirtyScope::Range(marker)) => Some(marker.range().map_or(whole, |r| r.clamp(doc.len()))),
			Some(DirtyScope::WholeFile) | None => Some(whole),
		}
	}

	/// Records that `pass` has fully analyzed the document.
	///
	/// Creates the entry if needed; every other pass of a fresh entry stays
	/// whole-file dirty.
	///
	/// # Panics
	///
	/// Panics if `pass` was never registered.
	pub fn mark_up_to_date(&self, doc: &dyn Document, pass: PassId) {
		self.assert_tracked(pass);
		let mut state = self.state.lock();
		self.mark_clean(&mut state, doc, pass);
	}

	/// [`Self::mark_up_to_date`], unless `doc` was dirtied or reset after
	/// `since` was read. Returns whether the pass was marked.
	///
	/// # Panics
	///
	/// Panics if `pass` was never registered.
	pub fn mark_up_to_date_since(&self, doc: &dyn Document, pass: PassId, since: DirtVersion) -> bool {
		self.assert_tracked(pass);
		let mut state = self.state.lock();
		let now = self.version_locked(&state, doc.id());
		if now != since {
			tracing::trace!(doc = %doc.id(), %pass, ?since, ?now, "dirty.up_to_date_skipped");
			return false;
		}
		self.mark_clean(&mut state, doc, pass);
		true
	}

	fn mark_clean(&self, state: &mut TrackerState, doc: &dyn Document, pass: PassId) {
		let status = state.files.entry(doc.id()).or_insert_with(|| FileStatus::new(&self.tracked));
		status.consume_defensive_mark();

		if pass == PassId::LIVENESS {
			status.liveness_finished = true;
		} else {
			status.scopes.insert(pass, DirtyScope::Clean);
		}
		tracing::trace!(doc = %doc.id(), %pass, "dirty.up_to_date");
	}

	/// Unions `range` into the stale region of every pass.
	///
	/// Documents without an entry are already whole-file dirty and are left
	/// alone.
	///
	/// # Panics
	///
	/// Panics while dirtying is disallowed (see [`Self::allow_dirt`]).
	pub fn mark_dirty(&self, doc: &dyn Document, range: TextRange, doc_len: CharLen) {
		let mut state = self.state.lock();
		assert!(state.allow_dirt, "{} marked dirty at {range} while dirtying is disallowed", doc.id());
		state.bump(doc.id());
		let Some(status) = state.files.get_mut(&doc.id()) else {
			return;
		};
		status.consume_defensive_mark();

		let range = range.clamp(doc_len);
		for scope in status.scopes.values_mut() {
			*scope = combine(scope, range, doc_len, doc);
		}
		status.liveness_finished = false;
		tracing::trace!(doc = %doc.id(), %range, doc_len, "dirty.mark");
	}

	/// Marks the whole document dirty for every pass.
	pub fn mark_whole_file_dirty(&self, doc: &dyn Document, reason: &str) {
		tracing::debug!(doc = %doc.id(), reason, "dirty.mark_whole_file");
		self.mark_dirty(doc, doc.whole_range(), doc.len());
	}

	/// Flags the document as probably changed without a concrete range.
	///
	/// The flag is consumed by the next query, narrowing, or up-to-date call,
	/// which first widens every pass to whole-file.
	pub fn mark_dirty_defensively(&self, doc: &dyn Document) {
		let mut state = self.state.lock();
		assert!(state.allow_dirt, "{} marked dirty defensively while dirtying is disallowed", doc.id());
		state.bump(doc.id());
		if let Some(status) = state.files.get_mut(&doc.id()) {
			status.defensively_marked = true;
			tracing::trace!(doc = %doc.id(), "dirty.mark_defensive");
		}
	}

	/// True only if every pass is up to date and no defensive mark is pending.
	pub fn all_clear(&self, doc: &dyn Document) -> bool {
		let state = self.state.lock();
		let Some(status) = state.files.get(&doc.id()) else {
			return false;
		};
		!status.defensively_marked
			&& (status.liveness_finished || !self.tracked.contains(&PassId::LIVENESS))
			&& status.scopes.values().all(|scope| matches!(scope, DirtyScope::Clean))
	}

	/// True once [`PassId::UPDATE_ALL`] has analyzed the whole document.
	pub fn is_error_analysis_finished(&self, doc: &dyn Document) -> bool {
		self.get_dirty_range(doc, PassId::UPDATE_ALL).is_none()
	}

	pub fn set_error_found(&self, doc: &dyn Document, found: bool) {
		let mut state = self.state.lock();
		let status = state.files.entry(doc.id()).or_insert_with(|| FileStatus::new(&self.tracked));
		status.error_found = found;
	}

	pub fn was_error_found(&self, doc: &dyn Document) -> bool {
		self.state.lock().files.get(&doc.id()).is_some_and(|status| status.error_found)
	}

	/// Allows or forbids dirtying, returning the previous setting.
	///
	/// Drivers forbid it around runs that must not modify the document.
	pub fn allow_dirt(&self, allow: bool) -> bool {
		std::mem::replace(&mut self.state.lock().allow_dirt, allow)
	}

	/// Drops all state for a disposed document.
	pub fn dispose_document(&self, id: DocumentId) {
		let mut state = self.state.lock();
		state.bump(id);
		if state.files.remove(&id).is_some() {
			tracing::trace!(doc = %id, "dirty.dispose");
		}
	}

	/// Dirty ranges of every tracked pass, sorted by pass id.
	pub fn snapshot(&self, doc: &dyn Document) -> Vec<(PassId, Option<TextRange>)> {
		let mut ids: Vec<_> = self.tracked.iter().copied().collect();
		ids.sort_unstable();
		ids.into_iter().map(|id| (id, self.get_dirty_range(doc, id))).collect()
	}

	fn assert_tracked(&self, pass: PassId) {
		assert!(
			self.tracked.contains(&pass),
			"{pass} is not registered with the dirty scope tracker"
		);
	}
}

/// Unions `range` into `scope`.
///
/// Expired markers and unions reaching the document end collapse to
/// whole-file.
fn combine(scope: &DirtyScope, range: TextRange, doc_len: CharLen, doc: &dyn Document) -> DirtyScope {
	match scope {
		DirtyScope::WholeFile => DirtyScope::WholeFile,
		DirtyScope::Clean if range.end() >= doc_len => DirtyScope::WholeFile,
		DirtyScope::Clean => DirtyScope::Range(doc.create_marker(range)),
		DirtyScope::Range(marker) => {
			let Some(old) = marker.range() else {
				return DirtyScope::WholeFile;
			};
			let union = old.union(range);
			if union.end() >= doc_len {
				DirtyScope::WholeFile
			} else if union == old {
				DirtyScope::Range(marker.clone())
			} else {
				DirtyScope::Range(doc.create_marker(union))
			}
		}
	}
}
