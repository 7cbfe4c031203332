//! Per-cycle result delivery.
//!
//! A [`ResultSession`] is what passes publish into during one analysis cycle
//! of one document. Results inside the priority range are delivered first
//! (possibly in several batches), the rest in a single outside batch, and
//! [`ResultSession::range_fully_analyzed`] evicts results a re-analysis of the
//! exact same range no longer produces.
//!
//! Per pass the session enforces
//! `Created -> CollectingInside -> CollectingOutside -> Applied`; a failed or
//! canceled pass ends in `Abandoned` and keeps whatever it already published.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use xeno_primitives::{Document, DocumentId, TextEdit, TextRange};
use xeno_worker::CancelToken;

use crate::annotation::Annotation;
use crate::error::SessionError;
use crate::pass_id::PassId;


/// Lifecycle of one pass inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPhase {
	Created,
	CollectingInside,
	CollectingOutside,
	Applied,
	Abandoned,
}

const COLLECTING: &[PassPhase] = &[PassPhase::Created, PassPhase::CollectingInside, PassPhase::CollectingOutside];

/// Observer of session deliveries, e.g. a renderer.
///
/// Callbacks run on the publishing thread after the session lock is
/// released. Every method defaults to a no-op.
#[allow(unused_variables)]
pub trait SessionListener: Send + Sync {
	fn inside_published(&self, pass: PassId, results: &[Annotation], priority: TextRange, restrict: TextRange) {}

	fn outside_published(&self, pass: PassId, results: &[Annotation], restrict: TextRange, priority: TextRange) {}

	fn incremental_published(&self, pass: PassId, result: &Annotation, restrict: TextRange) {}

	fn evicted(&self, pass: PassId, range: TextRange, stale: &[Annotation]) {}

	fn applied(&self, pass: PassId) {}

	fn abandoned(&self, pass: PassId) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Published {
	annotation: Annotation,
	/// Range whose re-analysis owns this result.
	scope: TextRange,
}

/// Published results per pass, each owned by the range that produced it.
///
/// Carried from one session to the next so eviction spans cycles.
#[derive(Debug, Clone, Default)]
pub struct Markup {
	entries: FxHashMap<PassId, Vec<Published>>,
}

impl Markup {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.values().map(Vec::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// All results sorted by pass, then annotation.
	pub fn annotations(&self) -> Vec<(PassId, Annotation)> {
		let mut all: Vec<_> = self
			.entries
			.iter()
			.flat_map(|(pass, list)| list.iter().map(|p| (*pass, p.annotation.clone())))
			.collect();
		all.sort();
		all
	}

	/// Results of one pass, sorted.
	pub fn annotations_for(&self, pass: PassId) -> Vec<Annotation> {
		let mut list: Vec<_> = self
			.entries
			.get(&pass)
			.map(|list| list.iter().map(|p| p.annotation.clone()).collect())
			.unwrap_or_default();
		list.sort();
		list
	}

	/// Moves every result and the range owning it through `edit`.
	///
	/// Results whose text or owning range was deleted are dropped.
	pub fn apply_edit(&mut self, edit: &TextEdit) {
		let before = self.len();
		for list in self.entries.values_mut() {
			list.retain_mut(|p| match (edit.map_range(p.annotation.range), edit.map_range(p.scope)) {
				(Some(range), Some(scope)) => {
					p.annotation.range = range;
					p.scope = scope;
					true
				}
				_ => false,
			});
		}
		tracing::trace!(replaced = %edit.old_range(), delta = edit.delta(), dropped = before - self.len(), "session.markup_edit");
	}

	/// Records `annotation` unless the pass already published an equal one.
	fn publish(&mut self, pass: PassId, annotation: &Annotation, scope: TextRange) -> bool {
		let list = self.entries.entry(pass).or_default();
		if list.iter().any(|p| &p.annotation == annotation) {
			return false;
		}
		list.push(Published {
			annotation: annotation.clone(),
			scope,
		});
		true
	}

	/// Replaces the results owned by exactly `range`, returning the evicted ones.
	fn confirm_range(&mut self, pass: PassId, range: TextRange, fresh: &[Annotation]) -> Vec<Annotation> {
		let list = self.entries.entry(pass).or_default();
		let mut evicted = Vec::new();
		list.retain(|p| {
			let stale = p.scope == range && !fresh.contains(&p.annotation);
			if stale {
				evicted.push(p.annotation.clone());
			}
			!stale
		});
		for annotation in fresh {
			match list.iter_mut().find(|p| &p.annotation == annotation) {
				Some(existing) => existing.scope = range,
				None => list.push(Published {
					annotation: annotation.clone(),
					scope: range,
				}),
			}
		}
		evicted
	}
}

#[derive(Debug, Default)]
struct SessionState {
	phases: FxHashMap<PassId, PassPhase>,
	markup: Markup,
}

impl SessionState {
	fn transition(
		&mut self,
		pass: PassId,
		op: &'static str,
		allowed: &[PassPhase],
		next: Option<PassPhase>,
	) -> Result<(), SessionError> {
		let phase = self.phases.entry(pass).or_insert(PassPhase::Created);
		if !allowed.contains(phase) {
			return Err(SessionError::PhaseViolation { pass, phase: *phase, op });
		}
		if let Some(next) = next {
			*phase = next;
		}
		Ok(())
	}
}

/// Context of one analysis cycle over one document.
pub struct ResultSession {
	document: DocumentId,
	stamp: u64,
	priority_range: TextRange,
	cancel: CancelToken,
	state: Mutex<SessionState>,
	listener: Option<Arc<dyn SessionListener>>,
}

impl ResultSession {
	/// Creates a session for the document's current modification stamp.
	pub fn new(document: &dyn Document, priority_range: TextRange, cancel: CancelToken) -> Self {
		Self {
			document: document.id(),
			stamp: document.modification_stamp(),
			priority_range,
			cancel,
			state: Mutex::new(SessionState::default()),
			listener: None,
		}
	}

	/// Seeds the session with results published by a previous cycle.
	pub fn with_markup(self, markup: Markup) -> Self {
		self.state.lock().markup = markup;
		self
	}

	pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
		self.listener = Some(listener);
		self
	}

	pub fn document_id(&self) -> DocumentId {
		self.document
	}

	/// Modification stamp the cycle was started for.
	pub fn stamp(&self) -> u64 {
		self.stamp
	}

	pub fn priority_range(&self) -> TextRange {
		self.priority_range
	}

	pub fn cancel_token(&self) -> &CancelToken {
		&self.cancel
	}

	/// Current phase of `pass`; passes that never published are `Created`.
	pub fn phase(&self, pass: PassId) -> PassPhase {
		self.state.lock().phases.get(&pass).copied().unwrap_or(PassPhase::Created)
	}

	/// Snapshot of every published result.
	pub fn markup(&self) -> Markup {
		self.state.lock().markup.clone()
	}

	pub fn into_markup(self) -> Markup {
		self.state.into_inner().markup
	}

	/// Delivers a batch of results lying inside the priority range.
	///
	/// May be called repeatedly until the pass publishes its outside batch.
	pub fn publish_inside(
		&self,
		pass: PassId,
		results: &[Annotation],
		priority: TextRange,
		restrict: TextRange,
	) -> Result<(), SessionError> {
		let added = {
			let mut state = self.state.lock();
			state.transition(
				pass,
				"publish_inside",
				&[PassPhase::Created, PassPhase::CollectingInside],
				Some(PassPhase::CollectingInside),
			)?;
			results.iter().filter(|r| state.markup.publish(pass, r, restrict)).count()
		};
		tracing::trace!(doc = %self.document, %pass, count = results.len(), added, %priority, "session.inside");
		if let Some(listener) = &self.listener {
			listener.inside_published(pass, results, priority, restrict);
		}
		Ok(())
	}

	/// Delivers the remaining results; at most once per pass.
	pub fn publish_outside(
		&self,
		pass: PassId,
		results: &[Annotation],
		restrict: TextRange,
		priority: TextRange,
	) -> Result<(), SessionError> {
		let added = {
			let mut state = self.state.lock();
			state.transition(
				pass,
				"publish_outside",
				&[PassPhase::Created, PassPhase::CollectingInside],
				Some(PassPhase::CollectingOutside),
			)?;
			results.iter().filter(|r| state.markup.publish(pass, r, restrict)).count()
		};
		tracing::trace!(doc = %self.document, %pass, count = results.len(), added, %restrict, "session.outside");
		if let Some(listener) = &self.listener {
			listener.outside_published(pass, results, restrict, priority);
		}
		Ok(())
	}

	/// Delivers a single result as soon as it is known.
	pub fn publish_incremental(&self, pass: PassId, result: &Annotation, restrict: TextRange) -> Result<(), SessionError> {
		{
			let mut state = self.state.lock();
			state.transition(pass, "publish_incremental", COLLECTING, None)?;
			state.markup.publish(pass, result, restrict);
		}
		if let Some(listener) = &self.listener {
			listener.incremental_published(pass, result, restrict);
		}
		Ok(())
	}

	/// Declares `range` completely re-analyzed by `pass`.
	///
	/// Results previously owned by exactly this range that are missing from
	/// `fresh` are evicted; `fresh` becomes owned by `range`.
	pub fn range_fully_analyzed(&self, pass: PassId, range: TextRange, fresh: &[Annotation]) -> Result<(), SessionError> {
		let evicted = {
			let mut state = self.state.lock();
			state.transition(pass, "range_fully_analyzed", COLLECTING, None)?;
			state.markup.confirm_range(pass, range, fresh)
		};
		if !evicted.is_empty() {
			tracing::trace!(doc = %self.document, %pass, %range, evicted = evicted.len(), "session.evict");
			if let Some(listener) = &self.listener {
				listener.evicted(pass, range, &evicted);
			}
		}
		Ok(())
	}

	/// Marks `pass` as applied: its results for this cycle are final.
	pub fn complete(&self, pass: PassId) -> Result<(), SessionError> {
		self.state
			.lock()
			.transition(pass, "complete", COLLECTING, Some(PassPhase::Applied))?;
		if let Some(listener) = &self.listener {
			listener.applied(pass);
		}
		Ok(())
	}

	/// Marks `pass` as failed or canceled. Published results stay.
	pub fn abandon(&self, pass: PassId) -> Result<(), SessionError> {
		self.state
			.lock()
			.transition(pass, "abandon", COLLECTING, Some(PassPhase::Abandoned))?;
		if let Some(listener) = &self.listener {
			listener.abandoned(pass);
		}
		Ok(())
	}
}

impl std::fmt::Debug for ResultSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ResultSession")
			.field("document", &self.document)
			.field("stamp", &self.stamp)
			.field("priority_range", &self.priority_range)
			.field("canceled", &self.cancel.is_cancelled())
			.finish_non_exhaustive()
	}
}
