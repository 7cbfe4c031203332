//! Reference driver tying the registrar, dirty tracker, and executor together.
//!
//! One [`AnalysisDaemon`] serves many documents. Each document has at most one
//! cycle in flight; edits cancel it and widen the dirty scopes, and the next
//! cycle picks the work up again.

use std::time::Instant;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use xeno_primitives::{Document, DocumentId, TextEdit, TextRange};
use xeno_worker::{CancelToken, GenerationClock};

use crate::annotation::Severity;
use crate::config::AnalysisConfig;
use crate::dirty::DirtyScopeTracker;
use crate::error::DaemonError;
use crate::executor::{Executor, NodeOutcome};
use crate::pass_id::PassId;
use crate::registrar::{CycleRequest, PassRegistrar};
use crate::session::{Markup, ResultSession};


/// What one [`AnalysisDaemon::run_cycle`] did.
#[derive(Debug)]
pub struct CycleReport {
	pub document: DocumentId,
	/// Generation of the session's cancel token.
	pub generation: u64,
	/// Per-node outcomes in execution order.
	pub outcomes: Vec<(PassId, NodeOutcome)>,
	pub declined: Vec<PassId>,
	pub ignored: Vec<PassId>,
	/// Passes whose dirty scope was cleared by this cycle.
	pub marked_up_to_date: Vec<PassId>,
	/// The cycle was canceled before it finished.
	pub canceled: bool,
	/// The document changed while the cycle ran.
	pub stale: bool,
}

impl CycleReport {
	/// Ids of the passes that ran, in execution order.
	pub fn ran(&self) -> Vec<PassId> {
		self.outcomes.iter().map(|(id, _)| *id).collect()
	}

	pub fn completed(&self) -> Vec<PassId> {
		self.outcomes
			.iter()
			.filter(|(_, outcome)| outcome.is_completed())
			.map(|(id, _)| *id)
			.collect()
	}

	pub fn outcome(&self, pass: PassId) -> Option<&NodeOutcome> {
		self.outcomes.iter().find(|(id, _)| *id == pass).map(|(_, outcome)| outcome)
	}

	/// True when results of this cycle were committed to the tracker.
	pub fn is_committed(&self) -> bool {
		!self.canceled && !self.stale
	}
}

/// Clears the in-flight entry of one cycle however it exits, unless a newer
/// cycle has replaced it.
struct InFlight<'a> {
	entries: &'a Mutex<FxHashMap<DocumentId, CancelToken>>,
	doc: DocumentId,
	generation: u64,
}

impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		let mut entries = self.entries.lock();
		if entries.get(&self.doc).is_some_and(|t| t.generation() == self.generation) {
			entries.remove(&self.doc);
		}
	}
}

/// Incremental analysis driver.
pub struct AnalysisDaemon {
	registrar: PassRegistrar,
	tracker: DirtyScopeTracker,
	config: AnalysisConfig,
	executor: Executor,
	clock: GenerationClock,
	in_flight: Mutex<FxHashMap<DocumentId, CancelToken>>,
	/// Consecutive real failures per (document, pass).
	failures: Mutex<FxHashMap<(DocumentId, PassId), u32>>,
	/// Results carried from one cycle to the next.
	markups: Mutex<FxHashMap<DocumentId, Markup>>,
}

impl AnalysisDaemon {
	/// Takes ownership of a fully populated registrar.
	pub fn new(registrar: PassRegistrar, config: AnalysisConfig) -> Self {
		let tracker = DirtyScopeTracker::new(registrar.tracked_pass_ids());
		tracing::debug!(
			passes = registrar.len(),
			parallel = config.parallel,
			retry_budget = config.retry_budget,
			"daemon.new"
		);
		Self {
			executor: Executor::new(&config),
			registrar,
			tracker,
			config,
			clock: GenerationClock::new(),
			in_flight: Mutex::new(FxHashMap::default()),
			failures: Mutex::new(FxHashMap::default()),
			markups: Mutex::new(FxHashMap::default()),
		}
	}

	pub fn tracker(&self) -> &DirtyScopeTracker {
		&self.tracker
	}

	pub fn registrar(&self) -> &PassRegistrar {
		&self.registrar
	}

	pub fn config(&self) -> &AnalysisConfig {
		&self.config
	}

	/// Opens a session for the next cycle, seeded with the document's
	/// previous results.
	pub fn begin_session(&self, doc: &dyn Document, priority_range: TextRange) -> ResultSession {
		let markup = self.markup(doc.id());
		ResultSession::new(doc, priority_range.clamp(doc.len()), self.clock.token()).with_markup(markup)
	}

	/// Last published results for a document.
	pub fn markup(&self, doc: DocumentId) -> Markup {
		self.markups.lock().get(&doc).cloned().unwrap_or_default()
	}

	/// Records an edit: cancels the running cycle, moves the carried results
	/// along with the text, and dirties the new text plus one char on each
	/// side.
	///
	/// The margin makes a pure deletion dirty the text it joined, so a node
	/// ending where text was removed is revisited.
	pub fn document_changed(&self, doc: &dyn Document, edit: &TextEdit) {
		self.cancel(doc.id());
		if let Some(markup) = self.markups.lock().get_mut(&doc.id()) {
			markup.apply_edit(edit);
		}
		let changed = edit.new_range();
		let dirty = TextRange::new(changed.start().saturating_sub(1), changed.end() + 1).clamp(doc.len());
		self.tracker.mark_dirty(doc, dirty, doc.len());
	}

	/// Records a change whose extent is not known yet.
	pub fn document_changed_defensively(&self, doc: &dyn Document) {
		self.cancel(doc.id());
		self.tracker.mark_dirty_defensively(doc);
	}

	/// Re-analyzes every document from scratch, e.g. after a settings change.
	pub fn restart_all(&self, reason: &str) {
		let canceled = {
			let mut in_flight = self.in_flight.lock();
			let count = in_flight.len();
			for (_, token) in in_flight.drain() {
				token.cancel();
			}
			count
		};
		self.failures.lock().clear();
		self.tracker.mark_all_dirty(reason);
		tracing::debug!(reason, canceled, "daemon.restart_all");
	}

	/// Re-analyzes one document from scratch.
	pub fn restart_document(&self, doc: &dyn Document, reason: &str) {
		self.cancel(doc.id());
		self.tracker.mark_whole_file_dirty(doc, reason);
	}

	/// Forgets everything about a closed document.
	pub fn dispose_document(&self, doc: DocumentId) {
		self.cancel(doc);
		self.tracker.dispose_document(doc);
		self.failures.lock().retain(|(id, _), _| *id != doc);
		self.markups.lock().remove(&doc);
		tracing::debug!(%doc, "daemon.dispose");
	}

	/// Cancels the cycle in flight for `doc`, if any.
	pub fn cancel(&self, doc: DocumentId) -> bool {
		let Some(token) = self.in_flight.lock().remove(&doc) else {
			return false;
		};
		token.cancel();
		tracing::debug!(%doc, generation = token.generation(), "daemon.cancel");
		true
	}

	pub fn is_running(&self, doc: DocumentId) -> bool {
		self.in_flight.lock().contains_key(&doc)
	}

	/// Every pass is up to date for `doc`.
	pub fn is_all_analysis_finished(&self, doc: &dyn Document) -> bool {
		self.tracker.all_clear(doc)
	}

	pub fn is_error_analysis_finished(&self, doc: &dyn Document) -> bool {
		self.tracker.is_error_analysis_finished(doc)
	}

	/// Runs one analysis cycle of `doc` into `session`.
	///
	/// Declining passes are marked up to date right away. Completed passes are
	/// marked up to date only when the cycle was not canceled and the document
	/// did not change meanwhile; otherwise their scopes stay dirty for the next
	/// cycle. Neither happens if the tracker recorded new dirt for `doc` after
	/// planning began. The session's results replace the carried markup only
	/// while the document is unchanged.
	pub fn run_cycle(
		&self,
		doc: &dyn Document,
		session: &ResultSession,
		ignored: &[PassId],
	) -> Result<CycleReport, DaemonError> {
		let started = Instant::now();
		let token = session.cancel_token().clone();
		let superseded = self.in_flight.lock().insert(doc.id(), token.clone());
		if let Some(previous) = superseded
			&& previous.generation() != token.generation()
		{
			previous.cancel();
		}

		let result = {
			let _in_flight = InFlight {
				entries: &self.in_flight,
				doc: doc.id(),
				generation: token.generation(),
			};
			self.drive(doc, session, ignored)
		};
		{
			let mut markups = self.markups.lock();
			if doc.modification_stamp() == session.stamp() {
				markups.insert(doc.id(), session.markup());
			}
		}

		if let Ok(report) = &result {
			tracing::debug!(
				doc = %doc.id(),
				generation = report.generation,
				ran = report.outcomes.len(),
				completed = report.completed().len(),
				declined = report.declined.len(),
				canceled = report.canceled,
				stale = report.stale,
				elapsed_ms = started.elapsed().as_millis() as u64,
				"daemon.cycle"
			);
		}
		result
	}

	fn drive(&self, doc: &dyn Document, session: &ResultSession, ignored: &[PassId]) -> Result<CycleReport, DaemonError> {
		let version = self.tracker.version(doc);
		let plan = self.registrar.instantiate_cycle(&CycleRequest {
			document: doc,
			tracker: &self.tracker,
			priority_range: session.priority_range(),
			ignored,
		})?;
		for id in &plan.declined {
			self.tracker.mark_up_to_date_since(doc, *id, version);
		}

		let mut outcomes = self.executor.execute(plan.nodes, session);
		let canceled = session.cancel_token().is_cancelled();
		let stale = doc.modification_stamp() != session.stamp();

		let mut marked_up_to_date = Vec::new();
		if !canceled && !stale {
			for (id, outcome) in &outcomes {
				if outcome.is_completed() && self.tracker.mark_up_to_date_since(doc, *id, version) {
					marked_up_to_date.push(*id);
				}
			}
			// Results of passes that did not finish this cycle are not trusted.
			let unfinished: FxHashSet<PassId> = outcomes
				.iter()
				.filter(|(_, outcome)| !outcome.is_completed())
				.map(|(id, _)| *id)
				.collect();
			let error_found = session
				.markup()
				.annotations()
				.iter()
				.any(|(pass, annotation)| annotation.severity == Severity::Error && !unfinished.contains(pass));
			self.tracker.set_error_found(doc, error_found);
		}

		if let Some(at) = self.account_failures(doc.id(), &outcomes)
			&& let (pass, NodeOutcome::Failed(source)) = outcomes.swap_remove(at)
		{
			let attempts = self.config.retry_budget + 1;
			tracing::warn!(doc = %doc.id(), %pass, attempts, error = %source, "daemon.retry_exhausted");
			return Err(DaemonError::RetryBudgetExhausted { pass, attempts, source });
		}

		Ok(CycleReport {
			document: doc.id(),
			generation: session.cancel_token().generation(),
			outcomes,
			declined: plan.declined,
			ignored: plan.ignored,
			marked_up_to_date,
			canceled,
			stale,
		})
	}

	/// Updates failure counters; returns the index of the first outcome whose
	/// pass exhausted its retry budget.
	fn account_failures(&self, doc: DocumentId, outcomes: &[(PassId, NodeOutcome)]) -> Option<usize> {
		let mut failures = self.failures.lock();
		let mut exhausted = None;
		for (at, (id, outcome)) in outcomes.iter().enumerate() {
			match outcome {
				NodeOutcome::Completed => {
					failures.remove(&(doc, *id));
				}
				NodeOutcome::Failed(err) => {
					let count = failures.entry((doc, *id)).or_default();
					*count += 1;
					tracing::debug!(%doc, pass = %id, attempt = *count, error = %err, "daemon.pass_failed");
					if *count > self.config.retry_budget {
						failures.remove(&(doc, *id));
						exhausted.get_or_insert(at);
					}
				}
				NodeOutcome::Canceled | NodeOutcome::TimedOut => {}
			}
		}
		exhausted
	}
}
