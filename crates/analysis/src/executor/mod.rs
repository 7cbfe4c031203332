//! Runs an instantiated cycle against a result session.
//!
//! Every node owns two latches: `started` opens when its collection begins,
//! `finished` when it settles. A node waits for the `started` latch of each
//! starting predecessor before it collects, and for the `finished` latch of
//! each completion predecessor before it is applied. All waits are bounded.
//!
//! Nodes are handed to a bounded worker pool in plan order, so every wait is
//! on a node that has already been picked up. Sequential mode runs them on
//! the calling thread, where every wait is already satisfied. A panicking
//! pass fails its own node only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use xeno_worker::{Latch, WaitOutcome, run_ordered};

use crate::config::AnalysisConfig;
use crate::error::PassError;
use crate::pass::PassContext;
use crate::pass_id::PassId;
use crate::registrar::PassNode;
use crate::session::ResultSession;


/// How one node of a cycle ended.
#[derive(Debug)]
pub enum NodeOutcome {
	/// Collected and applied.
	Completed,
	/// Canceled, or skipped because a predecessor did not complete.
	Canceled,
	Failed(PassError),
	/// A predecessor wait hit the deadline.
	TimedOut,
}

impl NodeOutcome {
	pub fn is_completed(&self) -> bool {
		matches!(self, Self::Completed)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Completed => "completed",
			Self::Canceled => "canceled",
			Self::Failed(_) => "failed",
			Self::TimedOut => "timed_out",
		}
	}
}

#[derive(Debug, Default)]
struct Slot {
	started: Latch,
	finished: Latch,
	completed: AtomicBool,
	/// Settled without ever starting.
	aborted: AtomicBool,
}

/// Opens the slot latches however the node exits, panics included.
struct SlotGuard<'a>(&'a Slot);

impl Drop for SlotGuard<'_> {
	fn drop(&mut self) {
		if !self.0.started.is_open() {
			self.0.aborted.store(true, Ordering::Release);
			self.0.started.open();
		}
		self.0.finished.open();
	}
}

/// Drives the nodes of one cycle.
#[derive(Debug, Clone)]
pub struct Executor {
	workers: usize,
	poll_interval: Duration,
	wait_timeout: Duration,
}

impl Executor {
	pub fn new(config: &AnalysisConfig) -> Self {
		Self {
			workers: config.workers(),
			poll_interval: config.poll_interval(),
			wait_timeout: config.wait_timeout(),
		}
	}

	pub fn is_parallel(&self) -> bool {
		self.workers > 0
	}

	/// Runs `nodes` (in topological order) and returns their outcomes in the
	/// same order.
	pub fn execute(&self, nodes: Vec<PassNode>, session: &ResultSession) -> Vec<(PassId, NodeOutcome)> {
		let index: FxHashMap<PassId, usize> = nodes.iter().enumerate().map(|(at, node)| (node.id, at)).collect();
		let slots: Vec<Slot> = nodes.iter().map(|_| Slot::default()).collect();
		let run = NodeRun {
			executor: self,
			session,
			slots: &slots,
			index: &index,
		};

		let ids: Vec<PassId> = nodes.iter().map(|node| node.id).collect();
		run_ordered("analysis", self.workers, nodes, |node| run.run(node))
			.into_iter()
			.zip(ids)
			.map(|(result, id)| {
				let outcome = result.unwrap_or_else(|_| {
					tracing::warn!(pass = %id, "executor.pass_panicked");
					run.settle_unstarted(id);
					NodeOutcome::Failed(PassError::failed(format!("{id} panicked")))
				});
				(id, outcome)
			})
			.collect()
	}
}

/// Shared state for running the nodes of one cycle.
struct NodeRun<'a> {
	executor: &'a Executor,
	session: &'a ResultSession,
	slots: &'a [Slot],
	index: &'a FxHashMap<PassId, usize>,
}

impl NodeRun<'_> {
	fn slot(&self, id: PassId) -> Option<&Slot> {
		self.index.get(&id).map(|at| &self.slots[*at])
	}

	fn run(&self, mut node: PassNode) -> NodeOutcome {
		let started = Instant::now();
		let outcome = match self.slot(node.id) {
			Some(slot) => {
				let _guard = SlotGuard(slot);
				let outcome = self.drive(&mut node, slot);
				slot.completed.store(outcome.is_completed(), Ordering::Release);
				outcome
			}
			None => NodeOutcome::Canceled,
		};

		if !outcome.is_completed() {
			self.abandon(node.id);
		}
		tracing::debug!(
			pass = %node.id,
			name = %node.name,
			outcome = outcome.as_str(),
			elapsed_ms = started.elapsed().as_millis() as u64,
			"executor.node"
		);
		outcome
	}

	/// Settles a node that never ran or panicked, releasing its dependents.
	fn settle_unstarted(&self, id: PassId) {
		if let Some(slot) = self.slot(id) {
			drop(SlotGuard(slot));
		}
		self.abandon(id);
	}

	fn abandon(&self, id: PassId) {
		if let Err(err) = self.session.abandon(id) {
			tracing::trace!(pass = %id, error = %err, "executor.abandon_skipped");
		}
	}

	fn drive(&self, node: &mut PassNode, slot: &Slot) -> NodeOutcome {
		let cancel = self.session.cancel_token();
		for pred in &node.starting_predecessors {
			if let Some(blocked) = self.wait(*pred, |s| &s.started, |s| !s.aborted.load(Ordering::Acquire)) {
				return blocked;
			}
		}
		slot.started.open();

		let ctx = PassContext::new(node.id, self.session, cancel);
		if let Err(err) = node.pass.collect(&ctx) {
			return if err.is_bare_cancellation() {
				NodeOutcome::Canceled
			} else {
				NodeOutcome::Failed(err)
			};
		}

		for pred in &node.completion_predecessors {
			if let Some(blocked) = self.wait(*pred, |s| &s.finished, |s| s.completed.load(Ordering::Acquire)) {
				return blocked;
			}
		}
		if cancel.is_cancelled() {
			return NodeOutcome::Canceled;
		}
		match self.session.complete(node.id) {
			Ok(()) => NodeOutcome::Completed,
			Err(err) => NodeOutcome::Failed(err.into()),
		}
	}

	/// Waits on one latch of `pred`; `None` means the node may proceed.
	fn wait(&self, pred: PassId, latch: impl Fn(&Slot) -> &Latch, ok: impl Fn(&Slot) -> bool) -> Option<NodeOutcome> {
		let slot = self.slot(pred)?;
		let outcome = latch(slot).wait(
			self.session.cancel_token(),
			self.executor.poll_interval,
			self.executor.wait_timeout,
		);
		match outcome {
			WaitOutcome::Opened if ok(slot) => None,
			WaitOutcome::Opened | WaitOutcome::Canceled => Some(NodeOutcome::Canceled),
			WaitOutcome::TimedOut => {
				tracing::warn!(%pred, timeout_ms = self.executor.wait_timeout.as_millis() as u64, "executor.wait_timeout");
				Some(NodeOutcome::TimedOut)
			}
		}
	}
}
