//! Pass registration and per-cycle instantiation.
//!
//! Registration is append-only and happens before the first cycle. The first
//! [`PassRegistrar::instantiate_cycle`] freezes the registry and validates the
//! static dependency graph once; later cycles reuse the cached verdict.

use std::sync::{Arc, OnceLock};

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use xeno_primitives::{Document, TextRange};

use crate::dirty::DirtyScopeTracker;
use crate::error::GraphError;
use crate::pass::{AnalysisPass, FactoryContext, PassFactory};
use crate::pass_id::PassId;

mod topo;


/// Predecessor list; passes rarely have more than a handful.
pub type Predecessors = SmallVec<[PassId; 4]>;

struct Entry {
	id: PassId,
	name: Arc<str>,
	factory: Box<dyn PassFactory>,
	completion: Predecessors,
	starting: Predecessors,
}

/// Inputs for instantiating one cycle.
pub struct CycleRequest<'a> {
	pub document: &'a dyn Document,
	pub tracker: &'a DirtyScopeTracker,
	pub priority_range: TextRange,
	/// Passes skipped entirely this cycle; they are neither run nor marked up to date.
	pub ignored: &'a [PassId],
}

/// A pass instantiated for one cycle, wired to its surviving predecessors.
pub struct PassNode {
	pub id: PassId,
	pub name: Arc<str>,
	/// Must be applied before this node may be applied.
	pub completion_predecessors: Predecessors,
	/// Must have started before this node may start.
	pub starting_predecessors: Predecessors,
	pub pass: Box<dyn AnalysisPass>,
}

impl std::fmt::Debug for PassNode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PassNode")
			.field("id", &self.id)
			.field("name", &self.name)
			.field("completion_predecessors", &self.completion_predecessors)
			.field("starting_predecessors", &self.starting_predecessors)
			.finish_non_exhaustive()
	}
}

/// Result of instantiating one cycle.
#[derive(Debug, Default)]
pub struct CyclePlan {
	/// Topologically ordered nodes.
	pub nodes: Vec<PassNode>,
	/// Factories that had nothing to do; the driver marks them up to date.
	pub declined: Vec<PassId>,
	/// Passes the request asked to skip.
	pub ignored: Vec<PassId>,
}

impl CyclePlan {
	pub fn ids(&self) -> Vec<PassId> {
		self.nodes.iter().map(|node| node.id).collect()
	}
}

/// Registry of pass factories and their ordering constraints.
pub struct PassRegistrar {
	/// Sorted by id.
	entries: Vec<Entry>,
	next_auto: PassId,
	/// Set on first instantiation; holds the static graph verdict.
	frozen: OnceLock<Result<(), GraphError>>,
}

impl Default for PassRegistrar {
	fn default() -> Self {
		Self::new()
	}
}

impl PassRegistrar {
	pub fn new() -> Self {
		Self {
			entries: Vec::new(),
			next_auto: PassId::first_dynamic(),
			frozen: OnceLock::new(),
		}
	}

	/// Registers `factory` and returns its id.
	///
	/// `forced_id` pins the id (typically one of the reserved constants);
	/// otherwise the next free id above [`PassId::LAST_RESERVED`] is assigned.
	pub fn register(
		&mut self,
		factory: Box<dyn PassFactory>,
		completion_predecessors: &[PassId],
		starting_predecessors: &[PassId],
		forced_id: Option<PassId>,
	) -> Result<PassId, GraphError> {
		let name: Arc<str> = factory.name().into();
		if self.is_frozen() {
			return Err(GraphError::RegistrationClosed { name: name.to_string() });
		}

		let id = match forced_id {
			Some(id) => {
				if let Some(existing) = self.entry(id) {
					return Err(GraphError::DuplicatePassId {
						id,
						existing: existing.name.to_string(),
						new: name.to_string(),
					});
				}
				id
			}
			None => self.allocate_id(),
		};

		let at = self.entries.partition_point(|e| e.id < id);
		self.entries.insert(
			at,
			Entry {
				id,
				name,
				factory,
				completion: completion_predecessors.iter().copied().collect(),
				starting: starting_predecessors.iter().copied().collect(),
			},
		);
		tracing::debug!(%id, name = %self.entries[at].name, "registrar.register");
		Ok(id)
	}

	/// Number of registered passes.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Every registered id in ascending order.
	pub fn tracked_pass_ids(&self) -> Vec<PassId> {
		self.entries.iter().map(|e| e.id).collect()
	}

	pub fn name_of(&self, id: PassId) -> Option<&str> {
		self.entry(id).map(|e| &*e.name)
	}

	pub fn is_frozen(&self) -> bool {
		self.frozen.get().is_some()
	}

	/// Instantiates every pass for one cycle.
	///
	/// The first call freezes registration and checks the static graph for
	/// cycles; a cyclic graph fails every call.
	pub fn instantiate_cycle(&self, request: &CycleRequest<'_>) -> Result<CyclePlan, GraphError> {
		self.frozen
			.get_or_init(|| {
				let verdict = topo::validate(&self.entries);
				tracing::debug!(passes = self.entries.len(), ok = verdict.is_ok(), "registrar.freeze");
				verdict
			})
			.clone()?;

		let mut plan = CyclePlan::default();
		let mut created: FxHashMap<PassId, Box<dyn AnalysisPass>> = FxHashMap::default();
		for entry in &self.entries {
			if request.ignored.contains(&entry.id) {
				plan.ignored.push(entry.id);
				continue;
			}
			let ctx = FactoryContext {
				document: request.document,
				tracker: request.tracker,
				priority_range: request.priority_range,
				pass_id: entry.id,
			};
			match entry.factory.create_pass(&ctx) {
				Some(pass) => {
					created.insert(entry.id, pass);
				}
				None => plan.declined.push(entry.id),
			}
		}

		let survivors: FxHashSet<PassId> = created.keys().copied().collect();
		let survives = |p: &&PassId| survivors.contains(*p);
		for id in topo::order(&self.entries, &survivors) {
			let (Some(entry), Some(pass)) = (self.entry(id), created.remove(&id)) else {
				continue;
			};
			plan.nodes.push(PassNode {
				id,
				name: entry.name.clone(),
				completion_predecessors: entry.completion.iter().filter(survives).copied().collect(),
				starting_predecessors: entry.starting.iter().filter(survives).copied().collect(),
				pass,
			});
		}

		tracing::debug!(
			doc = %request.document.id(),
			nodes = plan.nodes.len(),
			declined = plan.declined.len(),
			ignored = plan.ignored.len(),
			"registrar.instantiate"
		);
		Ok(plan)
	}

	fn entry(&self, id: PassId) -> Option<&Entry> {
		self.entries
			.binary_search_by_key(&id, |e| e.id)
			.ok()
			.map(|at| &self.entries[at])
	}

	fn allocate_id(&mut self) -> PassId {
		while self.entry(self.next_auto).is_some() {
			self.next_auto = self.next_auto.next();
		}
		let id = self.next_auto;
		self.next_auto = id.next();
		id
	}
}
