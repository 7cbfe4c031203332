use rustc_hash::FxHashSet;

use super::Entry;
use crate::error::GraphError;
use crate::pass_id::PassId;

fn lookup(entries: &[Entry], id: PassId) -> Option<&Entry> {
	entries.binary_search_by_key(&id, |e| e.id).ok().map(|at| &entries[at])
}

/// Both kinds of predecessors, known ids only, ascending.
fn predecessors(entries: &[Entry], entry: &Entry) -> Vec<PassId> {
	let mut preds: Vec<_> = entry
		.completion
		.iter()
		.chain(&entry.starting)
		.copied()
		.filter(|p| lookup(entries, *p).is_some())
		.collect();
	preds.sort_unstable();
	preds.dedup();
	preds
}

/// Rejects a static graph in which some pass transitively precedes itself.
///
/// Predecessor ids that were never registered are reported and otherwise
/// ignored.
pub(super) fn validate(entries: &[Entry]) -> Result<(), GraphError> {
	for entry in entries {
		for missing in entry
			.completion
			.iter()
			.chain(&entry.starting)
			.filter(|p| lookup(entries, **p).is_none())
		{
			tracing::warn!(pass = %entry.id, name = %entry.name, predecessor = %missing, "registrar.unknown_predecessor");
		}
	}

	for entry in entries {
		let mut seen = FxHashSet::default();
		let mut stack = predecessors(entries, entry);
		while let Some(id) = stack.pop() {
			if id == entry.id {
				return Err(GraphError::Cycle {
					id,
					name: entry.name.to_string(),
				});
			}
			if !seen.insert(id) {
				continue;
			}
			if let Some(pred) = lookup(entries, id) {
				stack.extend(predecessors(entries, pred));
			}
		}
	}
	Ok(())
}

/// Depth-first topological order of the `survivors`.
///
/// Roots are visited in id order and predecessors in ascending id order, so
/// the result is deterministic. Edges through non-survivors are dropped.
/// Assumes [`validate`] accepted the graph.
pub(super) fn order(entries: &[Entry], survivors: &FxHashSet<PassId>) -> Vec<PassId> {
	fn visit(entries: &[Entry], survivors: &FxHashSet<PassId>, id: PassId, done: &mut FxHashSet<PassId>, out: &mut Vec<PassId>) {
		if !done.insert(id) {
			return;
		}
		if let Some(entry) = lookup(entries, id) {
			for pred in predecessors(entries, entry) {
				if survivors.contains(&pred) {
					visit(entries, survivors, pred, done, out);
				}
			}
		}
		out.push(id);
	}

	let mut done = FxHashSet::default();
	let mut out = Vec::with_capacity(survivors.len());
	for entry in entries.iter().filter(|e| survivors.contains(&e.id)) {
		visit(entries, survivors, entry.id, &mut done, &mut out);
	}
	out
}
