//! Splits a ranged tree into priority (inside) and background (outside) work.
//!
//! The walk is depth-first and post-order, so every node comes after its
//! descendants. Node offsets come from sibling order (parent start plus the
//! lengths of preceding siblings) instead of the starts the tree reports,
//! which keeps the early exit on restrict end sound for trees whose reported
//! starts are not sorted.

use xeno_primitives::TextRange;
use xeno_worker::{CancelToken, Canceled};

use crate::tree::RangedTree;

#[cfg(test)]
mod tests;

/// Verdict of an [`AdmissionFilter`] for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
	/// Classify the node and walk its children.
	Descend,
	/// Classify the node, ignore its children.
	SkipChildren,
	/// Drop the node and its whole subtree.
	Exclude,
}

/// Host-supplied policy deciding which subtrees are analyzed.
pub trait AdmissionFilter<T: RangedTree + ?Sized>: Send + Sync {
	fn admit(&self, tree: &T, node: T::Node) -> Admission;
}

/// Partition result: nodes paired with their computed ranges, in post-order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divided<N> {
	pub inside: Vec<(N, TextRange)>,
	/// Also ends with each walked root as a whole-document sentinel.
	pub outside: Vec<(N, TextRange)>,
}

impl<N> Default for Divided<N> {
	fn default() -> Self {
		Self {
			inside: Vec::new(),
			outside: Vec::new(),
		}
	}
}

impl<N> Divided<N> {
	pub fn len(&self) -> usize {
		self.inside.len() + self.outside.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn extend(&mut self, other: Self) {
		self.inside.extend(other.inside);
		self.outside.extend(other.outside);
	}
}

/// Chained filters; the first verdict other than `Descend` wins.
fn admit<T: RangedTree + ?Sized>(filters: &[Box<dyn AdmissionFilter<T>>], tree: &T, node: T::Node) -> Admission {
	filters
		.iter()
		.map(|f| f.admit(tree, node))
		.find(|verdict| *verdict != Admission::Descend)
		.unwrap_or(Admission::Descend)
}

/// Whether a subtree can contain anything overlapping `restrict`.
fn reaches(range: TextRange, restrict: TextRange) -> bool {
	range.end() >= restrict.start()
}

struct Frame<N> {
	node: N,
	range: TextRange,
	next_child: Option<N>,
	child_offset: usize,
	is_root: bool,
}

impl<N: Copy> Frame<N> {
	fn new<T>(tree: &T, node: N, range: TextRange, descend: bool, is_root: bool) -> Self
	where
		T: RangedTree<Node = N> + ?Sized,
	{
		Self {
			node,
			range,
			next_child: if descend { tree.first_child(node) } else { None },
			child_offset: range.start(),
			is_root,
		}
	}
}

/// Divides the subtree under `root` by `restrict` and `priority`.
///
/// Every visited non-root node overlapping `restrict` lands in `inside` when
/// `priority` contains it and in `outside` otherwise. The root itself is not
/// classified and is appended to `outside` last. Cancellation is polled once
/// per visited node.
pub fn divide<T>(
	tree: &T,
	root: T::Node,
	restrict: TextRange,
	priority: TextRange,
	filters: &[Box<dyn AdmissionFilter<T>>],
	cancel: &CancelToken,
) -> Result<Divided<T::Node>, Canceled>
where
	T: RangedTree + ?Sized,
{
	cancel.check()?;
	let mut divided = Divided::default();
	let root_range = tree.range(root);
	let mut stack = vec![Frame::new(tree, root, root_range, reaches(root_range, restrict), true)];
	let mut visited = 1usize;

	while let Some(top) = stack.last_mut() {
		match top.next_child.take() {
			Some(child) if top.child_offset <= restrict.end() => {
				top.next_child = tree.next_sibling(child);
				let start = top.child_offset;
				let range = TextRange::new(start, start + tree.range(child).len());
				top.child_offset = range.end();

				cancel.check()?;
				visited += 1;
				let verdict = admit(filters, tree, child);
				if verdict != Admission::Exclude {
					let descend = verdict == Admission::Descend && reaches(range, restrict);
					stack.push(Frame::new(tree, child, range, descend, false));
				}
			}
			_ => {
				let Some(frame) = stack.pop() else { break };
				if frame.is_root || !frame.range.overlaps(restrict) {
					continue;
				}
				if priority.contains_range(frame.range) {
					divided.inside.push((frame.node, frame.range));
				} else {
					divided.outside.push((frame.node, frame.range));
				}
			}
		}
	}

	divided.outside.push((root, root_range));
	tracing::trace!(
		%restrict,
		%priority,
		visited,
		inside = divided.inside.len(),
		outside = divided.outside.len(),
		"divider.divide"
	);
	Ok(divided)
}

/// [`divide`] over several roots, concatenating the results in root order.
pub fn divide_roots<T>(
	tree: &T,
	roots: impl IntoIterator<Item = T::Node>,
	restrict: TextRange,
	priority: TextRange,
	filters: &[Box<dyn AdmissionFilter<T>>],
	cancel: &CancelToken,
) -> Result<Divided<T::Node>, Canceled>
where
	T: RangedTree + ?Sized,
{
	let mut divided = Divided::default();
	for root in roots {
		divided.extend(divide(tree, root, restrict, priority, filters, cancel)?);
	}
	Ok(divided)
}
