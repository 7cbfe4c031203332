use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rustc_hash::FxHashSet;
use xeno_primitives::TextRange;
use xeno_worker::CancelToken;

use super::{Admission, AdmissionFilter, Divided, divide, divide_roots};
use crate::tree::{ArenaTree, NodeId, RangedTree};

type Filters = Vec<Box<dyn AdmissionFilter<ArenaTree>>>;

struct Counting(Arc<AtomicUsize>);

impl AdmissionFilter<ArenaTree> for Counting {
	fn admit(&self, _: &ArenaTree, _: NodeId) -> Admission {
		self.0.fetch_add(1, Ordering::Relaxed);
		Admission::Descend
	}
}

struct ByKind(&'static str, Admission);

impl AdmissionFilter<ArenaTree> for ByKind {
	fn admit(&self, tree: &ArenaTree, node: NodeId) -> Admission {
		if tree.kind(node) == self.0 { self.1 } else { Admission::Descend }
	}
}

fn counting() -> (Filters, Arc<AtomicUsize>) {
	let count = Arc::new(AtomicUsize::new(0));
	(vec![Box::new(Counting(count.clone()))], count)
}

fn kinds(tree: &ArenaTree, nodes: &[(NodeId, TextRange)]) -> Vec<String> {
	nodes
		.iter()
		.map(|(node, range)| format!("{} {range}", tree.kind(*node)))
		.collect()
}

/// file [0,100) { fn [0,40) { a, b }, fn2 [40,100) { c, d } }
fn sample() -> ArenaTree {
	ArenaTree::builder()
		.open("file", 0..100)
		.open("fn", 0..40)
		.leaf("a", 0..10)
		.leaf("b", 10..40)
		.close()
		.open("fn2", 40..100)
		.leaf("c", 40..50)
		.leaf("d", 50..100)
		.close()
		.close()
		.build()
}

fn run(tree: &ArenaTree, restrict: TextRange, priority: TextRange, filters: &Filters) -> Divided<NodeId> {
	let root = tree.root().unwrap();
	divide(tree, root, restrict, priority, filters, &CancelToken::detached()).unwrap()
}

#[test]
fn splits_by_priority_in_post_order() {
	let tree = sample();
	let divided = run(&tree, TextRange::whole(100), TextRange::new(0, 40), &Vec::new());

	assert_eq!(kinds(&tree, &divided.inside), vec!["a [0, 10)", "b [10, 40)", "fn [0, 40)"]);
	assert_eq!(
		kinds(&tree, &divided.outside),
		vec!["c [40, 50)", "d [50, 100)", "fn2 [40, 100)", "file [0, 100)"]
	);
}

#[test]
fn partially_covered_nodes_go_outside() {
	let tree = sample();
	let divided = run(&tree, TextRange::whole(100), TextRange::new(5, 50), &Vec::new());
	assert_eq!(kinds(&tree, &divided.inside), vec!["b [10, 40)", "c [40, 50)"]);
	assert_eq!(divided.outside.len(), 5);
}

#[test]
fn root_is_only_a_sentinel() {
	let tree = sample();
	let divided = run(&tree, TextRange::new(200, 300), TextRange::whole(100), &Vec::new());
	assert!(divided.inside.is_empty());
	assert_eq!(kinds(&tree, &divided.outside), vec!["file [0, 100)"]);

	let whole = run(&tree, TextRange::whole(100), TextRange::whole(100), &Vec::new());
	assert_eq!(whole.inside.len(), 6);
	assert_eq!(kinds(&tree, &whole.outside), vec!["file [0, 100)"]);
}

#[test]
fn sibling_iteration_stops_past_restrict_end() {
	let mut builder = ArenaTree::builder();
	builder.open("file", 0..100);
	for i in 0..10usize {
		builder.leaf("leaf", i * 10..i * 10 + 10);
	}
	let tree = builder.close().build();
	let (filters, count) = counting();

	let divided = run(&tree, TextRange::new(0, 10), TextRange::whole(100), &filters);
	assert_eq!(kinds(&tree, &divided.inside), vec!["leaf [0, 10)"]);
	assert_eq!(count.load(Ordering::Relaxed), 2);
}

#[test]
fn subtrees_before_restrict_are_not_descended() {
	let tree = ArenaTree::builder()
		.open("file", 0..100)
		.open("head", 0..50)
		.leaf("x", 0..10)
		.leaf("y", 10..50)
		.close()
		.open("tail", 50..100)
		.leaf("z", 50..100)
		.close()
		.close()
		.build();
	let (filters, count) = counting();

	let divided = run(&tree, TextRange::new(60, 100), TextRange::whole(100), &filters);
	assert_eq!(kinds(&tree, &divided.inside), vec!["z [50, 100)", "tail [50, 100)"]);
	assert_eq!(count.load(Ordering::Relaxed), 3);
}

#[test]
fn empty_child_at_restrict_start_is_classified() {
	let tree = ArenaTree::builder()
		.open("file", 0..20)
		.open("block", 0..10)
		.leaf("ident", 0..10)
		.leaf("err", 10..10)
		.close()
		.leaf("tail", 10..20)
		.close()
		.build();

	let divided = run(&tree, TextRange::new(10, 20), TextRange::whole(20), &Vec::new());
	assert_eq!(kinds(&tree, &divided.inside), vec!["err [10, 10)", "tail [10, 20)"]);
	assert_eq!(kinds(&tree, &divided.outside), vec!["file [0, 20)"]);

	let empty = run(&tree, TextRange::empty(10), TextRange::whole(20), &Vec::new());
	assert_eq!(kinds(&tree, &empty.inside), vec!["err [10, 10)", "tail [10, 20)"]);
}

#[test]
fn offsets_follow_sibling_order_not_reported_starts() {
	// Middle sibling reports a bogus start far past the restrict range.
	let tree = ArenaTree::builder()
		.open("file", 0..100)
		.leaf("a", 0..10)
		.leaf("bogus", 500..510)
		.leaf("c", 20..30)
		.close()
		.build();

	let divided = run(&tree, TextRange::new(0, 40), TextRange::new(0, 40), &Vec::new());
	assert_eq!(
		kinds(&tree, &divided.inside),
		vec!["a [0, 10)", "bogus [10, 20)", "c [20, 30)"]
	);
}

#[test]
fn filters_chain_and_first_restriction_wins() {
	let tree = sample();
	let filters: Filters = vec![
		Box::new(ByKind("fn", Admission::SkipChildren)),
		Box::new(ByKind("fn", Admission::Exclude)),
		Box::new(ByKind("fn2", Admission::Exclude)),
	];

	let divided = run(&tree, TextRange::whole(100), TextRange::whole(100), &filters);
	assert_eq!(kinds(&tree, &divided.inside), vec!["fn [0, 40)"]);
	assert_eq!(kinds(&tree, &divided.outside), vec!["file [0, 100)"]);
}

#[test]
fn canceled_token_aborts_division() {
	let tree = sample();
	let cancel = CancelToken::detached();
	cancel.cancel();
	let result = divide(
		&tree,
		tree.root().unwrap(),
		TextRange::whole(100),
		TextRange::whole(100),
		&Vec::new(),
		&cancel,
	);
	assert!(result.is_err());
}

#[test]
fn multiple_roots_are_concatenated() {
	let tree = ArenaTree::builder()
		.open("first", 0..10)
		.leaf("a", 0..10)
		.close()
		.open("second", 10..20)
		.leaf("b", 10..20)
		.close()
		.build();

	let divided = divide_roots(
		&tree,
		tree.roots().iter().copied(),
		TextRange::whole(20),
		TextRange::new(0, 10),
		&Vec::new(),
		&CancelToken::detached(),
	)
	.unwrap();
	assert_eq!(kinds(&tree, &divided.inside), vec!["a [0, 10)"]);
	assert_eq!(
		kinds(&tree, &divided.outside),
		vec!["first [0, 10)", "b [10, 20)", "second [10, 20)"]
	);
}

/// Two-level tree: `groups[i]` lists the leaf lengths under the i-th child.
fn grouped_tree(groups: &[Vec<usize>]) -> (ArenaTree, usize) {
	let total: usize = groups.iter().flatten().sum();
	let mut builder = ArenaTree::builder();
	builder.open("file", 0..total);
	let mut offset = 0;
	for group in groups {
		let len: usize = group.iter().sum();
		builder.open("group", offset..offset + len);
		for leaf in group {
			builder.leaf("leaf", offset..offset + leaf);
			offset += leaf;
		}
		builder.close();
	}
	(builder.close().build(), total)
}

proptest! {
	#[test]
	fn division_is_complete_and_disjoint(
		groups in prop::collection::vec(prop::collection::vec(0usize..20, 1..5), 1..6),
		restrict in (0usize..=400, 0usize..=400),
		priority in (0usize..=400, 0usize..=400),
	) {
		let (tree, total) = grouped_tree(&groups);
		let restrict = TextRange::new(restrict.0, restrict.1).clamp(total);
		let priority = TextRange::new(priority.0, priority.1).clamp(total);
		let root = tree.root().unwrap();
		let divided = run(&tree, restrict, priority, &Vec::new());

		prop_assert_eq!(divided.outside.last().copied(), Some((root, tree.range(root))));
		let classified: Vec<_> = divided
			.inside
			.iter()
			.chain(&divided.outside[..divided.outside.len() - 1])
			.copied()
			.collect();
		let unique: FxHashSet<_> = classified.iter().map(|(node, _)| *node).collect();
		prop_assert_eq!(unique.len(), classified.len());

		let expected: FxHashSet<_> = tree
			.nodes()
			.filter(|node| *node != root && tree.range(*node).overlaps(restrict))
			.collect();
		prop_assert_eq!(unique, expected);

		for (node, range) in &divided.inside {
			prop_assert_eq!(*range, tree.range(*node));
			prop_assert!(priority.contains_range(*range));
		}
		for (_, range) in &divided.outside[..divided.outside.len() - 1] {
			prop_assert!(!priority.contains_range(*range));
		}
	}
}
