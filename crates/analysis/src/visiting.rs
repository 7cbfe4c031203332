//! Generic tree-walking pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use xeno_primitives::TextRange;

use crate::annotation::Annotation;
use crate::divider::{AdmissionFilter, divide_roots};
use crate::error::PassError;
use crate::pass::{AnalysisPass, PassContext};
use crate::tree::RangedTree;

/// Per-node analysis plugged into a [`VisitingPass`].
pub trait NodeAnalyzer<T: RangedTree + ?Sized>: Send {
	/// Appends the results for `node`, whose computed range is `range`.
	fn analyze(&mut self, tree: &T, node: T::Node, range: TextRange, out: &mut Vec<Annotation>) -> Result<(), PassError>;
}

impl<T, F> NodeAnalyzer<T> for F
where
	T: RangedTree + ?Sized,
	F: FnMut(&T, T::Node, TextRange, &mut Vec<Annotation>) -> Result<(), PassError> + Send,
{
	fn analyze(&mut self, tree: &T, node: T::Node, range: TextRange, out: &mut Vec<Annotation>) -> Result<(), PassError> {
		self(tree, node, range, out)
	}
}

/// Pass that divides a tree and runs a [`NodeAnalyzer`] over the pieces.
///
/// Priority nodes are analyzed and published first, the rest after. Once
/// both batches are out, every node range is reported fully analyzed so
/// results no longer produced for it are evicted.
pub struct VisitingPass<T: RangedTree + ?Sized, A> {
	tree: Arc<T>,
	roots: Vec<T::Node>,
	restrict: TextRange,
	filters: Vec<Box<dyn AdmissionFilter<T>>>,
	analyzer: A,
}

impl<T, A> VisitingPass<T, A>
where
	T: RangedTree + ?Sized,
	A: NodeAnalyzer<T>,
{
	pub fn new(tree: Arc<T>, roots: impl IntoIterator<Item = T::Node>, restrict: TextRange, analyzer: A) -> Self {
		Self {
			tree,
			roots: roots.into_iter().collect(),
			restrict,
			filters: Vec::new(),
			analyzer,
		}
	}

	pub fn with_filters(mut self, filters: Vec<Box<dyn AdmissionFilter<T>>>) -> Self {
		self.filters = filters;
		self
	}

	pub fn restrict_range(&self) -> TextRange {
		self.restrict
	}

	fn analyze_all(
		&mut self,
		ctx: &PassContext<'_>,
		nodes: &[(T::Node, TextRange)],
		by_range: &mut BTreeMap<TextRange, Vec<Annotation>>,
	) -> Result<Vec<Annotation>, PassError> {
		let mut batch = Vec::new();
		let mut scratch = Vec::new();
		for (node, range) in nodes {
			ctx.check_canceled()?;
			self.analyzer.analyze(&self.tree, *node, *range, &mut scratch)?;
			batch.extend(scratch.iter().cloned());
			by_range.entry(*range).or_default().append(&mut scratch);
		}
		Ok(batch)
	}
}

impl<T, A> AnalysisPass for VisitingPass<T, A>
where
	T: RangedTree + Send + Sync + ?Sized,
	T::Node: Send,
	A: NodeAnalyzer<T>,
{
	fn collect(&mut self, ctx: &PassContext<'_>) -> Result<(), PassError> {
		let divided = divide_roots(
			&*self.tree,
			self.roots.iter().copied(),
			self.restrict,
			ctx.priority_range(),
			&self.filters,
			ctx.cancel_token(),
		)?;

		let mut by_range = BTreeMap::new();
		let inside = self.analyze_all(ctx, &divided.inside, &mut by_range)?;
		ctx.publish_inside(&inside, self.restrict)?;
		let outside = self.analyze_all(ctx, &divided.outside, &mut by_range)?;
		ctx.publish_outside(&outside, self.restrict)?;

		for (range, results) in &by_range {
			ctx.range_fully_analyzed(*range, results)?;
		}
		tracing::trace!(
			pass = %ctx.id(),
			restrict = %self.restrict,
			inside = inside.len(),
			outside = outside.len(),
			ranges = by_range.len(),
			"visiting.collect"
		);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use xeno_primitives::{DocumentId, TextDocument};
	use xeno_worker::CancelToken;

	use super::*;
	use crate::divider::Admission;
	use crate::pass_id::PassId;
	use crate::session::{PassPhase, ResultSession};
	use crate::tree::{ArenaTree, NodeId};

	const PASS: PassId = PassId(30);

	fn tree() -> Arc<ArenaTree> {
		Arc::new(
			ArenaTree::builder()
				.open("file", 0..100)
				.leaf("ident", 0..10)
				.leaf("ident", 10..20)
				.leaf("comment", 20..100)
				.close()
				.build(),
		)
	}

	/// Tags every node whose kind starts with `prefix`.
	fn tagger(prefix: &'static str) -> impl NodeAnalyzer<ArenaTree> {
		move |tree: &ArenaTree, node: NodeId, range: TextRange, out: &mut Vec<Annotation>| -> Result<(), PassError> {
			if tree.kind(node).starts_with(prefix) {
				out.push(Annotation::info(range, tree.kind(node)));
			}
			Ok(())
		}
	}

	fn session(priority: TextRange) -> ResultSession {
		let doc = TextDocument::new(DocumentId(1), &"x".repeat(100));
		ResultSession::new(&doc, priority, CancelToken::detached())
	}

	fn run(pass: &mut dyn AnalysisPass, session: &ResultSession) -> Result<(), PassError> {
		let cancel = session.cancel_token().clone();
		pass.collect(&PassContext::new(PASS, session, &cancel))
	}

	#[test]
	fn publishes_inside_then_outside() {
		let tree = tree();
		let root = tree.root().unwrap();
		let session = session(TextRange::new(0, 20));
		let mut pass = VisitingPass::new(tree, [root], TextRange::whole(100), tagger("i"));

		run(&mut pass, &session).unwrap();
		assert_eq!(session.phase(PASS), PassPhase::CollectingOutside);
		assert_eq!(
			session.markup().annotations_for(PASS),
			vec![
				Annotation::info(TextRange::new(0, 10), "ident"),
				Annotation::info(TextRange::new(10, 20), "ident"),
			]
		);
	}

	#[test]
	fn rerun_evicts_results_of_reanalyzed_nodes() {
		let tree = tree();
		let root = tree.root().unwrap();
		let first = session(TextRange::new(0, 20));
		run(&mut VisitingPass::new(tree.clone(), [root], TextRange::whole(100), tagger("")), &first).unwrap();
		assert_eq!(first.markup().len(), 4);

		let second = session(TextRange::new(0, 20)).with_markup(first.into_markup());
		run(&mut VisitingPass::new(tree, [root], TextRange::new(0, 20), tagger("c")), &second).unwrap();

		let kinds: Vec<_> = second
			.markup()
			.annotations_for(PASS)
			.into_iter()
			.map(|a| a.tag.to_string())
			.collect();
		assert_eq!(kinds, vec!["comment"]);
	}

	#[test]
	fn filters_reach_the_divider() {
		struct NoComments;
		impl AdmissionFilter<ArenaTree> for NoComments {
			fn admit(&self, tree: &ArenaTree, node: NodeId) -> Admission {
				if tree.kind(node) == "comment" {
					Admission::Exclude
				} else {
					Admission::Descend
				}
			}
		}

		let tree = tree();
		let root = tree.root().unwrap();
		let session = session(TextRange::whole(100));
		let mut pass = VisitingPass::new(tree, [root], TextRange::whole(100), tagger("c"))
			.with_filters(vec![Box::new(NoComments)]);
		run(&mut pass, &session).unwrap();
		assert!(session.markup().is_empty());
	}

	#[test]
	fn cancellation_stops_before_publishing() {
		let tree = tree();
		let root = tree.root().unwrap();
		let session = session(TextRange::whole(100));
		session.cancel_token().cancel();

		let result = run(&mut VisitingPass::new(tree, [root], TextRange::whole(100), tagger("")), &session);
		assert!(matches!(result, Err(PassError::Canceled)));
		assert_eq!(session.phase(PASS), PassPhase::Created);
	}

	#[test]
	fn analyzer_failure_propagates() {
		let tree = tree();
		let root = tree.root().unwrap();
		let session = session(TextRange::whole(100));
		let failing = |_: &ArenaTree, _: NodeId, _: TextRange, _: &mut Vec<Annotation>| -> Result<(), PassError> {
			Err(PassError::failed("parser crashed"))
		};
		let result = run(&mut VisitingPass::new(tree, [root], TextRange::whole(100), failing), &session);
		assert!(matches!(result, Err(PassError::Failed(_))));
	}
}
