//! Ranged tree abstraction walked by the divider.

use std::sync::Arc;

use xeno_primitives::TextRange;

/// A tree whose nodes cover text ranges, children left to right.
///
/// Node handles are cheap copies. Reported ranges are trusted for their
/// length only; the divider derives offsets from sibling order.
pub trait RangedTree {
	type Node: Copy + Eq + std::fmt::Debug;

	fn range(&self, node: Self::Node) -> TextRange;

	fn first_child(&self, node: Self::Node) -> Option<Self::Node>;

	fn next_sibling(&self, node: Self::Node) -> Option<Self::Node>;
}

/// Handle into an [`ArenaTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
	pub fn index(self) -> usize {
		self.0 as usize
	}
}

#[derive(Debug, Clone)]
struct ArenaNode {
	range: TextRange,
	kind: Arc<str>,
	first_child: Option<NodeId>,
	next_sibling: Option<NodeId>,
}

/// Arena-backed [`RangedTree`] for hosts without their own syntax tree.
#[derive(Debug, Clone, Default)]
pub struct ArenaTree {
	nodes: Vec<ArenaNode>,
	roots: Vec<NodeId>,
}

impl ArenaTree {
	pub fn builder() -> ArenaTreeBuilder {
		ArenaTreeBuilder::default()
	}

	/// Top-level nodes in insertion order.
	pub fn roots(&self) -> &[NodeId] {
		&self.roots
	}

	pub fn root(&self) -> Option<NodeId> {
		self.roots.first().copied()
	}

	pub fn kind(&self, node: NodeId) -> &str {
		&self.nodes[node.index()].kind
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Every node in creation (pre-)order.
	pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
		(0..self.nodes.len() as u32).map(NodeId)
	}
}

impl RangedTree for ArenaTree {
	type Node = NodeId;

	fn range(&self, node: NodeId) -> TextRange {
		self.nodes[node.index()].range
	}

	fn first_child(&self, node: NodeId) -> Option<NodeId> {
		self.nodes[node.index()].first_child
	}

	fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
		self.nodes[node.index()].next_sibling
	}
}

#[derive(Debug, Default)]
struct OpenNode {
	id: Option<NodeId>,
	last_child: Option<NodeId>,
}

/// Builds an [`ArenaTree`] from nested `open`/`leaf`/`close` calls.
#[derive(Debug)]
pub struct ArenaTreeBuilder {
	tree: ArenaTree,
	/// First entry is the virtual top level holding the roots.
	stack: Vec<OpenNode>,
}

impl Default for ArenaTreeBuilder {
	fn default() -> Self {
		Self {
			tree: ArenaTree::default(),
			stack: vec![OpenNode::default()],
		}
	}
}

impl ArenaTreeBuilder {
	/// Starts an inner node; children follow until [`Self::close`].
	pub fn open(&mut self, kind: impl Into<Arc<str>>, range: impl Into<TextRange>) -> &mut Self {
		let id = self.push(kind.into(), range.into());
		self.stack.push(OpenNode {
			id: Some(id),
			last_child: None,
		});
		self
	}

	pub fn leaf(&mut self, kind: impl Into<Arc<str>>, range: impl Into<TextRange>) -> &mut Self {
		self.push(kind.into(), range.into());
		self
	}

	/// Ends the innermost open node.
	///
	/// # Panics
	///
	/// Panics without a matching [`Self::open`].
	pub fn close(&mut self) -> &mut Self {
		assert!(self.stack.len() > 1, "close without a matching open");
		self.stack.pop();
		self
	}

	/// Finishes the tree, closing any nodes still open.
	pub fn build(&mut self) -> ArenaTree {
		self.stack.truncate(1);
		self.stack[0] = OpenNode::default();
		std::mem::take(&mut self.tree)
	}

	fn push(&mut self, kind: Arc<str>, range: TextRange) -> NodeId {
		let id = NodeId(self.tree.nodes.len() as u32);
		self.tree.nodes.push(ArenaNode {
			range,
			kind,
			first_child: None,
			next_sibling: None,
		});

		let depth = self.stack.len() - 1;
		let parent = &mut self.stack[depth];
		match (parent.last_child, parent.id) {
			(Some(prev), _) => self.tree.nodes[prev.index()].next_sibling = Some(id),
			(None, Some(parent_id)) => self.tree.nodes[parent_id.index()].first_child = Some(id),
			(None, None) => {}
		}
		parent.last_child = Some(id);
		if depth == 0 {
			self.tree.roots.push(id);
		}
		id
	}
}
