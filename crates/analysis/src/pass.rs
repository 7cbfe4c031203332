//! Pass factories and the per-cycle pass interface.

use xeno_primitives::{Document, TextRange};
use xeno_worker::{CancelToken, Canceled};

use crate::annotation::Annotation;
use crate::dirty::DirtyScopeTracker;
use crate::error::{PassError, SessionError};
use crate::pass_id::PassId;
use crate::session::ResultSession;

/// What a factory sees when asked for a pass instance.
pub struct FactoryContext<'a> {
	pub document: &'a dyn Document,
	pub tracker: &'a DirtyScopeTracker,
	pub priority_range: TextRange,
	/// Id the factory was registered under.
	pub pass_id: PassId,
}

impl FactoryContext<'_> {
	/// Range this pass still has to analyze, `None` when up to date.
	pub fn dirty_range(&self) -> Option<TextRange> {
		self.tracker.get_dirty_range(self.document, self.pass_id)
	}
}

/// Produces one pass instance per analysis cycle.
pub trait PassFactory: Send + Sync {
	fn name(&self) -> &str;

	/// Returns `None` when there is nothing to do this cycle.
	///
	/// A declining factory is treated as up to date for the document.
	fn create_pass(&self, ctx: &FactoryContext<'_>) -> Option<Box<dyn AnalysisPass>>;
}

/// One analysis pass instantiated for one cycle.
pub trait AnalysisPass: Send {
	/// Computes results and publishes them through `ctx`.
	///
	/// Implementations poll [`PassContext::check_canceled`] at fine
	/// granularity.
	fn collect(&mut self, ctx: &PassContext<'_>) -> Result<(), PassError>;
}

/// Handle a running pass publishes through.
pub struct PassContext<'a> {
	id: PassId,
	session: &'a ResultSession,
	cancel: &'a CancelToken,
}

impl<'a> PassContext<'a> {
	pub fn new(id: PassId, session: &'a ResultSession, cancel: &'a CancelToken) -> Self {
		Self { id, session, cancel }
	}

	pub fn id(&self) -> PassId {
		self.id
	}

	pub fn session(&self) -> &'a ResultSession {
		self.session
	}

	pub fn cancel_token(&self) -> &'a CancelToken {
		self.cancel
	}

	pub fn priority_range(&self) -> TextRange {
		self.session.priority_range()
	}

	#[inline]
	pub fn check_canceled(&self) -> Result<(), Canceled> {
		self.cancel.check()
	}

	pub fn publish_inside(&self, results: &[Annotation], restrict: TextRange) -> Result<(), SessionError> {
		self.session
			.publish_inside(self.id, results, self.session.priority_range(), restrict)
	}

	pub fn publish_outside(&self, results: &[Annotation], restrict: TextRange) -> Result<(), SessionError> {
		self.session
			.publish_outside(self.id, results, restrict, self.session.priority_range())
	}

	pub fn publish_incremental(&self, result: &Annotation, restrict: TextRange) -> Result<(), SessionError> {
		self.session.publish_incremental(self.id, result, restrict)
	}

	pub fn range_fully_analyzed(&self, range: TextRange, fresh: &[Annotation]) -> Result<(), SessionError> {
		self.session.range_fully_analyzed(self.id, range, fresh)
	}
}

/// Factory backed by a closure.
pub struct FnFactory<F> {
	name: String,
	create: F,
}

impl<F> PassFactory for FnFactory<F>
where
	F: Fn(&FactoryContext<'_>) -> Option<Box<dyn AnalysisPass>> + Send + Sync,
{
	fn name(&self) -> &str {
		&self.name
	}

	fn create_pass(&self, ctx: &FactoryContext<'_>) -> Option<Box<dyn AnalysisPass>> {
		(self.create)(ctx)
	}
}

/// Wraps a closure as a boxed [`PassFactory`].
pub fn factory_fn<F>(name: impl Into<String>, create: F) -> Box<dyn PassFactory>
where
	F: Fn(&FactoryContext<'_>) -> Option<Box<dyn AnalysisPass>> + Send + Sync + 'static,
{
	Box::new(FnFactory {
		name: name.into(),
		create,
	})
}

/// Pass backed by a closure.
pub struct FnPass<F>(F);

impl<F> AnalysisPass for FnPass<F>
where
	F: FnMut(&PassContext<'_>) -> Result<(), PassError> + Send,
{
	fn collect(&mut self, ctx: &PassContext<'_>) -> Result<(), PassError> {
		(self.0)(ctx)
	}
}

/// Wraps a closure as a boxed [`AnalysisPass`].
pub fn pass_fn<F>(collect: F) -> Box<dyn AnalysisPass>
where
	F: FnMut(&PassContext<'_>) -> Result<(), PassError> + Send + 'static,
{
	Box::new(FnPass(collect))
}
