use std::sync::Arc;

use xeno_primitives::TextRange;

/// Severity of an analysis result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
	/// Plain highlighting (syntax colors, symbol kinds).
	Info,
	WeakWarning,
	Warning,
	Error,
}

/// One result produced by a pass: a severity and a tag over a text range.
///
/// Equality is structural; sessions use it to decide whether a previously
/// published result is still produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Annotation {
	pub range: TextRange,
	pub severity: Severity,
	/// Highlight key or diagnostic message.
	pub tag: Arc<str>,
}

impl Annotation {
	pub fn new(range: TextRange, severity: Severity, tag: impl Into<Arc<str>>) -> Self {
		Self {
			range,
			severity,
			tag: tag.into(),
		}
	}

	pub fn info(range: TextRange, tag: impl Into<Arc<str>>) -> Self {
		Self::new(range, Severity::Info, tag)
	}

	pub fn error(range: TextRange, tag: impl Into<Arc<str>>) -> Self {
		Self::new(range, Severity::Error, tag)
	}
}
