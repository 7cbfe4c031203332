//! Error types for pass registration, sessions, pass execution, and the driver.

use thiserror::Error;
use xeno_worker::Canceled;

use crate::pass_id::PassId;
use crate::session::PassPhase;

/// Boxed root cause attached to pass failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fatal configuration errors in the static pass graph.
///
/// These are detected once and are never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
	/// A pass is its own transitive predecessor.
	#[error("cyclic pass dependency: {name} ({id}) transitively depends on itself")]
	Cycle { id: PassId, name: String },
	/// Two factories claimed the same id.
	#[error("duplicate pass id {id}: existing={existing} new={new}")]
	DuplicatePassId { id: PassId, existing: String, new: String },
	/// Registration attempted after the first cycle was instantiated.
	#[error("pass registry is frozen; cannot register {name}")]
	RegistrationClosed { name: String },
}

/// Protocol violations against a [`crate::session::ResultSession`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
	#[error("{op} not allowed for {pass} in phase {phase:?}")]
	PhaseViolation {
		pass: PassId,
		phase: PassPhase,
		op: &'static str,
	},
}

/// Why a pass did not complete.
#[derive(Debug, Error)]
pub enum PassError {
	/// Canceled by a racing edit or an explicit stop; scope stays dirty.
	#[error("pass canceled")]
	Canceled,
	/// Canceled because of an unrelated failure; treated like a failure.
	#[error("pass canceled by failure: {0}")]
	CanceledBy(#[source] BoxError),
	/// The pass itself failed.
	#[error("pass failed: {0}")]
	Failed(#[source] BoxError),
}

impl PassError {
	pub fn failed(source: impl Into<BoxError>) -> Self {
		Self::Failed(source.into())
	}

	/// True for a plain cancellation without an attached root cause.
	pub fn is_bare_cancellation(&self) -> bool {
		matches!(self, Self::Canceled)
	}
}

impl From<Canceled> for PassError {
	fn from(_: Canceled) -> Self {
		Self::Canceled
	}
}

impl From<SessionError> for PassError {
	fn from(err: SessionError) -> Self {
		Self::Failed(Box::new(err))
	}
}

/// Errors surfaced by [`crate::daemon::AnalysisDaemon`].
#[derive(Debug, Error)]
pub enum DaemonError {
	#[error(transparent)]
	Graph(#[from] GraphError),
	/// A pass kept failing with a real root cause.
	#[error("{pass} failed {attempts} times in a row")]
	RetryBudgetExhausted {
		pass: PassId,
		attempts: u32,
		#[source]
		source: PassError,
	},
}

/// Errors from loading [`crate::config::AnalysisConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to parse analysis config: {0}")]
	Parse(#[from] toml::de::Error),
}
