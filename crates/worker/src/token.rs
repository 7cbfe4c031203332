use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Returned by [`CancelToken::check`] once cancellation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("canceled (generation {generation})")]
pub struct Canceled {
	pub generation: u64,
}

/// Monotonic generation clock for analysis cycles.
#[derive(Debug, Default, Clone)]
pub struct GenerationClock {
	next: Arc<AtomicU64>,
}

impl GenerationClock {
	/// Creates a new generation clock starting at generation 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next generation ID.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}

	/// Mints a fresh token in the next generation.
	pub fn token(&self) -> CancelToken {
		CancelToken::new(self.next(), CancellationToken::new())
	}
}

/// Generation-scoped cooperative cancellation token.
///
/// Long-running work polls [`Self::check`] at fine granularity and abandons
/// in-progress work once it returns [`Canceled`].
#[derive(Debug, Clone)]
pub struct CancelToken {
	generation: u64,
	cancel: CancellationToken,
}

impl CancelToken {
	pub fn new(generation: u64, cancel: CancellationToken) -> Self {
		Self { generation, cancel }
	}

	/// A token that is never canceled unless [`Self::cancel`] is called on it.
	pub fn detached() -> Self {
		Self::new(0, CancellationToken::new())
	}

	pub const fn generation(&self) -> u64 {
		self.generation
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Requests cancellation of this token and all its children.
	pub fn cancel(&self) {
		if !self.cancel.is_cancelled() {
			tracing::trace!(generation = self.generation, "worker.token.cancel");
		}
		self.cancel.cancel();
	}

	/// Returns `Err(Canceled)` once cancellation was requested.
	#[inline]
	pub fn check(&self) -> Result<(), Canceled> {
		if self.cancel.is_cancelled() {
			Err(Canceled { generation: self.generation })
		} else {
			Ok(())
		}
	}

	/// Creates a child token in the same generation.
	///
	/// Canceling the parent cancels the child, not the other way around.
	pub fn child(&self) -> Self {
		Self {
			generation: self.generation,
			cancel: self.cancel.child_token(),
		}
	}
}
