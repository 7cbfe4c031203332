use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::token::CancelToken;

/// Outcome of a bounded latch wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
	/// The latch was opened.
	Opened,
	/// The cancel token fired first.
	Canceled,
	/// The deadline passed first.
	TimedOut,
}

/// One-shot gate that threads can wait on with a deadline.
///
/// Waits never block unbounded: the waiter wakes every `poll` interval to
/// observe cancellation and gives up at the deadline.
#[derive(Debug, Default)]
pub struct Latch {
	open: Mutex<bool>,
	cond: Condvar,
}

impl Latch {
	pub fn new() -> Self {
		Self::default()
	}

	/// Opens the latch, waking every waiter. Idempotent.
	pub fn open(&self) {
		let mut open = self.open.lock();
		if !*open {
			*open = true;
			self.cond.notify_all();
		}
	}

	pub fn is_open(&self) -> bool {
		*self.open.lock()
	}

	/// Waits until the latch opens, `cancel` fires, or `timeout` elapses.
	pub fn wait(&self, cancel: &CancelToken, poll: Duration, timeout: Duration) -> WaitOutcome {
		let deadline = Instant::now() + timeout;
		let mut open = self.open.lock();
		loop {
			if *open {
				return WaitOutcome::Opened;
			}
			if cancel.is_cancelled() {
				return WaitOutcome::Canceled;
			}
			let now = Instant::now();
			if now >= deadline {
				return WaitOutcome::TimedOut;
			}
			let slice = poll.min(deadline - now);
			self.cond.wait_for(&mut open, slice);
		}
	}
}
