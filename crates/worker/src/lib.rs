//! Worker primitives for analysis passes: cooperative cancellation, bounded
//! waits, named scoped worker threads, and a bounded ordered job pool.

mod latch;
mod pool;
mod spawn;
mod token;

pub use latch::{Latch, WaitOutcome};
pub use pool::run_ordered;
pub use spawn::spawn_scoped;
pub use token::{CancelToken, Canceled, GenerationClock};
