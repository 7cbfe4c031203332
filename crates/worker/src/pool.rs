use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;

use parking_lot::Mutex;

use crate::spawn::spawn_scoped;

/// Runs `jobs` on at most `workers` named scoped threads and returns their
/// results in job order.
///
/// Jobs are handed out strictly in order, so a job may block on anything an
/// earlier job does without starving the pool. A panicking job yields `Err`
/// with the panic payload and the worker moves on to the next job. With zero
/// workers, or when no thread can be spawned, the jobs run on the caller.
pub fn run_ordered<J, R, F>(name: &str, workers: usize, jobs: Vec<J>, run: F) -> Vec<thread::Result<R>>
where
	J: Send,
	R: Send,
	F: Fn(J) -> R + Sync,
{
	let total = jobs.len();
	let workers = workers.min(total);
	if workers == 0 {
		return jobs.into_iter().map(|job| catch_unwind(AssertUnwindSafe(|| run(job)))).collect();
	}

	let queue = Mutex::new(jobs.into_iter().enumerate());
	let results: Mutex<Vec<Option<thread::Result<R>>>> = Mutex::new((0..total).map(|_| None).collect());
	let drain = || {
		loop {
			let next = queue.lock().next();
			let Some((at, job)) = next else { break };
			let result = catch_unwind(AssertUnwindSafe(|| run(job)));
			results.lock()[at] = Some(result);
		}
	};

	thread::scope(|scope| {
		let spawned = (0..workers)
			.filter(|worker| match spawn_scoped(scope, format!("{name}-{worker}"), &drain) {
				Ok(_) => true,
				Err(err) => {
					tracing::warn!(pool = name, worker, error = %err, "worker.pool.spawn_failed");
					false
				}
			})
			.count();
		tracing::trace!(pool = name, spawned, jobs = total, "worker.pool.run");
		if spawned == 0 {
			drain();
		}
	});

	results
		.into_inner()
		.into_iter()
		.map(|result| result.unwrap_or_else(|| Err(Box::new("job was never run") as Box<dyn Any + Send>)))
		.collect()
}
