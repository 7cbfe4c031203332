use std::thread::{Scope, ScopedJoinHandle};

/// Spawns a named worker thread inside `scope`, so the work may borrow from
/// the caller. Names show up in panic messages and profilers.
pub fn spawn_scoped<'scope, 'env, F, R>(
	scope: &'scope Scope<'scope, 'env>,
	name: impl Into<String>,
	f: F,
) -> std::io::Result<ScopedJoinHandle<'scope, R>>
where
	F: FnOnce() -> R + Send + 'scope,
	R: Send + 'scope,
{
	let name = name.into();
	tracing::trace!(thread = %name, "worker.spawn_scoped");
	std::thread::Builder::new().name(name).spawn_scoped(scope, f)
}
