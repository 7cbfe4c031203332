#![allow(unused_crate_dependencies)]
//! End-to-end cycles through the daemon: dependency order, priority-first
//! delivery, and edits racing a running cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use xeno_analysis::{
	AnalysisConfig, AnalysisDaemon, AnalysisPass, Annotation, ArenaTree, NodeId, NodeOutcome, PassContext, PassError, PassId,
	PassRegistrar, SessionListener, VisitingPass, factory_fn, pass_fn,
};
use xeno_primitives::{Document, DocumentId, TextDocument, TextRange};
use xeno_worker::{CancelToken, Latch, WaitOutcome};

fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct Recorder(Log);

impl SessionListener for Recorder {
	fn inside_published(&self, pass: PassId, results: &[Annotation], _: TextRange, _: TextRange) {
		self.0.lock().push(format!("inside {pass} {}", results.len()));
	}

	fn outside_published(&self, pass: PassId, results: &[Annotation], _: TextRange, _: TextRange) {
		self.0.lock().push(format!("outside {pass} {}", results.len()));
	}

	fn incremental_published(&self, pass: PassId, result: &Annotation, _: TextRange) {
		self.0.lock().push(format!("incremental {pass} {}", result.tag));
	}

	fn applied(&self, pass: PassId) {
		self.0.lock().push(format!("applied {pass}"));
	}
}

/// Ten blocks of 100 chars, each opening with a 10-char identifier.
fn blocks() -> Arc<ArenaTree> {
	let mut builder = ArenaTree::builder();
	builder.open("file", 0..1000);
	for at in (0..1000usize).step_by(100) {
		builder.open("block", at..at + 100).leaf("ident", at..at + 10).close();
	}
	Arc::new(builder.close().build())
}

fn idents(tree: &ArenaTree, node: NodeId, range: TextRange, out: &mut Vec<Annotation>) -> Result<(), PassError> {
	if tree.kind(node) == "ident" {
		out.push(Annotation::info(range, "ident"));
	}
	Ok(())
}

/// Highlighter over `blocks()`, restricted to the dirty range.
fn register_highlighter(
	registrar: &mut PassRegistrar,
	name: &'static str,
	tree: &Arc<ArenaTree>,
	completion: &[PassId],
) -> PassId {
	let tree = tree.clone();
	registrar
		.register(
			factory_fn(name, move |ctx| {
				let dirty = ctx.dirty_range()?;
				let root = tree.root()?;
				let pass: Box<dyn AnalysisPass> = Box::new(VisitingPass::new(tree.clone(), [root], dirty, idents));
				Some(pass)
			}),
			completion,
			&[],
			None,
		)
		.unwrap()
}

/// Pass that records its dirty range on every run.
fn register_recording(
	registrar: &mut PassRegistrar,
	name: &'static str,
	seen: &Log,
	completion: &[PassId],
	starting: &[PassId],
) -> PassId {
	let seen = seen.clone();
	registrar
		.register(
			factory_fn(name, move |ctx| {
				let dirty = ctx.dirty_range()?;
				let seen = seen.clone();
				Some(pass_fn(move |ctx: &PassContext<'_>| {
					ctx.check_canceled()?;
					seen.lock().push(format!("{name} {dirty}"));
					ctx.publish_incremental(&Annotation::info(dirty, name), dirty)?;
					Ok(())
				}))
			}),
			completion,
			starting,
			None,
		)
		.unwrap()
}

fn doc() -> TextDocument {
	TextDocument::new(DocumentId(1), &"x".repeat(1000))
}

#[test]
fn full_cycle_delivers_priority_results_first_and_cleans_every_pass() {
	init_tracing();
	let tree = blocks();
	let mut registrar = PassRegistrar::new();
	let a = register_highlighter(&mut registrar, "a", &tree, &[]);
	let b = register_highlighter(&mut registrar, "b", &tree, &[a]);
	let c = register_highlighter(&mut registrar, "c", &tree, &[b]);
	let daemon = AnalysisDaemon::new(registrar, AnalysisConfig::sequential());
	let doc = doc();

	let recorder = Arc::new(Recorder::default());
	let session = daemon
		.begin_session(&doc, TextRange::new(100, 200))
		.with_listener(recorder.clone());
	let report = daemon.run_cycle(&doc, &session, &[]).unwrap();

	assert_eq!(report.ran(), vec![a, b, c]);
	assert_eq!(report.completed(), vec![a, b, c]);
	assert_eq!(
		*recorder.0.lock(),
		vec![
			"inside pass#16 1",
			"outside pass#16 9",
			"applied pass#16",
			"inside pass#17 1",
			"outside pass#17 9",
			"applied pass#17",
			"inside pass#18 1",
			"outside pass#18 9",
			"applied pass#18",
		]
	);
	assert!(daemon.is_all_analysis_finished(&doc));
	for id in [a, b, c] {
		assert_eq!(session.markup().annotations_for(id).len(), 10);
		assert_eq!(daemon.tracker().get_dirty_range(&doc, id), None);
	}

	let idle = daemon.run_cycle(&doc, &daemon.begin_session(&doc, TextRange::new(100, 200)), &[]).unwrap();
	assert!(idle.ran().is_empty());
	assert_eq!(idle.declined, vec![a, b, c]);
}

#[test]
fn edit_during_a_cycle_keeps_its_scopes_for_the_next_one() {
	init_tracing();
	let seen = Log::default();
	let blocking = Arc::new(AtomicBool::new(false));
	let b_started = Arc::new(Latch::new());

	let mut registrar = PassRegistrar::new();
	let a = register_recording(&mut registrar, "a", &seen, &[], &[]);
	let b = {
		let (seen, blocking, b_started) = (seen.clone(), blocking.clone(), b_started.clone());
		registrar
			.register(
				factory_fn("b", move |ctx| {
					let dirty = ctx.dirty_range()?;
					let (seen, blocking, b_started) = (seen.clone(), blocking.clone(), b_started.clone());
					Some(pass_fn(move |ctx: &PassContext<'_>| {
						seen.lock().push(format!("b {dirty}"));
						if blocking.load(Ordering::Acquire) {
							b_started.open();
							let deadline = Instant::now() + Duration::from_secs(5);
							while Instant::now() < deadline {
								ctx.check_canceled()?;
								std::thread::sleep(Duration::from_millis(1));
							}
							return Err(PassError::failed("never canceled"));
						}
						Ok(())
					}))
				}),
				&[a],
				&[],
				None,
			)
			.unwrap()
	};
	let c = register_recording(&mut registrar, "c", &seen, &[b], &[]);
	let daemon = AnalysisDaemon::new(registrar, AnalysisConfig::sequential());
	let mut doc = doc();

	daemon.run_cycle(&doc, &daemon.begin_session(&doc, TextRange::whole(1000)), &[]).unwrap();
	assert!(daemon.is_all_analysis_finished(&doc));
	seen.lock().clear();

	let edit = doc.insert(100, "abcd").unwrap();
	daemon.document_changed(&doc, &edit);
	blocking.store(true, Ordering::Release);

	let session = daemon.begin_session(&doc, TextRange::new(0, 200));
	let report = std::thread::scope(|scope| {
		let cycle = scope.spawn(|| daemon.run_cycle(&doc, &session, &[]));
		assert_eq!(
			b_started.wait(&CancelToken::detached(), Duration::from_millis(1), Duration::from_secs(5)),
			WaitOutcome::Opened
		);
		assert!(daemon.cancel(doc.id()));
		cycle.join().unwrap()
	})
	.unwrap();

	assert!(report.canceled);
	assert!(!report.is_committed());
	assert!(report.marked_up_to_date.is_empty());
	assert!(matches!(report.outcome(b), Some(NodeOutcome::Canceled)));
	for id in [a, b, c] {
		assert_eq!(daemon.tracker().get_dirty_range(&doc, id), Some(TextRange::new(99, 105)));
	}
	assert!(!daemon.is_running(doc.id()));

	blocking.store(false, Ordering::Release);
	let edit = doc.insert(600, "xy").unwrap();
	daemon.document_changed(&doc, &edit);
	seen.lock().clear();

	let report = daemon.run_cycle(&doc, &daemon.begin_session(&doc, TextRange::new(0, 200)), &[]).unwrap();
	assert_eq!(report.completed(), vec![a, b, c]);
	assert_eq!(*seen.lock(), vec!["a [99, 603)", "b [99, 603)", "c [99, 603)"]);
	assert!(daemon.is_all_analysis_finished(&doc));
}

#[test]
fn parallel_cycle_from_toml_config() {
	init_tracing();
	let config = AnalysisConfig::from_toml_str("parallel = true\nmax_workers = 4\npoll_interval_ms = 1\nwait_timeout_ms = 5000\n").unwrap();
	assert!(config.parallel);

	let tree = blocks();
	let seen = Log::default();
	let mut registrar = PassRegistrar::new();
	let a = register_highlighter(&mut registrar, "highlight", &tree, &[]);
	let b = register_recording(&mut registrar, "b", &seen, &[a], &[]);
	let c = register_recording(&mut registrar, "c", &seen, &[], &[a]);
	let d = register_recording(&mut registrar, "d", &seen, &[b, c], &[]);
	let daemon = AnalysisDaemon::new(registrar, config);
	let doc = doc();

	let recorder = Arc::new(Recorder::default());
	let session = daemon
		.begin_session(&doc, TextRange::new(100, 200))
		.with_listener(recorder.clone());
	let report = daemon.run_cycle(&doc, &session, &[]).unwrap();
	assert_eq!(report.completed().len(), 4);

	let log = recorder.0.lock();
	let position = |event: String| log.iter().position(|e| *e == event).unwrap();
	assert!(position(format!("applied {a}")) < position(format!("applied {b}")));
	assert!(position(format!("applied {b}")) < position(format!("applied {d}")));
	assert!(position(format!("applied {c}")) < position(format!("applied {d}")));
	assert!(position(format!("inside {a} 1")) < position(format!("outside {a} 9")));
	drop(log);

	assert!(daemon.is_all_analysis_finished(&doc));
	assert_eq!(session.markup().len(), 13);
}
