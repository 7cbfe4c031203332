#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Incremental analysis scheduling.
//!
//! Passes register with a [`PassRegistrar`] together with their ordering
//! constraints. Each cycle the registrar asks every factory for a pass
//! instance, the [`Executor`] runs the surviving passes in dependency order,
//! and results flow into a [`ResultSession`]. A [`DirtyScopeTracker`] records
//! which text each pass still has to re-analyze, so only changed regions are
//! revisited after an edit. [`AnalysisDaemon`] ties the pieces together.

/// Results produced by passes.
pub mod annotation;
/// TOML-backed tuning.
pub mod config;
/// Reference driver: edits, cancellation, retries, and cycle bookkeeping.
pub mod daemon;
/// Per-document, per-pass dirty scopes.
pub mod dirty;
/// Viewport-priority partitioning of a ranged tree.
pub mod divider;
pub mod error;
/// Dependency-aware execution of one cycle.
pub mod executor;
/// Pass factories and the pass interface.
pub mod pass;
/// Pass identifiers and the reserved id table.
pub mod pass_id;
/// Pass registration and per-cycle instantiation.
pub mod registrar;
/// Per-cycle result sessions and markup.
pub mod session;
/// Ranged trees the divider walks.
pub mod tree;
/// Tree-walking pass built on the divider.
pub mod visiting;

pub use annotation::{Annotation, Severity};
pub use config::AnalysisConfig;
pub use daemon::{AnalysisDaemon, CycleReport};
pub use dirty::{DirtVersion, DirtyScopeTracker};
pub use divider::{Admission, AdmissionFilter, Divided, divide, divide_roots};
pub use error::{ConfigError, DaemonError, GraphError, PassError, SessionError};
pub use executor::{Executor, NodeOutcome};
pub use pass::{AnalysisPass, FactoryContext, FnFactory, FnPass, PassContext, PassFactory, factory_fn, pass_fn};
pub use pass_id::PassId;
pub use registrar::{CyclePlan, CycleRequest, PassNode, PassRegistrar, Predecessors};
pub use session::{Markup, PassPhase, ResultSession, SessionListener};
pub use tree::{ArenaTree, ArenaTreeBuilder, NodeId, RangedTree};
pub use visiting::{NodeAnalyzer, VisitingPass};
