use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Driver and executor tuning.
///
/// Every field has a default, so an empty TOML document is valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
	/// Consecutive real failures tolerated per (document, pass) before the
	/// driver surfaces the error instead of retrying.
	pub retry_budget: u32,
	/// Run passes on a pool of worker threads instead of sequentially.
	pub parallel: bool,
	/// Size of the worker pool in parallel mode; zero means one worker per
	/// available core.
	pub max_workers: usize,
	/// Wake-up interval for predecessor waits, in milliseconds.
	pub poll_interval_ms: u64,
	/// Upper bound for any single predecessor wait, in milliseconds.
	pub wait_timeout_ms: u64,
}

impl Default for AnalysisConfig {
	fn default() -> Self {
		Self {
			retry_budget: 3,
			parallel: true,
			max_workers: 0,
			poll_interval_ms: 5,
			wait_timeout_ms: 10_000,
		}
	}
}

impl AnalysisConfig {
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(source)?)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms.max(1))
	}

	pub fn wait_timeout(&self) -> Duration {
		Duration::from_millis(self.wait_timeout_ms)
	}

	/// Worker threads a parallel cycle may use; zero in sequential mode.
	pub fn workers(&self) -> usize {
		match (self.parallel, self.max_workers) {
			(false, _) => 0,
			(true, 0) => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
			(true, n) => n,
		}
	}

	/// Sequential configuration, handy for deterministic tests.
	pub fn sequential() -> Self {
		Self {
			parallel: false,
			..Self::default()
		}
	}
}
