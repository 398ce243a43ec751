//! Optional observability helpers for credential sessions.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `regcred.stage` with the `stage` field
//!   (`fetch`, `login`, `logout`) and warning events for every scheduled retry.
//! - Enable `metrics` to increment the `regcred_stage_total` counter for every
//!   attempt/success/failure, labeled by `stage` + `outcome`.

mod tracing;

pub use tracing::*;

// self
use crate::_prelude::*;

/// Session stages observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Credential callback round trips.
	Fetch,
	/// Registry login.
	Login,
	/// Registry logout.
	Logout,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Fetch => "fetch",
			Stage::Login => "login",
			Stage::Logout => "logout",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageOutcome {
	/// Entry to a stage.
	Attempt,
	/// A failed attempt that will be retried.
	Retry,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl StageOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageOutcome::Attempt => "attempt",
			StageOutcome::Retry => "retry",
			StageOutcome::Success => "success",
			StageOutcome::Failure => "failure",
		}
	}
}
impl Display for StageOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Counter incremented once per recorded stage outcome.
pub const STAGE_COUNTER: &str = "regcred_stage_total";

/// Increments [`STAGE_COUNTER`] labeled by `stage` and `outcome` (no-op without `metrics`).
pub fn record_stage_outcome(stage: Stage, outcome: StageOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(STAGE_COUNTER, "stage" => stage.as_str(), "outcome" => outcome.as_str())
			.increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = (stage, outcome);
	}
}

/// Records the outcome of `result` for `stage`.
pub fn record_result<T, E>(stage: Stage, result: &Result<T, E>) {
	let outcome = if result.is_ok() { StageOutcome::Success } else { StageOutcome::Failure };

	record_stage_outcome(stage, outcome);
}
