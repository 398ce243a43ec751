// self
use crate::{
	_prelude::*,
	obs::{Stage, StageOutcome},
	retry::RetryEvent,
};

/// A span builder used by session stages.
#[derive(Clone, Debug)]
pub struct StageSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl StageSpan {
	/// Creates a new span tagged with the provided stage and subject (image or callback URL).
	pub fn new(stage: Stage, subject: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("regcred.stage", stage = stage.as_str(), subject);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (stage, subject);

			Self {}
		}
	}

	/// Enters the span until the returned guard is dropped.
	pub fn entered(self) -> StageSpanGuard {
		#[cfg(feature = "tracing")]
		{
			StageSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			StageSpanGuard {}
		}
	}
}

/// RAII guard returned by [`StageSpan::entered`].
pub struct StageSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for StageSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("StageSpanGuard(..)")
	}
}

/// Reports a failed attempt that is about to be retried.
pub fn record_retry(stage: Stage, event: &RetryEvent, err: &dyn StdError) {
	super::record_stage_outcome(stage, StageOutcome::Retry);

	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			stage = stage.as_str(),
			attempt = event.attempt,
			max_attempts = event.max_attempts,
			delay_ms = u64::try_from(event.delay.as_millis()).unwrap_or(u64::MAX),
			error = %err,
			"Attempt failed; retrying."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (event, err);
	}
}

/// Reports a failure that cannot be propagated (teardown inside `Drop`, for example).
pub fn record_unpropagated_failure(stage: Stage, err: &dyn StdError) {
	super::record_stage_outcome(stage, StageOutcome::Failure);

	#[cfg(feature = "tracing")]
	{
		tracing::warn!(stage = stage.as_str(), error = %err, "Stage failed.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = err;
	}
}
