//! Bounded retry with capped exponential backoff and jitter.
//!
//! [`RetryPolicy`] drives both the credential callback loop and the registry login loop. The
//! delay before retry `n` (zero-based) is `min(base_delay * 2^n + jitter(), max_delay)`, where
//! the default jitter is drawn uniformly from `[0, 1)` seconds so concurrent callers hitting the
//! same endpoint drift apart. A policy stops early whenever its predicate rejects an error.

// std
use std::{num::NonZeroU32, thread};
// self
use crate::{_prelude::*, error::ConfigError};

/// Produces the random component added to every backoff delay.
pub type JitterFn = Arc<dyn Fn() -> Duration + Send + Sync>;
/// Decides whether an error is worth another attempt.
pub type RetryablePredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Attempt budget used when callers do not provide one.
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Details about a retry that is about to be scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryEvent {
	/// Zero-based index of the attempt that just failed.
	pub attempt: u32,
	/// Total attempt budget.
	pub max_attempts: u32,
	/// Delay slept before the next attempt.
	pub delay: Duration,
}

/// Configurable retry policy shared by every retrying call site.
pub struct RetryPolicy<E> {
	max_attempts: NonZeroU32,
	/// Delay multiplied by `2^attempt` before jitter is added.
	pub base_delay: Duration,
	/// Upper bound applied after jitter.
	pub max_delay: Duration,
	jitter: JitterFn,
	retryable: RetryablePredicate<E>,
}
impl<E> RetryPolicy<E>
where
	E: 'static,
{
	/// Base delay of the default `2^attempt` seconds schedule.
	pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
	/// Delay cap for credential callback retries.
	pub const CALLBACK_MAX_DELAY: Duration = Duration::from_secs(16);
	/// Delay cap for registry login retries.
	pub const LEGACY_MAX_DELAY: Duration = Duration::from_secs(32);

	/// Creates a policy that retries every error up to `max_attempts` total attempts.
	pub fn new(max_attempts: u32) -> Result<Self, ConfigError> {
		let max_attempts = NonZeroU32::new(max_attempts)
			.ok_or(ConfigError::InvalidAttempts { attempts: max_attempts })?;

		Ok(Self::with_budget(max_attempts))
	}

	/// Creates the login retry policy: `tries` total attempts, every error retried, 32s cap.
	///
	/// The final attempt's error is returned unchanged.
	pub fn legacy(tries: u32) -> Result<Self, ConfigError> {
		Ok(Self::new(tries)?.with_max_delay(Self::LEGACY_MAX_DELAY))
	}

	pub(crate) fn with_budget(max_attempts: NonZeroU32) -> Self {
		Self {
			max_attempts,
			base_delay: Self::DEFAULT_BASE_DELAY,
			max_delay: Self::CALLBACK_MAX_DELAY,
			jitter: Arc::new(uniform_jitter),
			retryable: Arc::new(always_retry::<E>),
		}
	}

	pub(crate) fn default_budget() -> NonZeroU32 {
		NonZeroU32::new(DEFAULT_ATTEMPTS).unwrap_or(NonZeroU32::MIN)
	}

	/// Total attempt budget.
	pub fn max_attempts(&self) -> u32 {
		self.max_attempts.get()
	}

	/// Replaces the attempt budget.
	pub fn with_max_attempts(mut self, max_attempts: NonZeroU32) -> Self {
		self.max_attempts = max_attempts;

		self
	}

	/// Overrides the base delay (defaults to one second).
	pub fn with_base_delay(mut self, delay: Duration) -> Self {
		self.base_delay = delay;

		self
	}

	/// Overrides the delay cap.
	pub fn with_max_delay(mut self, delay: Duration) -> Self {
		self.max_delay = delay;

		self
	}

	/// Overrides the jitter source.
	pub fn with_jitter<F>(mut self, jitter: F) -> Self
	where
		F: 'static + Send + Sync + Fn() -> Duration,
	{
		self.jitter = Arc::new(jitter);

		self
	}

	/// Overrides the predicate deciding which errors are retried.
	pub fn with_retryable<F>(mut self, retryable: F) -> Self
	where
		F: 'static + Send + Sync + Fn(&E) -> bool,
	{
		self.retryable = Arc::new(retryable);

		self
	}

	/// Returns `true` if the predicate allows retrying `err`.
	pub fn is_retryable(&self, err: &E) -> bool {
		(self.retryable)(err)
	}

	/// Computes the delay slept after the zero-based `attempt` fails.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
		let exponential = self.base_delay.checked_mul(factor).unwrap_or(Duration::MAX);

		exponential.saturating_add((self.jitter)()).min(self.max_delay)
	}

	/// Runs `op` until it succeeds, the budget is spent, or an error is not retryable.
	pub fn run<T, F>(&self, op: F) -> Result<T, E>
	where
		F: FnMut(u32) -> Result<T, E>,
	{
		self.run_with(op, |_, _| {})
	}

	/// Like [`RetryPolicy::run`], invoking `on_retry` before each backoff sleep.
	///
	/// `op` receives the zero-based attempt index. The error of the last attempt made is
	/// returned unchanged.
	pub fn run_with<T, F, N>(&self, mut op: F, mut on_retry: N) -> Result<T, E>
	where
		F: FnMut(u32) -> Result<T, E>,
		N: FnMut(&RetryEvent, &E),
	{
		let max_attempts = self.max_attempts.get();
		let mut attempt = 0;

		loop {
			let err = match op(attempt) {
				Ok(value) => return Ok(value),
				Err(err) => err,
			};

			if attempt + 1 >= max_attempts || !self.is_retryable(&err) {
				return Err(err);
			}

			let event = RetryEvent { attempt, max_attempts, delay: self.delay_for(attempt) };

			on_retry(&event, &err);

			if !event.delay.is_zero() {
				thread::sleep(event.delay);
			}

			attempt += 1;
		}
	}
}
impl<E> Clone for RetryPolicy<E> {
	fn clone(&self) -> Self {
		Self {
			max_attempts: self.max_attempts,
			base_delay: self.base_delay,
			max_delay: self.max_delay,
			jitter: self.jitter.clone(),
			retryable: self.retryable.clone(),
		}
	}
}
impl<E> Debug for RetryPolicy<E> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryPolicy")
			.field("max_attempts", &self.max_attempts)
			.field("base_delay", &self.base_delay)
			.field("max_delay", &self.max_delay)
			.finish_non_exhaustive()
	}
}

fn always_retry<E>(_: &E) -> bool {
	true
}

fn uniform_jitter() -> Duration {
	Duration::from_secs_f64(rand::random::<f64>())
}

#[cfg(test)]
mod tests {
	// std
	use std::cell::Cell;
	// self
	use super::*;

	fn fixed(max_attempts: u32, jitter: Duration) -> RetryPolicy<&'static str> {
		RetryPolicy::new(max_attempts)
			.expect("Test budget should be valid.")
			.with_jitter(move || jitter)
	}

	#[test]
	fn zero_attempts_are_rejected() {
		assert!(matches!(
			RetryPolicy::<()>::new(0),
			Err(ConfigError::InvalidAttempts { attempts: 0 })
		));
		assert!(RetryPolicy::<()>::legacy(0).is_err());
	}

	#[test]
	fn delays_grow_exponentially_until_capped() {
		let policy = fixed(10, Duration::from_millis(500));
		let delays: Vec<_> = (0..6).map(|attempt| policy.delay_for(attempt)).collect();

		assert_eq!(delays, [
			Duration::from_millis(1_500),
			Duration::from_millis(2_500),
			Duration::from_millis(4_500),
			Duration::from_millis(8_500),
			Duration::from_secs(16),
			Duration::from_secs(16),
		]);
		assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(16));
	}

	#[test]
	fn legacy_policy_caps_at_thirty_two_seconds() {
		let policy = RetryPolicy::<()>::legacy(3)
			.expect("Legacy budget should be valid.")
			.with_jitter(|| Duration::ZERO);

		assert_eq!(policy.delay_for(4), Duration::from_secs(16));
		assert_eq!(policy.delay_for(5), Duration::from_secs(32));
		assert_eq!(policy.delay_for(9), Duration::from_secs(32));
		assert!(policy.is_retryable(&()));
	}

	#[test]
	fn default_jitter_stays_below_one_second() {
		for _ in 0..64 {
			assert!(uniform_jitter() < Duration::from_secs(1));
		}
	}

	#[test]
	fn exhausts_budget_and_returns_last_error() {
		let policy = fixed(4, Duration::ZERO).with_base_delay(Duration::ZERO);
		let calls = Cell::new(0);
		let mut events = Vec::new();
		let result: Result<(), _> = policy.run_with(
			|attempt| {
				calls.set(calls.get() + 1);

				Err(if attempt == 3 { "last" } else { "boom" })
			},
			|event, _| events.push(event.attempt),
		);

		assert_eq!(result, Err("last"));
		assert_eq!(calls.get(), 4);
		assert_eq!(events, [0, 1, 2]);
	}

	#[test]
	fn single_attempt_budget_never_retries() {
		let policy = fixed(1, Duration::ZERO);
		let calls = Cell::new(0);
		let result: Result<(), _> = policy.run(|_| {
			calls.set(calls.get() + 1);

			Err("boom")
		});

		assert_eq!(result, Err("boom"));
		assert_eq!(calls.get(), 1);
	}

	#[test]
	fn non_retryable_errors_stop_immediately() {
		let policy = fixed(8, Duration::ZERO).with_retryable(|err| *err != "fatal");
		let calls = Cell::new(0);
		let result: Result<(), _> = policy.run(|_| {
			calls.set(calls.get() + 1);

			Err("fatal")
		});

		assert_eq!(result, Err("fatal"));
		assert_eq!(calls.get(), 1);
	}

	#[test]
	fn succeeds_after_transient_failures() {
		let policy = fixed(5, Duration::ZERO).with_base_delay(Duration::ZERO);
		let result = policy.run(|attempt| if attempt < 2 { Err("flaky") } else { Ok(attempt) });

		assert_eq!(result, Ok(2));
	}
}
