//! Bounded retry with backoff for transport-level failures.
//!
//! The decision logic ([`RetryPolicy::decide`] and the private run state) is shared by
//! [`RetryingTransport`] and [`AsyncRetryingTransport`]; the adapters differ only in how they
//! wait between attempts (`std::thread::sleep` versus `tokio::time::sleep`). Only the
//! calling thread or task waits, so unrelated callers are never blocked.
//!
//! Requests are repeated only when they are retry-eligible (safe verb or explicitly marked
//! idempotent). Transport failures are retried per [`RetryPolicy::retry_on`]; error statuses
//! are retried only when listed in [`RetryPolicy::retry_statuses`].

// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
	http::{AsyncHttpTransport, FailureKind, HttpRequest, HttpTransport, Response, TransportFailure},
	obs::{self, OpKind},
};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const MAX_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_BASE_DELAY: StdDuration = StdDuration::from_millis(200);
const DEFAULT_MAX_DELAY: StdDuration = StdDuration::from_secs(5);
const DEFAULT_JITTER: f64 = 0.2;
const DEFAULT_RETRY_STATUSES: [u16; 3] = [502, 503, 504];
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Delay schedule between attempts.
#[derive(Clone, Debug, PartialEq)]
pub enum Backoff {
	/// Same delay before every retry.
	Fixed(StdDuration),
	/// `base * 2^(attempt - 1)` capped at `max`, minus up to `jitter * delay`.
	Exponential {
		/// Delay before the first retry.
		base: StdDuration,
		/// Upper bound for any single delay.
		max: StdDuration,
		/// Fraction of the delay that may be shaved off at random (`0.0..=1.0`).
		jitter: f64,
	},
}
impl Backoff {
	/// No waiting between attempts.
	pub const fn none() -> Self {
		Self::Fixed(StdDuration::ZERO)
	}

	/// Un-jittered delay after the given (1-based) attempt.
	pub fn base_delay(&self, attempt: u32) -> StdDuration {
		match self {
			Self::Fixed(delay) => *delay,
			Self::Exponential { base, max, .. } => {
				if attempt == 0 {
					return StdDuration::ZERO;
				}

				let exponent = (attempt - 1).min(MAX_BACKOFF_EXPONENT);

				base.saturating_mul(2_u32.saturating_pow(exponent)).min(*max)
			},
		}
	}

	/// Jittered delay after the given attempt; `sample` is uniform in `0.0..1.0`.
	///
	/// The result never drops below the previous attempt's un-jittered delay, so the
	/// schedule is monotonically non-decreasing.
	pub fn delay(&self, attempt: u32, sample: f64) -> StdDuration {
		let delay = self.base_delay(attempt);
		let Self::Exponential { jitter, .. } = self else {
			return delay;
		};
		let shaved = delay.mul_f64((jitter * sample.clamp(0.0, 1.0)).clamp(0.0, 1.0));
		let floor = self.base_delay(attempt.saturating_sub(1));

		delay.saturating_sub(shaved).max(floor)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		match self {
			Self::Fixed(_) => Ok(()),
			Self::Exponential { base, max, jitter } => {
				if base > max {
					return Err(ConfigError::InvalidRetry {
						reason: format!("base delay {base:?} exceeds max delay {max:?}"),
					});
				}
				if !(0.0..=1.0).contains(jitter) {
					return Err(ConfigError::InvalidRetry {
						reason: format!("jitter {jitter} is outside 0.0..=1.0"),
					});
				}

				Ok(())
			},
		}
	}
}
impl Default for Backoff {
	fn default() -> Self {
		Self::Exponential { base: DEFAULT_BASE_DELAY, max: DEFAULT_MAX_DELAY, jitter: DEFAULT_JITTER }
	}
}

/// What a single attempt produced, reduced to what the policy looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attempted {
	/// A status line arrived.
	Status(u16),
	/// The attempt failed below the status layer.
	Failed(FailureKind),
}

/// Outcome of [`RetryPolicy::decide`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RetryDecision {
	/// Hand the response to the caller.
	Return,
	/// Wait for the delay, then try again.
	RetryAfter(StdDuration),
	/// Stop and surface the failure.
	GiveUp,
}

/// Retry configuration; the client default can be overridden per request.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
	/// Upper bound on network attempts per request (at least 1).
	pub max_attempts: u32,
	/// Delay schedule between attempts.
	pub backoff: Backoff,
	/// Failure kinds that may be retried.
	pub retry_on: Vec<FailureKind>,
	/// Error statuses that may be retried for retry-eligible requests.
	pub retry_statuses: Vec<u16>,
}
impl RetryPolicy {
	/// Policy that never repeats a request.
	pub fn no_retry() -> Self {
		Self { max_attempts: 1, ..Self::default() }
	}

	/// Sets the attempt ceiling.
	pub fn with_max_attempts(mut self, attempts: u32) -> Result<Self, ConfigError> {
		if !(1..=MAX_MAX_ATTEMPTS).contains(&attempts) {
			return Err(ConfigError::InvalidRetry {
				reason: format!("max_attempts must be between 1 and {MAX_MAX_ATTEMPTS}, got {attempts}"),
			});
		}

		self.max_attempts = attempts;

		Ok(self)
	}

	/// Replaces the delay schedule.
	pub fn with_backoff(mut self, backoff: Backoff) -> Result<Self, ConfigError> {
		backoff.validate()?;

		self.backoff = backoff;

		Ok(self)
	}

	/// Replaces the retryable failure kinds.
	pub fn with_retry_on<I>(mut self, kinds: I) -> Self
	where
		I: IntoIterator<Item = FailureKind>,
	{
		self.retry_on = kinds.into_iter().collect();

		self
	}

	/// Replaces the retryable statuses.
	pub fn with_retry_statuses<I>(mut self, statuses: I) -> Self
	where
		I: IntoIterator<Item = u16>,
	{
		self.retry_statuses = statuses.into_iter().collect();

		self
	}

	/// Validates a policy assembled through its public fields.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !(1..=MAX_MAX_ATTEMPTS).contains(&self.max_attempts) {
			return Err(ConfigError::InvalidRetry {
				reason: format!(
					"max_attempts must be between 1 and {MAX_MAX_ATTEMPTS}, got {}",
					self.max_attempts
				),
			});
		}

		self.backoff.validate()
	}

	/// Decides what to do after `attempt` (1-based) attempts have been made.
	pub fn decide(&self, attempt: u32, retry_eligible: bool, outcome: Attempted) -> RetryDecision {
		self.decide_with(attempt, retry_eligible, outcome, rand::rng().random::<f64>())
	}

	/// [`decide`](Self::decide) with an explicit jitter sample.
	pub fn decide_with(
		&self,
		attempt: u32,
		retry_eligible: bool,
		outcome: Attempted,
		sample: f64,
	) -> RetryDecision {
		let budget_left = attempt < self.max_attempts;

		match outcome {
			Attempted::Status(status) =>
				if retry_eligible && budget_left && self.retry_statuses.contains(&status) {
					RetryDecision::RetryAfter(self.backoff.delay(attempt, sample))
				} else {
					RetryDecision::Return
				},
			Attempted::Failed(kind) =>
				if retry_eligible && budget_left && self.retry_on.contains(&kind) {
					RetryDecision::RetryAfter(self.backoff.delay(attempt, sample))
				} else {
					RetryDecision::GiveUp
				},
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			backoff: Backoff::default(),
			retry_on: vec![
				FailureKind::Connect,
				FailureKind::ConnectTimeout,
				FailureKind::ReadTimeout,
				FailureKind::ConnectionReset,
				FailureKind::Body,
			],
			retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
		}
	}
}

enum Step {
	Done(Result<Response, TransportError>),
	Wait(StdDuration),
}

/// Per-request retry bookkeeping shared by both adapters.
struct RetryRun<'a> {
	kind: OpKind,
	policy: &'a RetryPolicy,
	retry_eligible: bool,
	attempt: u32,
}
impl<'a> RetryRun<'a> {
	fn new(kind: OpKind, policy: &'a RetryPolicy, request: &HttpRequest) -> Self {
		Self { kind, policy, retry_eligible: request.retry_eligible, attempt: 0 }
	}

	fn begin(&mut self) {
		self.attempt += 1;
	}

	fn settle(&mut self, result: Result<Response, TransportFailure>) -> Step {
		match result {
			Ok(response) => match self.policy.decide(
				self.attempt,
				self.retry_eligible,
				Attempted::Status(response.status),
			) {
				RetryDecision::RetryAfter(delay) => {
					let reason = format!("status {}", response.status);

					obs::record_retry(self.kind, self.attempt, &reason, delay);

					Step::Wait(delay)
				},
				RetryDecision::Return | RetryDecision::GiveUp => Step::Done(Ok(response)),
			},
			Err(failure) => match self.policy.decide(
				self.attempt,
				self.retry_eligible,
				Attempted::Failed(failure.kind),
			) {
				RetryDecision::RetryAfter(delay) => {
					obs::record_retry(self.kind, self.attempt, failure.kind.as_str(), delay);

					Step::Wait(delay)
				},
				RetryDecision::Return | RetryDecision::GiveUp =>
					Step::Done(Err(TransportError::exhausted(self.attempt, failure))),
			},
		}
	}
}

/// Blocking transport wrapper that applies a [`RetryPolicy`].
#[derive(Clone, Debug)]
pub struct RetryingTransport<T> {
	inner: T,
	policy: RetryPolicy,
}
impl<T> RetryingTransport<T> {
	/// Wraps `inner` with the default policy `policy`.
	pub fn new(inner: T, policy: RetryPolicy) -> Self {
		Self { inner, policy }
	}

	/// Returns the default policy.
	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}

	/// Returns the wrapped transport.
	pub fn inner(&self) -> &T {
		&self.inner
	}
}
impl<T> RetryingTransport<T>
where
	T: HttpTransport,
{
	/// Executes the request, retrying per `policy` (or the default policy).
	pub fn execute(
		&self,
		request: &HttpRequest,
		policy: Option<&RetryPolicy>,
	) -> Result<Response, TransportError> {
		self.execute_as(OpKind::Request, request, policy)
	}

	/// [`execute`](Self::execute) with retries reported under `kind`.
	pub fn execute_as(
		&self,
		kind: OpKind,
		request: &HttpRequest,
		policy: Option<&RetryPolicy>,
	) -> Result<Response, TransportError> {
		let mut run = RetryRun::new(kind, policy.unwrap_or(&self.policy), request);

		loop {
			run.begin();

			match run.settle(self.inner.send(request)) {
				Step::Done(result) => return result,
				Step::Wait(delay) =>
					if !delay.is_zero() {
						std::thread::sleep(delay);
					},
			}
		}
	}
}

/// Async transport wrapper that applies a [`RetryPolicy`].
#[derive(Clone, Debug)]
pub struct AsyncRetryingTransport<T> {
	inner: T,
	policy: RetryPolicy,
}
impl<T> AsyncRetryingTransport<T> {
	/// Wraps `inner` with the default policy `policy`.
	pub fn new(inner: T, policy: RetryPolicy) -> Self {
		Self { inner, policy }
	}

	/// Returns the default policy.
	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}

	/// Returns the wrapped transport.
	pub fn inner(&self) -> &T {
		&self.inner
	}
}
impl<T> AsyncRetryingTransport<T>
where
	T: AsyncHttpTransport,
{
	/// Executes the request, retrying per `policy` (or the default policy).
	///
	/// Dropping the future cancels the in-flight attempt or backoff wait.
	pub async fn execute(
		&self,
		request: &HttpRequest,
		policy: Option<&RetryPolicy>,
	) -> Result<Response, TransportError> {
		self.execute_as(OpKind::Request, request, policy).await
	}

	/// [`execute`](Self::execute) with retries reported under `kind`.
	pub async fn execute_as(
		&self,
		kind: OpKind,
		request: &HttpRequest,
		policy: Option<&RetryPolicy>,
	) -> Result<Response, TransportError> {
		let mut run = RetryRun::new(kind, policy.unwrap_or(&self.policy), request);

		loop {
			run.begin();

			let result = self.inner.send(request).await;

			match run.settle(result) {
				Step::Done(result) => return result,
				Step::Wait(delay) =>
					if !delay.is_zero() {
						tokio::time::sleep(delay).await;
					},
			}
		}
	}
}
