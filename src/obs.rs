//! Optional observability helpers for client operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `threat_intel_client.op` with the `op` (operation
//!   kind) and `stage` (call site) fields, plus a `warn` event for every scheduled retry.
//! - Enable `metrics` to increment the `threat_intel_client_op_total` counter for every
//!   attempt/success/failure/retry, labeled by `op` + `outcome`.
//!
//! Without either feature every helper compiles to a no-op.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operation kinds observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Access-token exchange against the token endpoint.
	TokenRefresh,
	/// Authenticated API request issued through a session.
	Request,
	/// Single page fetch during cursor traversal.
	PageFetch,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::TokenRefresh => "token_refresh",
			OpKind::Request => "request",
			OpKind::PageFetch => "page_fetch",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// A transport attempt failed and another one was scheduled.
	Retry,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
			OpOutcome::Retry => "retry",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records a scheduled retry as a `warn` event, on the current op span, and as a `retry` outcome.
pub fn record_retry(kind: OpKind, attempt: u32, reason: &str, delay: StdDuration) {
	#[cfg(feature = "tracing")]
	{
		::tracing::warn!(
			op = kind.as_str(),
			attempt,
			reason,
			delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
			"Retrying request."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = delay;
	}

	note_retry(attempt, reason);
	record_op_outcome(kind, OpOutcome::Retry);
}
