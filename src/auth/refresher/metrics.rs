// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for the token slot.
///
/// `attempts`, `successes`, and `failures` count token endpoint calls. `invalidations` counts
/// slots dropped after a `401`, and `short_lived_reuses` counts callers that queued behind a
/// refresh and took its token although it was already inside the safety margin.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	invalidations: AtomicU64,
	short_lived_reuses: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of token endpoint calls started.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes that produced a token.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed refreshes.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of cached tokens dropped after a `401`.
	pub fn invalidations(&self) -> u64 {
		self.invalidations.load(Ordering::Relaxed)
	}

	/// Returns how often a queued caller reused a token that was already inside the margin.
	pub fn short_lived_reuses(&self) -> u64 {
		self.short_lived_reuses.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_invalidation(&self) {
		self.invalidations.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_short_lived_reuse(&self) {
		self.short_lived_reuses.fetch_add(1, Ordering::Relaxed);
	}
}
