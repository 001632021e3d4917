//! Single-slot access token cache with a refresh gate shared by threads and tasks.
//!
//! [`TokenRefresher`] keeps exactly one [`AccessToken`] behind a [`RwLock`] and serializes
//! refreshes through one [`AsyncMutex`] gate. Blocking callers take the gate with
//! `lock_blocking()`, async callers with `lock().await`. Each caller notes the generation of
//! the stale token it saw before queueing; once it holds the gate, a token from a newer
//! generation is reused as long as it has not expired, even when it is already inside the
//! safety margin. Tokens that live shorter than the margin therefore still cost one refresh
//! per staleness event. The gate guard is dropped on every exit path, including when an async
//! caller's future is cancelled.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Credential, CredentialStore},
	error::AuthError,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Boxed future returned by [`AsyncTokenSource::fetch`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<AccessToken, AuthError>> + 'a + Send>>;

/// Blocking exchange of the credential for a fresh access token.
pub trait TokenSource
where
	Self: 'static + Send + Sync,
{
	/// Performs one token exchange.
	fn fetch(&self, credential: &Credential) -> Result<AccessToken, AuthError>;
}
impl<T> TokenSource for Arc<T>
where
	T: ?Sized + TokenSource,
{
	fn fetch(&self, credential: &Credential) -> Result<AccessToken, AuthError> {
		(**self).fetch(credential)
	}
}

/// Async exchange of the credential for a fresh access token.
pub trait AsyncTokenSource
where
	Self: 'static + Send + Sync,
{
	/// Performs one token exchange.
	fn fetch<'a>(&'a self, credential: &'a Credential) -> TokenFuture<'a>;
}
impl<T> AsyncTokenSource for Arc<T>
where
	T: ?Sized + AsyncTokenSource,
{
	fn fetch<'a>(&'a self, credential: &'a Credential) -> TokenFuture<'a> {
		(**self).fetch(credential)
	}
}

/// Produces currently valid access tokens, refreshing at most once per staleness event.
pub struct TokenRefresher<S> {
	credentials: CredentialStore,
	source: S,
	slot: RwLock<Option<AccessToken>>,
	gate: AsyncMutex<()>,
	generation: AtomicU64,
	safety_margin: Duration,
	metrics: RefreshMetrics,
}
impl<S> TokenRefresher<S> {
	/// Creates a refresher with an empty slot.
	pub fn new(credentials: CredentialStore, source: S, safety_margin: Duration) -> Self {
		Self {
			credentials,
			source,
			slot: RwLock::new(None),
			gate: AsyncMutex::new(()),
			generation: AtomicU64::new(0),
			safety_margin,
			metrics: RefreshMetrics::default(),
		}
	}

	/// Returns the cached token, fresh or not.
	pub fn current(&self) -> Option<AccessToken> {
		self.slot.read().clone()
	}

	/// Forces the next `ensure_valid` call to refresh.
	pub fn invalidate(&self) {
		*self.slot.write() = None;
	}

	/// Drops the cached token only if it is still the one the caller used.
	///
	/// Returns `false` when another caller already replaced it, so a burst of `401`s caused by
	/// the same stale token results in a single refresh.
	pub fn invalidate_if_current(&self, token: &AccessToken) -> bool {
		let mut slot = self.slot.write();

		if slot.as_ref().is_some_and(|cached| cached.generation() == token.generation()) {
			*slot = None;
			self.metrics.record_invalidation();

			true
		} else {
			false
		}
	}

	/// Refresh counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Stored credential.
	pub fn credentials(&self) -> &CredentialStore {
		&self.credentials
	}

	/// Returns the token source.
	pub fn source(&self) -> &S {
		&self.source
	}

	/// Fresh cached token, or the generation of the stale slot (`0` when empty).
	fn cached(&self) -> Result<AccessToken, u64> {
		let now = OffsetDateTime::now_utc();

		match self.slot.read().as_ref() {
			Some(token) if token.is_fresh_at(now, self.safety_margin) => Ok(token.clone()),
			Some(token) => Err(token.generation()),
			None => Err(0),
		}
	}

	/// Token usable by a caller that saw generation `seen` before taking the gate.
	fn settled(&self, seen: u64) -> Option<AccessToken> {
		let now = OffsetDateTime::now_utc();
		let slot = self.slot.read();
		let token = slot.as_ref()?;

		if token.is_fresh_at(now, self.safety_margin) {
			return Some(token.clone());
		}
		if token.generation() != seen && !token.is_expired_at(now) {
			self.metrics.record_short_lived_reuse();

			return Some(token.clone());
		}

		None
	}

	fn begin_refresh(&self) {
		self.metrics.record_attempt();
		obs::record_op_outcome(OpKind::TokenRefresh, OpOutcome::Attempt);
	}

	fn finish_refresh(
		&self,
		result: Result<AccessToken, AuthError>,
	) -> Result<AccessToken, AuthError> {
		obs::record_result(OpKind::TokenRefresh, &result);

		let token = result.inspect_err(|_| self.metrics.record_failure())?;
		let mut slot = self.slot.write();
		let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
		let token = token.with_generation(generation);

		*slot = Some(token.clone());

		drop(slot);
		self.metrics.record_success();

		#[cfg(feature = "tracing")]
		tracing::debug!(
			api_key = self.credentials.get().api_key.fingerprint(),
			generation,
			expires_at = %token.expires_at(),
			"Access token refreshed."
		);

		Ok(token)
	}
}
impl<S> TokenRefresher<S>
where
	S: TokenSource,
{
	/// Returns a fresh token, blocking the calling thread while a refresh is in flight.
	pub fn ensure_valid(&self) -> Result<AccessToken, AuthError> {
		let seen = match self.cached() {
			Ok(token) => return Ok(token),
			Err(seen) => seen,
		};
		let _gate = self.gate.lock_blocking();

		if let Some(token) = self.settled(seen) {
			return Ok(token);
		}

		let _span = OpSpan::new(OpKind::TokenRefresh, "ensure_valid").entered();

		self.begin_refresh();
		self.finish_refresh(self.source.fetch(self.credentials.get()))
	}
}
impl<S> TokenRefresher<S>
where
	S: AsyncTokenSource,
{
	/// Returns a fresh token, suspending the calling task while a refresh is in flight.
	pub async fn ensure_valid_async(&self) -> Result<AccessToken, AuthError> {
		let seen = match self.cached() {
			Ok(token) => return Ok(token),
			Err(seen) => seen,
		};
		let _gate = self.gate.lock().await;

		if let Some(token) = self.settled(seen) {
			return Ok(token);
		}

		let span = OpSpan::new(OpKind::TokenRefresh, "ensure_valid_async");

		self.begin_refresh();

		let result = span.instrument(self.source.fetch(self.credentials.get())).await;

		self.finish_refresh(result)
	}
}
impl<S> Debug for TokenRefresher<S> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRefresher")
			.field("credentials", &self.credentials)
			.field("token", &self.slot.read().as_ref())
			.field("safety_margin", &self.safety_margin)
			.field("metrics", &self.metrics)
			.finish_non_exhaustive()
	}
}
