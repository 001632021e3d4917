//! Client configuration and its validating builder.

// self
use crate::{_prelude::*, auth::ApiKey, error::ConfigError, http::USER_AGENT, retry::RetryPolicy};

/// Default service location.
pub const DEFAULT_API_URL: &str = "https://cybsi.cloud";

const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(60);
const DEFAULT_MAX_CONNECTIONS: usize = 100;
const DEFAULT_MAX_KEEPALIVE_CONNECTIONS: usize = 20;
const DEFAULT_KEEPALIVE_EXPIRY: StdDuration = StdDuration::from_secs(5);
const DEFAULT_TOKEN_SAFETY_MARGIN: Duration = Duration::seconds(30);

/// Per-attempt timeouts; the retry budget is applied on top of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
	/// Bound on connection establishment.
	pub connect: StdDuration,
	/// Bound on awaiting response bytes.
	pub read: StdDuration,
	/// Bound on sending the request body.
	pub write: StdDuration,
}
impl Timeouts {
	/// Uses the same bound for every phase.
	pub const fn uniform(timeout: StdDuration) -> Self {
		Self { connect: timeout, read: timeout, write: timeout }
	}

	/// Overrides the connect timeout.
	pub fn with_connect(mut self, timeout: StdDuration) -> Self {
		self.connect = timeout;

		self
	}

	/// Overrides the read timeout.
	pub fn with_read(mut self, timeout: StdDuration) -> Self {
		self.read = timeout;

		self
	}

	/// Overrides the write timeout.
	pub fn with_write(mut self, timeout: StdDuration) -> Self {
		self.write = timeout;

		self
	}

	/// Upper bound for one complete attempt.
	pub fn total(&self) -> StdDuration {
		self.connect.saturating_add(self.write).saturating_add(self.read)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		for (name, value) in [("connect", self.connect), ("read", self.read), ("write", self.write)] {
			if value.is_zero() {
				return Err(ConfigError::InvalidTimeout { name });
			}
		}

		Ok(())
	}
}
impl Default for Timeouts {
	fn default() -> Self {
		Self::uniform(DEFAULT_TIMEOUT)
	}
}

/// Connection pool limits handed to the HTTP engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
	/// Ceiling on concurrently open connections.
	pub max_connections: usize,
	/// Idle connections kept alive for reuse.
	pub max_keepalive_connections: usize,
	/// How long an idle connection stays in the pool.
	pub keepalive_expiry: StdDuration,
}
impl Limits {
	fn validate(&self) -> Result<(), ConfigError> {
		if self.max_connections == 0 {
			return Err(ConfigError::InvalidLimits {
				reason: "max_connections must be at least 1".into(),
			});
		}
		if self.max_keepalive_connections > self.max_connections {
			return Err(ConfigError::InvalidLimits {
				reason: format!(
					"max_keepalive_connections ({}) exceeds max_connections ({})",
					self.max_keepalive_connections, self.max_connections
				),
			});
		}

		Ok(())
	}
}
impl Default for Limits {
	fn default() -> Self {
		Self {
			max_connections: DEFAULT_MAX_CONNECTIONS,
			max_keepalive_connections: DEFAULT_MAX_KEEPALIVE_CONNECTIONS,
			keepalive_expiry: DEFAULT_KEEPALIVE_EXPIRY,
		}
	}
}

/// Validated client configuration.
#[derive(Clone, Debug)]
pub struct Config {
	api_url: Url,
	api_key: ApiKey,
	ssl_verify: bool,
	timeouts: Timeouts,
	limits: Limits,
	retry: RetryPolicy,
	token_safety_margin: Duration,
	user_agent: String,
}
impl Config {
	/// Starts a builder for the provided API key.
	pub fn builder(api_key: impl Into<String>) -> ConfigBuilder {
		ConfigBuilder::new(api_key)
	}

	/// Service base URL.
	pub fn api_url(&self) -> &Url {
		&self.api_url
	}

	/// Long-lived API key.
	pub fn api_key(&self) -> &ApiKey {
		&self.api_key
	}

	/// Whether TLS certificates are verified.
	pub fn ssl_verify(&self) -> bool {
		self.ssl_verify
	}

	/// Per-attempt timeouts.
	pub fn timeouts(&self) -> &Timeouts {
		&self.timeouts
	}

	/// Connection pool limits.
	pub fn limits(&self) -> &Limits {
		&self.limits
	}

	/// Default retry policy.
	pub fn retry(&self) -> &RetryPolicy {
		&self.retry
	}

	/// How long before expiry a cached token is considered stale.
	pub fn token_safety_margin(&self) -> Duration {
		self.token_safety_margin
	}

	/// `User-Agent` header value.
	pub fn user_agent(&self) -> &str {
		&self.user_agent
	}
}

/// Builder for [`Config`] values.
#[derive(Debug)]
pub struct ConfigBuilder {
	api_key: String,
	api_url: String,
	ssl_verify: bool,
	timeouts: Timeouts,
	limits: Limits,
	retry: RetryPolicy,
	token_safety_margin: Duration,
	user_agent: String,
}
impl ConfigBuilder {
	/// Creates a builder seeded with defaults.
	pub fn new(api_key: impl Into<String>) -> Self {
		Self {
			api_key: api_key.into(),
			api_url: DEFAULT_API_URL.into(),
			ssl_verify: true,
			timeouts: Timeouts::default(),
			limits: Limits::default(),
			retry: RetryPolicy::default(),
			token_safety_margin: DEFAULT_TOKEN_SAFETY_MARGIN,
			user_agent: USER_AGENT.into(),
		}
	}

	/// Overrides the service base URL.
	pub fn api_url(mut self, url: impl Into<String>) -> Self {
		self.api_url = url.into();

		self
	}

	/// Enables or disables TLS certificate verification.
	pub fn ssl_verify(mut self, verify: bool) -> Self {
		self.ssl_verify = verify;

		self
	}

	/// Overrides the per-attempt timeouts.
	pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
		self.timeouts = timeouts;

		self
	}

	/// Overrides the connection pool limits.
	pub fn limits(mut self, limits: Limits) -> Self {
		self.limits = limits;

		self
	}

	/// Overrides the default retry policy.
	pub fn retry(mut self, policy: RetryPolicy) -> Self {
		self.retry = policy;

		self
	}

	/// Overrides the token safety margin; negative values are clamped to zero.
	pub fn token_safety_margin(mut self, margin: Duration) -> Self {
		self.token_safety_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Overrides the `User-Agent` header value.
	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<Config, ConfigError> {
		let api_key = ApiKey::new(self.api_key)?;
		let api_url = parse_api_url(&self.api_url)?;

		self.timeouts.validate()?;
		self.limits.validate()?;
		self.retry.validate()?;

		if self.user_agent.is_empty() || self.user_agent.chars().any(char::is_control) {
			return Err(ConfigError::InvalidHeader { name: "User-Agent".into() });
		}

		Ok(Config {
			api_url,
			api_key,
			ssl_verify: self.ssl_verify,
			timeouts: self.timeouts,
			limits: self.limits,
			retry: self.retry,
			token_safety_margin: self.token_safety_margin,
			user_agent: self.user_agent,
		})
	}
}

fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
	let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { source })?;

	match url.scheme() {
		"http" | "https" => Ok(url),
		_ => Err(ConfigError::UnsupportedScheme { url: url.to_string() }),
	}
}
