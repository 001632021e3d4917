//! Long-lived API key and the store that hands it out.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::Secret, error::ConfigError};

const FINGERPRINT_LEN: usize = 12;

/// Validated, non-empty API key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
	secret: Secret,
	fingerprint: String,
}
impl ApiKey {
	/// Validates and wraps a raw key.
	pub fn new(value: impl Into<String>) -> Result<Self, ConfigError> {
		let secret = Secret::new(value);

		if secret.is_blank() {
			return Err(ConfigError::EmptyApiKey);
		}

		let fingerprint = compute_fingerprint(secret.expose());

		Ok(Self { secret, fingerprint })
	}

	/// Returns the raw key. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.secret.expose()
	}

	/// Short, stable digest of the key that is safe to log.
	pub fn fingerprint(&self) -> &str {
		&self.fingerprint
	}
}
impl Debug for ApiKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiKey").field("fingerprint", &self.fingerprint).finish()
	}
}
impl Display for ApiKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "api-key:{}", self.fingerprint)
	}
}

/// Credential presented to the token endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
	/// Long-lived API key.
	pub api_key: ApiKey,
}

/// Immutable holder of the client credential.
#[derive(Clone, Debug)]
pub struct CredentialStore {
	credential: Credential,
}
impl CredentialStore {
	/// Stores the provided key for the lifetime of the client.
	pub fn new(api_key: ApiKey) -> Self {
		Self { credential: Credential { api_key } }
	}

	/// Validates a raw key and stores it.
	pub fn from_raw(api_key: impl Into<String>) -> Result<Self, ConfigError> {
		ApiKey::new(api_key).map(Self::new)
	}

	/// Returns the stored credential.
	pub fn get(&self) -> &Credential {
		&self.credential
	}
}

fn compute_fingerprint(key: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(key.as_bytes());

	let digest = hasher.finalize();
	let mut encoded = STANDARD_NO_PAD.encode(digest);

	encoded.truncate(FINGERPRINT_LEN);

	encoded
}
