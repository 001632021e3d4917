//! Short-lived access token and the token endpoint's wire format.

// self
use crate::{_prelude::*, auth::Secret, error::ProtocolError, view};

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Bearer credential attached to authenticated requests.
///
/// Tokens are replaced wholesale on refresh. The `generation` stamp identifies which refresh
/// produced the token so stale `401` reports can be told apart from fresh ones.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
	secret: Secret,
	token_type: String,
	expires_at: OffsetDateTime,
	generation: u64,
}
impl AccessToken {
	/// Creates a token from its parts.
	pub fn new(
		value: impl Into<String>,
		token_type: impl Into<String>,
		expires_at: OffsetDateTime,
	) -> Self {
		Self { secret: Secret::new(value), token_type: token_type.into(), expires_at, generation: 0 }
	}

	pub(crate) fn with_generation(mut self, generation: u64) -> Self {
		self.generation = generation;

		self
	}

	/// Returns the raw token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.secret.expose()
	}

	/// Returns the token type announced by the endpoint.
	pub fn token_type(&self) -> &str {
		&self.token_type
	}

	/// Returns the expiry instant.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.expires_at
	}

	/// Refresh generation that produced this token.
	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// `Authorization` header value: `"{token_type} {token}"`.
	pub fn header_value(&self) -> String {
		format!("{} {}", self.token_type, self.secret.expose())
	}

	/// Returns `true` while `now < expires_at - margin`.
	pub fn is_fresh_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
		now < self.expires_at - margin
	}

	/// Returns `true` once the expiry instant has passed.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("expires_at", &self.expires_at)
			.field("generation", &self.generation)
			.finish()
	}
}

/// Success body of the token endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
	/// Opaque access token.
	pub access_token: Secret,
	/// Token type, normally `Bearer`.
	#[serde(default = "default_token_type")]
	pub token_type: String,
	/// Lifetime in seconds.
	pub expires_in: i64,
}
impl TokenResponse {
	/// Decodes the token endpoint body.
	pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
		view::decode("token response", body)
	}

	/// Converts the response into a token issued at `issued_at`.
	pub fn into_token(self, issued_at: OffsetDateTime) -> Result<AccessToken, ProtocolError> {
		if self.access_token.is_blank() {
			return Err(ProtocolError::UnexpectedShape {
				what: "token response",
				message: "accessToken is empty".into(),
			});
		}
		if self.expires_in < 0 {
			return Err(ProtocolError::UnexpectedShape {
				what: "token response",
				message: format!("expiresIn is negative ({})", self.expires_in),
			});
		}

		let expires_at = issued_at.checked_add(Duration::seconds(self.expires_in)).ok_or_else(|| {
			ProtocolError::UnexpectedShape {
				what: "token response",
				message: format!("expiresIn is out of range ({})", self.expires_in),
			}
		})?;

		Ok(AccessToken {
			secret: self.access_token,
			token_type: self.token_type,
			expires_at,
			generation: 0,
		})
	}
}

fn default_token_type() -> String {
	DEFAULT_TOKEN_TYPE.into()
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn token_response_builds_the_authorization_value() {
		let issued_at = datetime!(2025-01-01 00:00 UTC);
		let token = TokenResponse::parse(br#"{"accessToken":"abc","tokenType":"Bearer","expiresIn":3600}"#)
			.and_then(|response| response.into_token(issued_at))
			.expect("Well-formed token response should convert.");

		assert_eq!(token.header_value(), "Bearer abc");
		assert_eq!(token.expires_at(), datetime!(2025-01-01 01:00 UTC));
		assert!(!format!("{token:?}").contains("abc"));
	}

	#[test]
	fn freshness_honours_the_safety_margin() {
		let token = AccessToken::new("abc", "Bearer", datetime!(2025-01-01 01:00 UTC));
		let margin = Duration::seconds(30);

		assert!(token.is_fresh_at(datetime!(2025-01-01 00:59 UTC), margin));
		assert!(!token.is_fresh_at(datetime!(2025-01-01 00:59:40 UTC), margin));
		assert!(!token.is_expired_at(datetime!(2025-01-01 00:59:40 UTC)));
		assert!(token.is_expired_at(datetime!(2025-01-01 01:00 UTC)));
	}

	#[test]
	fn malformed_token_responses_are_rejected() {
		assert!(matches!(
			TokenResponse::parse(br#"{"tokenType":"Bearer","expiresIn":10}"#),
			Err(ProtocolError::MalformedBody { .. })
		));

		let response = TokenResponse::parse(br#"{"accessToken":"","expiresIn":10}"#)
			.expect("Empty token still decodes.");

		assert!(matches!(
			response.into_token(OffsetDateTime::now_utc()),
			Err(ProtocolError::UnexpectedShape { .. })
		));

		let response = TokenResponse::parse(
			br#"{"accessToken":"t","tokenType":"Bearer","expiresIn":9223372036854775807}"#,
		)
		.expect("Huge lifetimes still decode.");

		assert!(matches!(
			response.into_token(OffsetDateTime::now_utc()),
			Err(ProtocolError::UnexpectedShape { .. })
		));
	}
}
