//! Client-level error types shared by the session, transport, token, and pagination layers.

// self
use crate::{
	_prelude::*,
	http::{FailureKind, Response, TransportFailure},
	view::ErrorView,
};

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

const BODY_PREVIEW_LIMIT: usize = 256;

/// Canonical client error exposed by public APIs.
///
/// Every failed call surfaces exactly one of these kinds.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Invalid client setup; raised at construction and never retried.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Credential rejected, refresh failed, or a second `401` after re-authentication.
	#[error(transparent)]
	Authentication(#[from] AuthError),
	/// Connection or timeout failures that exhausted the retry budget.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Server response violated the expected contract.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
	/// Non-2xx HTTP status mapped to a typed error.
	#[error(transparent)]
	Status(#[from] StatusError),
}
impl Error {
	/// Returns the HTTP status attached to the error, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status(err) => Some(err.status),
			Self::Authentication(AuthError::Rejected { status, .. }) => Some(*status),
			Self::Authentication(AuthError::Unauthorized) => Some(401),
			_ => None,
		}
	}

	/// Returns the status kind when the error is status-mapped.
	pub fn status_kind(&self) -> Option<StatusKind> {
		match self {
			Self::Status(err) => Some(err.kind),
			_ => None,
		}
	}

	/// Returns `true` for `404` responses.
	pub fn is_not_found(&self) -> bool {
		matches!(self.status_kind(), Some(StatusKind::NotFound))
	}

	/// Returns `true` for `409` responses.
	pub fn is_conflict(&self) -> bool {
		matches!(self.status_kind(), Some(StatusKind::Conflict))
	}

	/// Returns `true` for `5xx` responses.
	pub fn is_server_error(&self) -> bool {
		matches!(self.status_kind(), Some(StatusKind::Server))
	}
}

/// Configuration and validation failures raised while building a client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// API key was empty or whitespace.
	#[error("API key must not be empty.")]
	EmptyApiKey,
	/// Base URL could not be parsed.
	#[error("API URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Base URL uses a scheme other than `http` or `https`.
	#[error("API URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Offending URL.
		url: String,
	},
	/// A timeout value was zero.
	#[error("The {name} timeout must be greater than zero.")]
	InvalidTimeout {
		/// Timeout label (`connect`, `read`, `write`).
		name: &'static str,
	},
	/// Retry policy parameters are out of range.
	#[error("Retry policy is invalid: {reason}.")]
	InvalidRetry {
		/// Human-readable reason.
		reason: String,
	},
	/// Connection limits are inconsistent.
	#[error("Connection limits are invalid: {reason}.")]
	InvalidLimits {
		/// Human-readable reason.
		reason: String,
	},
	/// Header name or value cannot be sent over HTTP.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Header name.
		name: String,
	},
	/// An absolute request URL points outside the configured API origin.
	#[error("Request URL {url} is outside the API origin.")]
	ForeignOrigin {
		/// Offending URL.
		url: String,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Authentication failures surfaced by the token refresher and the session.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// The token endpoint could not be reached.
	#[error("Token refresh failed.")]
	Transport {
		/// Transport failure that exhausted the retry budget.
		#[source]
		source: TransportError,
	},
	/// The token endpoint refused the API key.
	#[error("Token endpoint rejected the API key with HTTP {status}.")]
	Rejected {
		/// HTTP status returned by the token endpoint.
		status: u16,
		/// Decoded error body, when present.
		content: Option<ErrorView>,
	},
	/// The token endpoint answered with an unusable body.
	#[error("Token endpoint returned an invalid token.")]
	InvalidTokenResponse {
		/// Decoding failure.
		#[source]
		source: ProtocolError,
	},
	/// A request was rejected again after one re-authentication.
	#[error("Request was rejected with HTTP 401 after re-authentication.")]
	Unauthorized,
}

/// Transport-level failure after the retry budget is spent.
#[derive(Debug, ThisError)]
#[error("Transport failed after {attempts} attempt(s): {kind}.")]
pub struct TransportError {
	/// Number of network attempts actually made.
	pub attempts: u32,
	/// Classification of the last failure.
	pub kind: FailureKind,
	/// Last underlying cause.
	#[source]
	pub source: BoxError,
}
impl TransportError {
	/// Builds the exhausted-budget error from the last attempt's failure.
	pub fn exhausted(attempts: u32, failure: TransportFailure) -> Self {
		Self { attempts, kind: failure.kind, source: failure.source }
	}
}

/// Server responses that violate the expected contract.
#[derive(Debug, ThisError)]
pub enum ProtocolError {
	/// The server handed back the cursor it was just given.
	#[error("Pagination cursor `{cursor}` did not advance.")]
	NonProgressingCursor {
		/// Repeated cursor value.
		cursor: String,
	},
	/// A JSON body failed to decode into the expected view.
	#[error("Response body for {what} is malformed at `{}`.", .source.path())]
	MalformedBody {
		/// Label of the value being decoded.
		what: &'static str,
		/// Path-aware decoding failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The body decoded but its shape is not one the client understands.
	#[error("Response body for {what} has an unexpected shape: {message}.")]
	UnexpectedShape {
		/// Label of the value being decoded.
		what: &'static str,
		/// Human-readable description.
		message: String,
	},
	/// A response header could not be interpreted.
	#[error("Response header `{name}` is invalid.")]
	InvalidHeader {
		/// Header name.
		name: &'static str,
	},
}

/// Deterministic classification of HTTP error statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusKind {
	/// `400`: request failed validation; retrying will never work.
	InvalidRequest,
	/// `401`: credentials missing or stale.
	Unauthorized,
	/// `403`: operation forbidden for this API key.
	Forbidden,
	/// `404`: resource not found.
	NotFound,
	/// `409`: resource already exists.
	Conflict,
	/// `412`: resource changed since it was read; re-read and re-apply.
	ResourceModified,
	/// `413`: request body too large.
	PayloadTooLarge,
	/// `422`: request is valid but violates business rules.
	Semantic,
	/// Any other `4xx`.
	Client,
	/// Any `5xx`.
	Server,
	/// Anything outside `4xx`/`5xx` that is still not a success.
	Unexpected,
}
impl StatusKind {
	/// Maps an HTTP status code to its kind.
	pub const fn from_status(status: u16) -> Self {
		match status {
			400 => Self::InvalidRequest,
			401 => Self::Unauthorized,
			403 => Self::Forbidden,
			404 => Self::NotFound,
			409 => Self::Conflict,
			412 => Self::ResourceModified,
			413 => Self::PayloadTooLarge,
			422 => Self::Semantic,
			400..=499 => Self::Client,
			500..=599 => Self::Server,
			_ => Self::Unexpected,
		}
	}

	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::InvalidRequest => "invalid_request",
			Self::Unauthorized => "unauthorized",
			Self::Forbidden => "forbidden",
			Self::NotFound => "not_found",
			Self::Conflict => "conflict",
			Self::ResourceModified => "resource_modified",
			Self::PayloadTooLarge => "payload_too_large",
			Self::Semantic => "semantic",
			Self::Client => "client",
			Self::Server => "server",
			Self::Unexpected => "unexpected",
		}
	}
}
impl Display for StatusKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Typed error for a non-2xx response.
#[derive(Clone, Debug, ThisError)]
#[error("API responded with HTTP {status} ({kind}){}.", describe(.content, .body_preview))]
pub struct StatusError {
	/// HTTP status code.
	pub status: u16,
	/// Classification of the status.
	pub kind: StatusKind,
	/// Structured error body, when the server sent one.
	pub content: Option<ErrorView>,
	/// Truncated raw body for non-JSON payloads.
	pub body_preview: Option<String>,
}
impl StatusError {
	/// Builds the typed error from a non-2xx response.
	pub fn from_response(response: &Response) -> Self {
		let status = response.status;
		let content = ErrorView::from_body(&response.body);
		let body_preview = if content.is_none() && !response.body.is_empty() {
			Some(preview(&response.body))
		} else {
			None
		};

		Self { status, kind: StatusKind::from_status(status), content, body_preview }
	}
}

fn describe(content: &Option<ErrorView>, preview: &Option<String>) -> String {
	match (content, preview) {
		(Some(view), _) => format!(": {view}"),
		(None, Some(text)) => format!(": {text}"),
		(None, None) => String::new(),
	}
}

fn preview(body: &[u8]) -> String {
	let text = String::from_utf8_lossy(body);

	if text.chars().count() <= BODY_PREVIEW_LIMIT {
		return text.into_owned();
	}

	text.chars().take(BODY_PREVIEW_LIMIT).collect()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn status_kinds_follow_the_mapping_table() {
		assert_eq!(StatusKind::from_status(400), StatusKind::InvalidRequest);
		assert_eq!(StatusKind::from_status(404), StatusKind::NotFound);
		assert_eq!(StatusKind::from_status(409), StatusKind::Conflict);
		assert_eq!(StatusKind::from_status(412), StatusKind::ResourceModified);
		assert_eq!(StatusKind::from_status(418), StatusKind::Client);
		assert_eq!(StatusKind::from_status(503), StatusKind::Server);
		assert_eq!(StatusKind::from_status(302), StatusKind::Unexpected);
	}

	#[test]
	fn status_error_decodes_structured_bodies() {
		let response = Response::new(
			409,
			Vec::new(),
			br#"{"code":"DuplicateCollection","message":"already there"}"#.to_vec(),
		);
		let err = StatusError::from_response(&response);
		let view = err.content.as_ref().expect("Structured error body should decode.");

		assert_eq!(err.kind, StatusKind::Conflict);
		assert_eq!(view.code.as_deref(), Some("DuplicateCollection"));
		assert!(err.body_preview.is_none());
		assert!(err.to_string().contains("DuplicateCollection"));
	}

	#[test]
	fn status_error_keeps_text_previews() {
		let response = Response::new(502, Vec::new(), b"bad gateway".to_vec());
		let err = Error::from(StatusError::from_response(&response));

		assert!(err.is_server_error());
		assert_eq!(err.status(), Some(502));
		assert!(err.to_string().contains("bad gateway"));
	}

	#[test]
	fn transport_error_exposes_its_source() {
		let failure = TransportFailure::new(
			FailureKind::ConnectionReset,
			std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer"),
		);
		let err = Error::from(TransportError::exhausted(3, failure));
		let source = StdError::source(&err).expect("Transport error should expose its cause.");

		assert!(err.to_string().contains("3 attempt(s)"));
		assert_eq!(source.to_string(), "reset by peer");
	}
}
