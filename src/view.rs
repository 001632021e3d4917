//! Typed views decoded at the response boundary.
//!
//! Payloads are parsed into concrete types up front; a shape mismatch fails with
//! [`ProtocolError::MalformedBody`] carrying the JSON path instead of surfacing later as a
//! missing attribute.

// self
use crate::{_prelude::*, error::ProtocolError};

/// Decodes a JSON document into `T`, reporting the failing path on mismatch.
pub fn decode<T>(what: &'static str, bytes: &[u8]) -> Result<T, ProtocolError>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(bytes);
	let value = serde_path_to_error::deserialize(&mut de)
		.map_err(|source| ProtocolError::MalformedBody { what, source })?;

	de.end().map_err(|e| ProtocolError::UnexpectedShape { what, message: e.to_string() })?;

	Ok(value)
}

/// Decodes an already parsed JSON value into `T`.
pub fn decode_value<T>(what: &'static str, value: serde_json::Value) -> Result<T, ProtocolError>
where
	T: DeserializeOwned,
{
	serde_path_to_error::deserialize(value)
		.map_err(|source| ProtocolError::MalformedBody { what, source })
}

/// Error document returned by the service for `4xx` responses.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorView {
	/// Machine-readable error code (e.g. `DuplicateCollection`).
	#[serde(default)]
	pub code: Option<String>,
	/// Human-readable message.
	#[serde(default)]
	pub message: Option<String>,
	/// Free-form details (schema check locations, etc.).
	#[serde(default)]
	pub details: Option<serde_json::Value>,
}
impl ErrorView {
	/// Attempts to decode an error body; non-JSON or non-object bodies yield `None`.
	pub fn from_body(body: &[u8]) -> Option<Self> {
		match serde_json::from_slice::<serde_json::Value>(body).ok()? {
			value @ serde_json::Value::Object(_) => serde_json::from_value(value).ok(),
			_ => None,
		}
	}
}
impl Display for ErrorView {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match (&self.code, &self.message) {
			(Some(code), Some(message)) => write!(f, "code: {code}, message: {message}"),
			(Some(code), None) => write!(f, "code: {code}"),
			(None, Some(message)) => write!(f, "message: {message}"),
			(None, None) => f.write_str("no details"),
		}
	}
}

/// Identifier of a specific resource version, sent back as `If-Match` on edits.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag(String);
impl Tag {
	/// Wraps a raw entity tag.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw entity tag.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Debug for Tag {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Tag({})", self.0)
	}
}
impl Display for Tag {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Debug, Deserialize)]
	struct Collection {
		#[allow(dead_code)]
		id: u64,
		#[allow(dead_code)]
		name: String,
	}

	#[test]
	fn decode_reports_the_failing_path() {
		let err = decode::<Vec<Collection>>("collections", br#"[{"id":1,"name":"a"},{"id":"x"}]"#)
			.expect_err("Mistyped id should fail to decode.");

		match err {
			ProtocolError::MalformedBody { what, source } => {
				assert_eq!(what, "collections");
				assert_eq!(source.path().to_string(), "[1].id");
			},
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}

	#[test]
	fn error_view_ignores_non_object_bodies() {
		assert!(ErrorView::from_body(b"upstream exploded").is_none());
		assert!(ErrorView::from_body(b"[1,2]").is_none());

		let view = ErrorView::from_body(br#"{"code":"SchemaNotFound"}"#)
			.expect("Object bodies should decode into an error view.");

		assert_eq!(view.to_string(), "code: SchemaNotFound");
	}
}
