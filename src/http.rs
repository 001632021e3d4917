//! Transport primitives shared by the blocking and async sessions.
//!
//! [`RequestDescriptor`] is the logical, base-URL-relative request a resource client
//! builds once per call. Sessions resolve it into an [`HttpRequest`] (absolute URL,
//! default headers, authorization) and hand that to an [`HttpTransport`] or
//! [`AsyncHttpTransport`]. Transports only report what happened on the wire: a buffered
//! [`Response`] for any status line, or a classified [`TransportFailure`]. Retry and
//! status mapping live above them.

#[cfg(feature = "reqwest")] mod reqwest_transport;
#[cfg(feature = "reqwest")] pub use reqwest_transport::*;

// self
use crate::{
	_prelude::*,
	error::{BoxError, ConfigError, ProtocolError},
	retry::RetryPolicy,
	view::{self, Tag},
};

/// Header carrying the API version expected by the service.
pub const API_VERSION_HEADER: &str = "X-Api-Version";
/// API version sent with every request.
pub const API_VERSION: &str = "1";
/// Header carrying the bearer credential.
pub const AUTHORIZATION_HEADER: &str = "Authorization";
/// Header carrying the long-lived API key on token requests.
pub const API_KEY_HEADER: &str = "X-Api-Key";
/// Default `User-Agent` value.
pub const USER_AGENT: &str = concat!("threat-intel-client/v", env!("CARGO_PKG_VERSION"));

const IF_MATCH_HEADER: &str = "If-Match";
const CONTENT_TYPE_HEADER: &str = "Content-Type";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Ordered header list; lookups are case-insensitive.
pub type Headers = Vec<(String, String)>;

/// HTTP verbs used by the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
	/// `GET`.
	Get,
	/// `HEAD`.
	Head,
	/// `POST`.
	Post,
	/// `PUT`.
	Put,
	/// `PATCH`.
	Patch,
	/// `DELETE`.
	Delete,
}
impl Method {
	/// Returns the wire name of the verb.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Head => "HEAD",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
		}
	}

	/// Returns `true` for verbs without side effects.
	pub const fn is_safe(self) -> bool {
		matches!(self, Self::Get | Self::Head)
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Request payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Body {
	/// No body.
	#[default]
	Empty,
	/// Serialized JSON document.
	Json(Vec<u8>),
	/// Raw octets with an explicit content type (file uploads, multipart parts).
	Raw {
		/// Value of the `Content-Type` header.
		content_type: String,
		/// Payload bytes.
		data: Vec<u8>,
	},
}
impl Body {
	/// Returns the content type implied by the body, if any.
	pub fn content_type(&self) -> Option<&str> {
		match self {
			Self::Empty => None,
			Self::Json(_) => Some(JSON_CONTENT_TYPE),
			Self::Raw { content_type, .. } => Some(content_type),
		}
	}

	/// Returns the payload bytes.
	pub fn as_bytes(&self) -> &[u8] {
		match self {
			Self::Empty => &[],
			Self::Json(data) | Self::Raw { data, .. } => data,
		}
	}
}

/// Logical request built once per call, before any retry.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
	/// HTTP verb.
	pub method: Method,
	/// Path relative to the configured base URL, or an absolute URL on the same origin.
	pub path: String,
	/// Query parameters in insertion order.
	pub query: Vec<(String, String)>,
	/// Extra headers for this call.
	pub headers: Headers,
	/// Request payload.
	pub body: Body,
	/// Marks a mutating call as safe to repeat.
	pub idempotent: bool,
	/// Per-call retry policy override.
	pub retry: Option<RetryPolicy>,
}
impl RequestDescriptor {
	/// Creates a descriptor for the provided verb and path.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			headers: Vec::new(),
			body: Body::Empty,
			idempotent: false,
			retry: None,
		}
	}

	/// `GET` descriptor.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// `POST` descriptor.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// `PUT` descriptor.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::Put, path)
	}

	/// `PATCH` descriptor.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::Patch, path)
	}

	/// `DELETE` descriptor.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	/// Appends a query parameter.
	pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
		self.query.push((key.into(), value.to_string()));

		self
	}

	/// Appends a query parameter when the value is present.
	pub fn query_opt<V>(self, key: impl Into<String>, value: Option<V>) -> Self
	where
		V: ToString,
	{
		match value {
			Some(value) => self.query(key, value),
			None => self,
		}
	}

	/// Replaces (or inserts) a query parameter.
	pub fn set_query(mut self, key: &str, value: impl ToString) -> Self {
		self.query.retain(|(name, _)| name != key);
		self.query.push((key.to_owned(), value.to_string()));

		self
	}

	/// Appends a header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Sets a JSON body.
	pub fn json(mut self, value: &serde_json::Value) -> Self {
		self.body = Body::Json(value.to_string().into_bytes());

		self
	}

	/// Sets a raw body with an explicit content type.
	pub fn bytes(mut self, content_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
		self.body = Body::Raw { content_type: content_type.into(), data: data.into() };

		self
	}

	/// Adds an `If-Match` precondition for edits.
	pub fn if_match(self, tag: &Tag) -> Self {
		self.header(IF_MATCH_HEADER, tag.as_str())
	}

	/// Declares the call safe to repeat so the transport may retry it.
	pub fn mark_idempotent(mut self) -> Self {
		self.idempotent = true;

		self
	}

	/// Overrides the client's default retry policy for this call.
	pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.retry = Some(policy);

		self
	}

	/// Returns `true` when the transport may repeat this request.
	pub fn is_retry_eligible(&self) -> bool {
		self.method.is_safe() || self.idempotent
	}

	/// Resolves the descriptor against the base URL.
	pub fn resolve(&self, base: &Url) -> Result<HttpRequest, ConfigError> {
		let mut url = join_url(base, &self.path)?;

		if !self.query.is_empty() {
			let mut pairs = url.query_pairs_mut();

			for (key, value) in &self.query {
				pairs.append_pair(key, value);
			}
		}

		let mut headers = self.headers.clone();

		if let Some(content_type) = self
			.body
			.content_type()
			.filter(|_| find_header(&headers, CONTENT_TYPE_HEADER).is_none())
		{
			headers.push((CONTENT_TYPE_HEADER.into(), content_type.into()));
		}

		Ok(HttpRequest {
			method: self.method,
			url,
			headers,
			body: self.body.clone(),
			retry_eligible: self.is_retry_eligible(),
		})
	}
}

/// Absolute request handed to a transport.
#[derive(Clone, Debug)]
pub struct HttpRequest {
	/// HTTP verb.
	pub method: Method,
	/// Absolute URL including the query string.
	pub url: Url,
	/// Headers to send.
	pub headers: Headers,
	/// Request payload.
	pub body: Body,
	/// Whether the retrying transport may repeat the request.
	pub retry_eligible: bool,
}
impl HttpRequest {
	/// Replaces (or inserts) a header.
	pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
		self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
		self.headers.push((name.to_owned(), value.into()));
	}

	/// Looks up a header value.
	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}

	/// Returns the value of a query parameter.
	pub fn query_param(&self, name: &str) -> Option<String> {
		self.url.query_pairs().find(|(key, _)| key == name).map(|(_, value)| value.into_owned())
	}
}

/// Fully buffered HTTP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
	/// HTTP status code.
	pub status: u16,
	/// Response headers.
	pub headers: Headers,
	/// Response body.
	pub body: Vec<u8>,
}
impl Response {
	/// Creates a response from its parts.
	pub fn new(status: u16, headers: Headers, body: Vec<u8>) -> Self {
		Self { status, headers, body }
	}

	/// Returns `true` for `2xx` statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Looks up a header value.
	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}

	/// Returns the entity tag used for optimistic concurrency.
	pub fn etag(&self) -> Option<Tag> {
		self.header("ETag").map(Tag::new)
	}

	/// Decodes the body as JSON into a typed view.
	pub fn json<T>(&self, what: &'static str) -> Result<T, ProtocolError>
	where
		T: DeserializeOwned,
	{
		view::decode(what, &self.body)
	}

	/// Returns the body as UTF-8 text, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

/// Classification of failures below the HTTP status layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
	/// Connection could not be established.
	Connect,
	/// Connection establishment timed out.
	ConnectTimeout,
	/// Waiting for response bytes timed out.
	ReadTimeout,
	/// Peer reset or closed the connection mid-exchange.
	ConnectionReset,
	/// Response body could not be read after the status line arrived.
	Body,
	/// Anything else the engine reported.
	Other,
}
impl FailureKind {
	/// Returns a stable label suitable for logs and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Connect => "connect",
			Self::ConnectTimeout => "connect_timeout",
			Self::ReadTimeout => "read_timeout",
			Self::ConnectionReset => "connection_reset",
			Self::Body => "body",
			Self::Other => "other",
		}
	}
}
impl Display for FailureKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// A single failed attempt reported by a transport.
#[derive(Debug)]
pub struct TransportFailure {
	/// Failure classification.
	pub kind: FailureKind,
	/// Underlying cause.
	pub source: BoxError,
}
impl TransportFailure {
	/// Wraps a transport-specific error.
	pub fn new(kind: FailureKind, source: impl 'static + Send + Sync + StdError) -> Self {
		Self { kind, source: Box::new(source) }
	}

	/// Builds a failure from a plain message.
	pub fn message(kind: FailureKind, message: impl Into<String>) -> Self {
		let message: String = message.into();

		Self { kind, source: message.into() }
	}
}
impl Display for TransportFailure {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}: {}", self.kind, self.source)
	}
}

/// Blocking transport seam.
///
/// Implementations perform exactly one network round trip per call and never retry.
/// A response with any status line is `Ok`; only failures below the status layer are
/// reported as [`TransportFailure`].
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends the request and buffers the full response.
	fn send(&self, request: &HttpRequest) -> Result<Response, TransportFailure>;
}
impl<T> HttpTransport for Arc<T>
where
	T: ?Sized + HttpTransport,
{
	fn send(&self, request: &HttpRequest) -> Result<Response, TransportFailure> {
		(**self).send(request)
	}
}

/// Boxed future returned by [`AsyncHttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Response, TransportFailure>> + 'a + Send>>;

/// Async transport seam with the same contract as [`HttpTransport`].
///
/// The returned future must be `Send` so sessions can be driven from multi-threaded
/// executors.
pub trait AsyncHttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends the request and buffers the full response.
	fn send<'a>(&'a self, request: &'a HttpRequest) -> TransportFuture<'a>;
}
impl<T> AsyncHttpTransport for Arc<T>
where
	T: ?Sized + AsyncHttpTransport,
{
	fn send<'a>(&'a self, request: &'a HttpRequest) -> TransportFuture<'a> {
		(**self).send(request)
	}
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
	headers
		.iter()
		.find(|(key, _)| key.eq_ignore_ascii_case(name))
		.map(|(_, value)| value.as_str())
}

fn join_url(base: &Url, path: &str) -> Result<Url, ConfigError> {
	if path.starts_with("http://") || path.starts_with("https://") {
		let url = Url::parse(path).map_err(|source| ConfigError::InvalidUrl { source })?;

		// Bearer tokens are attached after resolution; never send them to another origin.
		if url.origin() != base.origin() {
			return Err(ConfigError::ForeignOrigin { url: url.to_string() });
		}

		return Ok(url);
	}

	let joined = format!(
		"{}/{}",
		base.as_str().trim_end_matches('/'),
		path.trim_start_matches('/')
	);

	Url::parse(&joined).map_err(|source| ConfigError::InvalidUrl { source })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn base() -> Url {
		Url::parse("https://intel.example.com/api").expect("Failed to parse base URL fixture.")
	}

	#[test]
	fn resolve_keeps_base_path_and_query_order() {
		let request = RequestDescriptor::get("/iocean/collections")
			.query("limit", 10)
			.query("cursor", "abc")
			.resolve(&base())
			.expect("Descriptor should resolve against the base URL.");

		assert_eq!(
			request.url.as_str(),
			"https://intel.example.com/api/iocean/collections?limit=10&cursor=abc"
		);
		assert_eq!(request.query_param("cursor").as_deref(), Some("abc"));
	}

	#[test]
	fn set_query_replaces_previous_values() {
		let descriptor = RequestDescriptor::get("items").query("cursor", "a").set_query("cursor", "b");

		assert_eq!(descriptor.query, vec![("cursor".to_string(), "b".to_string())]);
	}

	#[test]
	fn json_bodies_carry_content_type() {
		let request = RequestDescriptor::post("collections")
			.json(&serde_json::json!({ "name": "feeds" }))
			.resolve(&base())
			.expect("Descriptor should resolve.");

		assert_eq!(request.header("content-type"), Some("application/json"));
		assert_eq!(request.body.as_bytes(), br#"{"name":"feeds"}"#);
	}

	#[test]
	fn retry_eligibility_follows_method_and_marker() {
		assert!(RequestDescriptor::get("x").is_retry_eligible());
		assert!(!RequestDescriptor::post("x").is_retry_eligible());
		assert!(!RequestDescriptor::delete("x").is_retry_eligible());
		assert!(RequestDescriptor::put("x").mark_idempotent().is_retry_eligible());
	}

	#[test]
	fn absolute_urls_on_the_api_origin_resolve_as_is() {
		let request = RequestDescriptor::get("https://intel.example.com/next?cursor=z")
			.resolve(&base())
			.expect("Same-origin absolute URLs should resolve as-is.");

		assert_eq!(request.url.path(), "/next");
		assert_eq!(request.query_param("cursor").as_deref(), Some("z"));
	}

	#[test]
	fn absolute_urls_on_other_origins_are_rejected() {
		for url in [
			"https://other.example.com/next?cursor=z",
			"http://intel.example.com/next",
			"https://intel.example.com:8443/next",
		] {
			assert!(matches!(
				RequestDescriptor::get(url).resolve(&base()),
				Err(ConfigError::ForeignOrigin { .. })
			));
		}
	}

	#[test]
	fn if_match_uses_the_tag_value() {
		let tag = Tag::new("\"v42\"");
		let descriptor = RequestDescriptor::patch("collections/1").if_match(&tag);

		assert_eq!(find_header(&descriptor.headers, "if-match"), Some("\"v42\""));
	}
}
