//! reqwest-backed transports for the blocking and async sessions.
//!
//! Both transports are built from [`Config`]: they send the default `User-Agent` and
//! `X-Api-Version` headers, honour `ssl_verify`, the per-attempt timeouts, and the keep-alive
//! limits, and cap in-flight requests at `max_connections` with a permit gate. reqwest has no
//! dedicated write timeout, so the write bound is folded into the per-attempt total.

// std
use std::io::ErrorKind;
// crates.io
use async_lock::Semaphore;
use parking_lot::Condvar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
// self
use crate::{
	_prelude::*,
	config::Config,
	error::ConfigError,
	http::{
		API_VERSION, AsyncHttpTransport, FailureKind, Headers, HttpRequest,
		HttpTransport, Method, Response, TransportFailure, TransportFuture,
	},
};

const API_VERSION_HEADER_LOWER: &str = "x-api-version";

/// Async transport over a shared [`reqwest::Client`].
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: reqwest::Client,
	gate: Arc<Semaphore>,
}
impl ReqwestTransport {
	/// Builds the transport from client configuration.
	pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
		let timeouts = config.timeouts();
		let limits = config.limits();
		let client = reqwest::Client::builder()
			.default_headers(default_headers())
			.user_agent(config.user_agent())
			.danger_accept_invalid_certs(!config.ssl_verify())
			.connect_timeout(timeouts.connect)
			.read_timeout(timeouts.read)
			.timeout(timeouts.total())
			.pool_max_idle_per_host(limits.max_keepalive_connections)
			.pool_idle_timeout(limits.keepalive_expiry)
			.build()?;

		Ok(Self::with_client(client, limits.max_connections))
	}

	/// Wraps an existing client, allowing at most `max_connections` requests in flight.
	pub fn with_client(client: reqwest::Client, max_connections: usize) -> Self {
		Self { client, gate: Arc::new(Semaphore::new(max_connections.max(1))) }
	}

	async fn round_trip(&self, request: &HttpRequest) -> Result<Response, TransportFailure> {
		let _permit = self.gate.acquire().await;
		let mut builder =
			self.client.request(reqwest_method(request.method), request.url.clone());

		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if !request.body.as_bytes().is_empty() {
			builder = builder.body(request.body.as_bytes().to_vec());
		}

		let response = builder.send().await.map_err(classify)?;
		let status = response.status().as_u16();
		let headers = collect_headers(response.headers());
		let body = response.bytes().await.map_err(classify_body)?;

		Ok(Response::new(status, headers, body.to_vec()))
	}
}
impl AsyncHttpTransport for ReqwestTransport {
	fn send<'a>(&'a self, request: &'a HttpRequest) -> TransportFuture<'a> {
		Box::pin(self.round_trip(request))
	}
}

/// Blocking transport over a shared [`reqwest::blocking::Client`].
///
/// Must not be constructed or dropped inside an async runtime.
#[derive(Clone, Debug)]
pub struct BlockingReqwestTransport {
	client: reqwest::blocking::Client,
	gate: Arc<PermitPool>,
}
impl BlockingReqwestTransport {
	/// Builds the transport from client configuration.
	pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
		let timeouts = config.timeouts();
		let limits = config.limits();
		let client = reqwest::blocking::Client::builder()
			.default_headers(default_headers())
			.user_agent(config.user_agent())
			.danger_accept_invalid_certs(!config.ssl_verify())
			.connect_timeout(timeouts.connect)
			.timeout(timeouts.total())
			.pool_max_idle_per_host(limits.max_keepalive_connections)
			.pool_idle_timeout(limits.keepalive_expiry)
			.build()?;

		Ok(Self::with_client(client, limits.max_connections))
	}

	/// Wraps an existing client, allowing at most `max_connections` requests in flight.
	pub fn with_client(client: reqwest::blocking::Client, max_connections: usize) -> Self {
		Self { client, gate: Arc::new(PermitPool::new(max_connections)) }
	}
}
impl HttpTransport for BlockingReqwestTransport {
	fn send(&self, request: &HttpRequest) -> Result<Response, TransportFailure> {
		let _permit = self.gate.acquire();
		let mut builder =
			self.client.request(reqwest_method(request.method), request.url.clone());

		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if !request.body.as_bytes().is_empty() {
			builder = builder.body(request.body.as_bytes().to_vec());
		}

		let response = builder.send().map_err(classify)?;
		let status = response.status().as_u16();
		let headers = collect_headers(response.headers());
		let body = response.bytes().map_err(classify_body)?;

		Ok(Response::new(status, headers, body.to_vec()))
	}
}

/// Counting permit pool for blocking callers.
#[derive(Debug)]
struct PermitPool {
	available: Mutex<usize>,
	released: Condvar,
}
impl PermitPool {
	fn new(permits: usize) -> Self {
		Self { available: Mutex::new(permits.max(1)), released: Condvar::new() }
	}

	fn acquire(&self) -> Permit<'_> {
		let mut available = self.available.lock();

		while *available == 0 {
			self.released.wait(&mut available);
		}

		*available -= 1;

		Permit(self)
	}
}

struct Permit<'a>(&'a PermitPool);
impl Drop for Permit<'_> {
	fn drop(&mut self) {
		*self.0.available.lock() += 1;
		self.0.released.notify_one();
	}
}

fn default_headers() -> HeaderMap {
	let mut headers = HeaderMap::new();

	headers.insert(
		HeaderName::from_static(API_VERSION_HEADER_LOWER),
		HeaderValue::from_static(API_VERSION),
	);

	headers
}

fn reqwest_method(method: Method) -> reqwest::Method {
	match method {
		Method::Get => reqwest::Method::GET,
		Method::Head => reqwest::Method::HEAD,
		Method::Post => reqwest::Method::POST,
		Method::Put => reqwest::Method::PUT,
		Method::Patch => reqwest::Method::PATCH,
		Method::Delete => reqwest::Method::DELETE,
	}
}

fn collect_headers(map: &HeaderMap) -> Headers {
	map.iter()
		.map(|(name, value)| {
			(name.as_str().to_owned(), String::from_utf8_lossy(value.as_bytes()).into_owned())
		})
		.collect()
}

fn classify(err: ReqwestError) -> TransportFailure {
	let kind = if err.is_connect() && err.is_timeout() {
		FailureKind::ConnectTimeout
	} else if err.is_connect() {
		FailureKind::Connect
	} else if err.is_timeout() {
		FailureKind::ReadTimeout
	} else if err.is_body() || err.is_decode() {
		FailureKind::Body
	} else if is_connection_reset(&err) || err.is_request() {
		// hyper reports a peer closing mid-exchange as a request error.
		FailureKind::ConnectionReset
	} else {
		FailureKind::Other
	};

	TransportFailure::new(kind, err)
}

fn classify_body(err: ReqwestError) -> TransportFailure {
	if err.is_timeout() {
		TransportFailure::new(FailureKind::ReadTimeout, err)
	} else {
		TransportFailure::new(FailureKind::Body, err)
	}
}

fn is_connection_reset(err: &(dyn StdError + 'static)) -> bool {
	let mut source = err.source();

	while let Some(cause) = source {
		if let Some(io) = cause.downcast_ref::<std::io::Error>() {
			return matches!(
				io.kind(),
				ErrorKind::ConnectionReset
					| ErrorKind::ConnectionAborted
					| ErrorKind::BrokenPipe
					| ErrorKind::UnexpectedEof
			);
		}

		source = cause.source();
	}

	false
}
