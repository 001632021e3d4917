//! Scripted transports shared by the integration tests.

#![allow(dead_code)]

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// self
use threat_intel_client::{
	_preludet::*,
	config::Config,
	http::{
		AsyncHttpTransport, FailureKind, HttpRequest, HttpTransport, Response, TransportFailure,
		TransportFuture,
	},
	retry::{Backoff, RetryPolicy},
};

pub const API_URL: &str = "https://intel.example.com/api";
pub const API_KEY: &str = "integration-key";

pub type Reply = std::result::Result<Response, TransportFailure>;

/// Transport that answers token requests and API requests from two separate scripts.
///
/// When the token script runs dry, a fresh token `token-N` valid for an hour is issued.
#[derive(Default)]
pub struct ScriptedTransport {
	token_replies: Mutex<VecDeque<Reply>>,
	api_replies: Mutex<VecDeque<Reply>>,
	api_requests: Mutex<Vec<HttpRequest>>,
	token_calls: AtomicUsize,
	api_calls: AtomicUsize,
	delay: StdDuration,
}
impl ScriptedTransport {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_delay(mut self, delay: StdDuration) -> Self {
		self.delay = delay;

		self
	}

	pub fn token_reply(self, reply: Reply) -> Self {
		self.token_replies.lock().push_back(reply);

		self
	}

	pub fn api_reply(self, reply: Reply) -> Self {
		self.api_replies.lock().push_back(reply);

		self
	}

	pub fn api_replies<I>(self, replies: I) -> Self
	where
		I: IntoIterator<Item = Reply>,
	{
		self.api_replies.lock().extend(replies);

		self
	}

	pub fn token_calls(&self) -> usize {
		self.token_calls.load(Ordering::SeqCst)
	}

	pub fn api_calls(&self) -> usize {
		self.api_calls.load(Ordering::SeqCst)
	}

	pub fn api_requests(&self) -> Vec<HttpRequest> {
		self.api_requests.lock().clone()
	}

	fn reply(&self, request: &HttpRequest) -> Reply {
		if request.url.path().ends_with("/auth/token") {
			let call = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;

			return self
				.token_replies
				.lock()
				.pop_front()
				.unwrap_or_else(|| Ok(token(&format!("token-{call}"), 3_600)));
		}

		self.api_calls.fetch_add(1, Ordering::SeqCst);
		self.api_requests.lock().push(request.clone());
		self.api_replies
			.lock()
			.pop_front()
			.unwrap_or_else(|| Err(TransportFailure::message(FailureKind::Other, "script exhausted")))
	}
}
impl HttpTransport for ScriptedTransport {
	fn send(&self, request: &HttpRequest) -> std::result::Result<Response, TransportFailure> {
		if !self.delay.is_zero() {
			std::thread::sleep(self.delay);
		}

		self.reply(request)
	}
}
impl AsyncHttpTransport for ScriptedTransport {
	fn send<'a>(&'a self, request: &'a HttpRequest) -> TransportFuture<'a> {
		Box::pin(async move {
			if !self.delay.is_zero() {
				tokio::time::sleep(self.delay).await;
			}

			self.reply(request)
		})
	}
}

pub fn config() -> Config {
	config_with_retry(
		RetryPolicy::default()
			.with_backoff(Backoff::none())
			.expect("Zero backoff should be a valid policy."),
	)
}

pub fn config_with_retry(retry: RetryPolicy) -> Config {
	Config::builder(API_KEY)
		.api_url(API_URL)
		.retry(retry)
		.build()
		.expect("Integration test configuration should build.")
}

pub fn json(status: u16, body: &str) -> Reply {
	Ok(Response::new(
		status,
		vec![("content-type".into(), "application/json".into())],
		body.as_bytes().to_vec(),
	))
}

pub fn token(value: &str, expires_in: i64) -> Response {
	Response::new(
		200,
		vec![("content-type".into(), "application/json".into())],
		format!(r#"{{"accessToken":"{value}","tokenType":"Bearer","expiresIn":{expires_in}}}"#)
			.into_bytes(),
	)
}

pub fn reset() -> Reply {
	Err(TransportFailure::new(
		FailureKind::ConnectionReset,
		std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset by peer"),
	))
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct Item {
	pub id: u64,
}
