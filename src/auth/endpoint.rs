//! Token endpoint client: `GET /auth/token` on the API host with the API key header.
//!
//! The token path is absolute: any path on the configured API URL is replaced, so an API URL
//! of `https://host/api` still authenticates against `https://host/auth/token`.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, AsyncTokenSource, Credential, TokenFuture, TokenResponse, TokenSource},
	error::{AuthError, ConfigError, TransportError},
	http::{
		API_KEY_HEADER, API_VERSION, API_VERSION_HEADER, AsyncHttpTransport, Body, HttpRequest,
		HttpTransport, Method, Response,
	},
	obs::OpKind,
	retry::{AsyncRetryingTransport, RetryingTransport},
	view::ErrorView,
};

/// Absolute path of the token endpoint on the API host.
pub const TOKEN_PATH: &str = "/auth/token";

const USER_AGENT_HEADER: &str = "User-Agent";

/// Exchanges the API key for short-lived tokens over a shared retrying transport.
#[derive(Debug)]
pub struct TokenEndpoint<R> {
	url: Url,
	user_agent: String,
	transport: Arc<R>,
}
impl<R> TokenEndpoint<R> {
	/// Targets [`TOKEN_PATH`] on the API host through `transport`.
	pub fn new(
		api_url: &Url,
		user_agent: impl Into<String>,
		transport: Arc<R>,
	) -> Result<Self, ConfigError> {
		let url = api_url.join(TOKEN_PATH).map_err(|source| ConfigError::InvalidUrl { source })?;

		Ok(Self { url, user_agent: user_agent.into(), transport })
	}

	/// Resolved token endpoint URL.
	pub fn url(&self) -> &Url {
		&self.url
	}

	fn request(&self, credential: &Credential) -> HttpRequest {
		HttpRequest {
			method: Method::Get,
			url: self.url.clone(),
			headers: vec![
				(API_KEY_HEADER.into(), credential.api_key.expose().into()),
				(API_VERSION_HEADER.into(), API_VERSION.into()),
				(USER_AGENT_HEADER.into(), self.user_agent.clone()),
			],
			body: Body::Empty,
			retry_eligible: true,
		}
	}
}
impl<T> TokenSource for TokenEndpoint<RetryingTransport<T>>
where
	T: HttpTransport,
{
	fn fetch(&self, credential: &Credential) -> Result<AccessToken, AuthError> {
		let request = self.request(credential);

		interpret(self.transport.execute_as(OpKind::TokenRefresh, &request, None))
	}
}
impl<T> AsyncTokenSource for TokenEndpoint<AsyncRetryingTransport<T>>
where
	T: AsyncHttpTransport,
{
	fn fetch<'a>(&'a self, credential: &'a Credential) -> TokenFuture<'a> {
		Box::pin(async move {
			let request = self.request(credential);

			interpret(self.transport.execute_as(OpKind::TokenRefresh, &request, None).await)
		})
	}
}

fn interpret(result: Result<Response, TransportError>) -> Result<AccessToken, AuthError> {
	let response = result.map_err(|source| AuthError::Transport { source })?;

	if !response.is_success() {
		return Err(AuthError::Rejected {
			status: response.status,
			content: ErrorView::from_body(&response.body),
		});
	}

	TokenResponse::parse(&response.body)
		.and_then(|parsed| parsed.into_token(OffsetDateTime::now_utc()))
		.map_err(|source| AuthError::InvalidTokenResponse { source })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::ApiKey,
		http::{FailureKind, TransportFailure},
		retry::RetryPolicy,
	};

	struct Scripted(Mutex<Vec<Result<Response, TransportFailure>>>, Mutex<Vec<HttpRequest>>);
	impl HttpTransport for Scripted {
		fn send(&self, request: &HttpRequest) -> Result<Response, TransportFailure> {
			self.1.lock().push(request.clone());

			self.0.lock().remove(0)
		}
	}

	fn endpoint(
		script: Vec<Result<Response, TransportFailure>>,
	) -> TokenEndpoint<RetryingTransport<Arc<Scripted>>> {
		let transport = Arc::new(Scripted(Mutex::new(script), Mutex::new(Vec::new())));
		let policy = RetryPolicy::default()
			.with_backoff(crate::retry::Backoff::none())
			.expect("Zero backoff should be valid.");

		TokenEndpoint::new(
			&Url::parse("https://intel.example.com/api/").expect("Fixture URL should parse."),
			"threat-intel-client/test",
			Arc::new(RetryingTransport::new(transport, policy)),
		)
		.expect("Endpoint should build.")
	}

	fn credential() -> Credential {
		Credential { api_key: ApiKey::new("key-1").expect("Fixture key should be valid.") }
	}

	#[test]
	fn token_requests_carry_the_api_key_and_version() {
		let endpoint = endpoint(vec![Ok(Response::new(
			200,
			Vec::new(),
			br#"{"accessToken":"t","tokenType":"Bearer","expiresIn":60}"#.to_vec(),
		))]);
		let token = endpoint.fetch(&credential()).expect("Token exchange should succeed.");
		let sent = endpoint.transport.inner().1.lock().remove(0);

		assert_eq!(token.header_value(), "Bearer t");
		assert_eq!(sent.url.as_str(), "https://intel.example.com/auth/token");
		assert_eq!(sent.header("x-api-key"), Some("key-1"));
		assert_eq!(sent.header("x-api-version"), Some("1"));
		assert_eq!(sent.header("user-agent"), Some("threat-intel-client/test"));
	}

	#[test]
	fn rejected_keys_surface_the_status() {
		let endpoint = endpoint(vec![Ok(Response::new(
			401,
			Vec::new(),
			br#"{"code":"InvalidAPIKey","message":"unknown key"}"#.to_vec(),
		))]);
		let err = endpoint.fetch(&credential()).expect_err("Rejected key should fail.");

		match err {
			AuthError::Rejected { status, content } => {
				assert_eq!(status, 401);
				assert_eq!(content.and_then(|view| view.code).as_deref(), Some("InvalidAPIKey"));
			},
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}

	#[test]
	fn transport_failures_are_retried_then_reported() {
		let reset = || {
			Err(TransportFailure::message(FailureKind::ConnectionReset, "connection reset by peer"))
		};
		let endpoint = endpoint(vec![reset(), reset(), reset()]);
		let err = endpoint.fetch(&credential()).expect_err("Exhausted retries should fail.");

		assert!(matches!(err, AuthError::Transport { ref source } if source.attempts == 3));
	}
}
