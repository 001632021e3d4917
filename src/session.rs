//! Authenticated sessions: the single call site resource clients use.
//!
//! Each request resolves its [`RequestDescriptor`], attaches a token from the shared
//! [`TokenRefresher`], and goes through the retrying transport. A `401` triggers exactly one
//! re-authentication outside the transport retry budget: the stale token is invalidated (only
//! if no other caller has replaced it yet), a token is re-acquired, and the request is sent
//! once more. A second `401` is surfaced as [`AuthError::Unauthorized`]. Any other non-2xx
//! status is mapped to a [`StatusError`].

// self
use crate::{
	_prelude::*,
	auth::{
		AccessToken, AsyncTokenSource, CredentialStore, TokenEndpoint, TokenRefresher,
		TokenSource,
	},
	config::Config,
	error::{AuthError, ConfigError, StatusError},
	http::{
		API_VERSION, API_VERSION_HEADER, AUTHORIZATION_HEADER, AsyncHttpTransport, HttpRequest,
		HttpTransport, RequestDescriptor, Response,
	},
	obs::{self, OpKind, OpOutcome, OpSpan},
	pagination::{
		AsyncItems, AsyncPageSource, Items, Page, PageFuture, PageSource, PagedQuery,
	},
	retry::{AsyncRetryingTransport, RetryingTransport},
	view::Tag,
};

const UNAUTHORIZED: u16 = 401;
const USER_AGENT_HEADER: &str = "User-Agent";

/// Blocking authenticated session.
pub struct Session<T, S = TokenEndpoint<RetryingTransport<T>>> {
	base_url: Url,
	user_agent: String,
	transport: Arc<RetryingTransport<T>>,
	refresher: Arc<TokenRefresher<S>>,
}
impl<T> Session<T>
where
	T: HttpTransport,
{
	/// Builds a session whose tokens come from the service's token endpoint.
	pub fn new(config: &Config, transport: T) -> Result<Self, ConfigError> {
		let transport = Arc::new(RetryingTransport::new(transport, config.retry().clone()));
		let endpoint =
			TokenEndpoint::new(config.api_url(), config.user_agent(), Arc::clone(&transport))?;
		let refresher = Arc::new(TokenRefresher::new(
			CredentialStore::new(config.api_key().clone()),
			endpoint,
			config.token_safety_margin(),
		));

		Ok(Self::from_parts(config, transport, refresher))
	}
}
impl<T, S> Session<T, S>
where
	T: HttpTransport,
	S: TokenSource,
{
	/// Builds a session around an existing refresher.
	pub fn with_refresher(config: &Config, transport: T, refresher: Arc<TokenRefresher<S>>) -> Self {
		let transport = Arc::new(RetryingTransport::new(transport, config.retry().clone()));

		Self::from_parts(config, transport, refresher)
	}

	fn from_parts(
		config: &Config,
		transport: Arc<RetryingTransport<T>>,
		refresher: Arc<TokenRefresher<S>>,
	) -> Self {
		Self {
			base_url: config.api_url().clone(),
			user_agent: config.user_agent().into(),
			transport,
			refresher,
		}
	}

	/// Shared token refresher.
	pub fn refresher(&self) -> &Arc<TokenRefresher<S>> {
		&self.refresher
	}

	/// Service base URL.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Sends an authenticated request and maps error statuses.
	pub fn request(&self, descriptor: &RequestDescriptor) -> Result<Response> {
		let _span = OpSpan::new(OpKind::Request, "request").entered();

		obs::record_op_outcome(OpKind::Request, OpOutcome::Attempt);

		let result = self.authenticated(descriptor);

		obs::record_result(OpKind::Request, &result);

		result
	}

	/// `GET` a resource.
	pub fn get(&self, path: &str) -> Result<Response> {
		self.request(&RequestDescriptor::get(path))
	}

	/// `POST` a JSON document.
	pub fn post(&self, path: &str, body: &serde_json::Value) -> Result<Response> {
		self.request(&RequestDescriptor::post(path).json(body))
	}

	/// `PATCH` a resource guarded by its entity tag.
	pub fn patch(&self, path: &str, body: &serde_json::Value, tag: &Tag) -> Result<Response> {
		self.request(&RequestDescriptor::patch(path).json(body).if_match(tag))
	}

	/// `PUT` a JSON document.
	pub fn put(&self, path: &str, body: &serde_json::Value) -> Result<Response> {
		self.request(&RequestDescriptor::put(path).json(body))
	}

	/// `DELETE` a resource.
	pub fn delete(&self, path: &str) -> Result<Response> {
		self.request(&RequestDescriptor::delete(path))
	}

	/// Fetches the page at the query's position.
	pub fn first_page<V>(&self, query: &PagedQuery) -> Result<Page<V>>
	where
		V: DeserializeOwned,
	{
		self.fetch_page(query)
	}

	/// Fetches the page following `current`, or `None` at the end of the sequence.
	pub fn next_page<V>(&self, current: &Page<V>, query: &PagedQuery) -> Result<Option<Page<V>>>
	where
		V: DeserializeOwned,
	{
		match current.next_query(query)? {
			Some(next) => self.fetch_page(&next).map(Some),
			None => Ok(None),
		}
	}

	/// Lazily yields every item from the query's position onwards.
	pub fn items<V>(&self, query: PagedQuery) -> Items<'_, Self, V>
	where
		V: DeserializeOwned,
	{
		Items::new(self, query)
	}

	fn authenticated(&self, descriptor: &RequestDescriptor) -> Result<Response> {
		let mut request = prepare(&self.base_url, &self.user_agent, descriptor)?;
		let token = self.refresher.ensure_valid()?;
		let response = self.send(&mut request, &token, descriptor)?;

		if response.status != UNAUTHORIZED {
			return finish(response);
		}

		self.refresher.invalidate_if_current(&token);

		let token = self.refresher.ensure_valid()?;
		let response = self.send(&mut request, &token, descriptor)?;

		reauthenticated(response)
	}

	fn send(
		&self,
		request: &mut HttpRequest,
		token: &AccessToken,
		descriptor: &RequestDescriptor,
	) -> Result<Response> {
		request.set_header(AUTHORIZATION_HEADER, token.header_value());

		Ok(self.transport.execute(request, descriptor.retry.as_ref())?)
	}
}
impl<T, S> PageSource for Session<T, S>
where
	T: HttpTransport,
	S: TokenSource,
{
	fn fetch_page<V>(&self, query: &PagedQuery) -> Result<Page<V>>
	where
		V: DeserializeOwned,
	{
		let _span = OpSpan::new(OpKind::PageFetch, "fetch_page").entered();
		let result = self
			.request(&query.request())
			.and_then(|response| {
				Page::from_response(&response, query.cursor().cloned()).map_err(Error::from)
			});

		obs::record_result(OpKind::PageFetch, &result);

		result
	}
}
impl<T, S> Clone for Session<T, S> {
	fn clone(&self) -> Self {
		Self {
			base_url: self.base_url.clone(),
			user_agent: self.user_agent.clone(),
			transport: Arc::clone(&self.transport),
			refresher: Arc::clone(&self.refresher),
		}
	}
}
impl<T, S> Debug for Session<T, S> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("base_url", &self.base_url.as_str())
			.field("retry", self.transport.policy())
			.finish_non_exhaustive()
	}
}

/// Async authenticated session with the same semantics as [`Session`].
pub struct AsyncSession<T, S = TokenEndpoint<AsyncRetryingTransport<T>>> {
	base_url: Url,
	user_agent: String,
	transport: Arc<AsyncRetryingTransport<T>>,
	refresher: Arc<TokenRefresher<S>>,
}
impl<T> AsyncSession<T>
where
	T: AsyncHttpTransport,
{
	/// Builds a session whose tokens come from the service's token endpoint.
	pub fn new(config: &Config, transport: T) -> Result<Self, ConfigError> {
		let transport = Arc::new(AsyncRetryingTransport::new(transport, config.retry().clone()));
		let endpoint =
			TokenEndpoint::new(config.api_url(), config.user_agent(), Arc::clone(&transport))?;
		let refresher = Arc::new(TokenRefresher::new(
			CredentialStore::new(config.api_key().clone()),
			endpoint,
			config.token_safety_margin(),
		));

		Ok(Self::from_parts(config, transport, refresher))
	}
}
impl<T, S> AsyncSession<T, S>
where
	T: AsyncHttpTransport,
	S: AsyncTokenSource,
{
	/// Builds a session around an existing refresher.
	pub fn with_refresher(config: &Config, transport: T, refresher: Arc<TokenRefresher<S>>) -> Self {
		let transport = Arc::new(AsyncRetryingTransport::new(transport, config.retry().clone()));

		Self::from_parts(config, transport, refresher)
	}

	fn from_parts(
		config: &Config,
		transport: Arc<AsyncRetryingTransport<T>>,
		refresher: Arc<TokenRefresher<S>>,
	) -> Self {
		Self {
			base_url: config.api_url().clone(),
			user_agent: config.user_agent().into(),
			transport,
			refresher,
		}
	}

	/// Shared token refresher.
	pub fn refresher(&self) -> &Arc<TokenRefresher<S>> {
		&self.refresher
	}

	/// Service base URL.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Sends an authenticated request and maps error statuses.
	pub async fn request(&self, descriptor: &RequestDescriptor) -> Result<Response> {
		let span = OpSpan::new(OpKind::Request, "request");

		obs::record_op_outcome(OpKind::Request, OpOutcome::Attempt);

		let result = span.instrument(self.authenticated(descriptor)).await;

		obs::record_result(OpKind::Request, &result);

		result
	}

	/// `GET` a resource.
	pub async fn get(&self, path: &str) -> Result<Response> {
		self.request(&RequestDescriptor::get(path)).await
	}

	/// `POST` a JSON document.
	pub async fn post(&self, path: &str, body: &serde_json::Value) -> Result<Response> {
		self.request(&RequestDescriptor::post(path).json(body)).await
	}

	/// `PATCH` a resource guarded by its entity tag.
	pub async fn patch(&self, path: &str, body: &serde_json::Value, tag: &Tag) -> Result<Response> {
		self.request(&RequestDescriptor::patch(path).json(body).if_match(tag)).await
	}

	/// `PUT` a JSON document.
	pub async fn put(&self, path: &str, body: &serde_json::Value) -> Result<Response> {
		self.request(&RequestDescriptor::put(path).json(body)).await
	}

	/// `DELETE` a resource.
	pub async fn delete(&self, path: &str) -> Result<Response> {
		self.request(&RequestDescriptor::delete(path)).await
	}

	/// Fetches the page at the query's position.
	pub async fn first_page<V>(&self, query: &PagedQuery) -> Result<Page<V>>
	where
		V: Send + DeserializeOwned,
	{
		self.fetch_page(query).await
	}

	/// Fetches the page following `current`, or `None` at the end of the sequence.
	pub async fn next_page<V>(
		&self,
		current: &Page<V>,
		query: &PagedQuery,
	) -> Result<Option<Page<V>>>
	where
		V: Send + DeserializeOwned,
	{
		match current.next_query(query)? {
			Some(next) => self.fetch_page(&next).await.map(Some),
			None => Ok(None),
		}
	}

	/// Lazily yields every item from the query's position onwards.
	pub fn items<V>(&self, query: PagedQuery) -> AsyncItems<'_, Self, V>
	where
		V: Send + DeserializeOwned,
	{
		AsyncItems::new(self, query)
	}

	async fn authenticated(&self, descriptor: &RequestDescriptor) -> Result<Response> {
		let mut request = prepare(&self.base_url, &self.user_agent, descriptor)?;
		let token = self.refresher.ensure_valid_async().await?;
		let response = self.send(&mut request, &token, descriptor).await?;

		if response.status != UNAUTHORIZED {
			return finish(response);
		}

		self.refresher.invalidate_if_current(&token);

		let token = self.refresher.ensure_valid_async().await?;
		let response = self.send(&mut request, &token, descriptor).await?;

		reauthenticated(response)
	}

	async fn send(
		&self,
		request: &mut HttpRequest,
		token: &AccessToken,
		descriptor: &RequestDescriptor,
	) -> Result<Response> {
		request.set_header(AUTHORIZATION_HEADER, token.header_value());

		Ok(self.transport.execute(request, descriptor.retry.as_ref()).await?)
	}
}
impl<T, S> AsyncPageSource for AsyncSession<T, S>
where
	T: AsyncHttpTransport,
	S: AsyncTokenSource,
{
	fn fetch_page<'a, V>(&'a self, query: &'a PagedQuery) -> PageFuture<'a, V>
	where
		V: 'a + Send + DeserializeOwned,
	{
		let span = OpSpan::new(OpKind::PageFetch, "fetch_page");

		Box::pin(span.instrument(async move {
			let result = match self.request(&query.request()).await {
				Ok(response) => Page::from_response(&response, query.cursor().cloned())
					.map_err(Error::from),
				Err(e) => Err(e),
			};

			obs::record_result(OpKind::PageFetch, &result);

			result
		}))
	}
}
impl<T, S> Clone for AsyncSession<T, S> {
	fn clone(&self) -> Self {
		Self {
			base_url: self.base_url.clone(),
			user_agent: self.user_agent.clone(),
			transport: Arc::clone(&self.transport),
			refresher: Arc::clone(&self.refresher),
		}
	}
}
impl<T, S> Debug for AsyncSession<T, S> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AsyncSession")
			.field("base_url", &self.base_url.as_str())
			.field("retry", self.transport.policy())
			.finish_non_exhaustive()
	}
}

fn prepare(base_url: &Url, user_agent: &str, descriptor: &RequestDescriptor) -> Result<HttpRequest> {
	let mut request = descriptor.resolve(base_url)?;

	if request.header(API_VERSION_HEADER).is_none() {
		request.set_header(API_VERSION_HEADER, API_VERSION);
	}
	if request.header(USER_AGENT_HEADER).is_none() {
		request.set_header(USER_AGENT_HEADER, user_agent);
	}

	Ok(request)
}

fn finish(response: Response) -> Result<Response> {
	if response.is_success() {
		Ok(response)
	} else {
		Err(StatusError::from_response(&response).into())
	}
}

fn reauthenticated(response: Response) -> Result<Response> {
	if response.status == UNAUTHORIZED {
		return Err(AuthError::Unauthorized.into());
	}

	finish(response)
}
