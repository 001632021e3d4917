//! reqwest-backed client facades.
//!
//! [`Client`] and [`AsyncClient`] bundle a [`Config`] with the matching reqwest transport and
//! an authenticated session. Resource clients can also hold the [`Session`] /
//! [`AsyncSession`] directly via [`Client::session`].

// self
use crate::{
	_prelude::*,
	config::Config,
	error::ConfigError,
	http::{BlockingReqwestTransport, ReqwestTransport, RequestDescriptor, Response},
	pagination::{AsyncItems, Items, Page, PagedQuery},
	session::{AsyncSession, Session},
	view::Tag,
};

/// Blocking client session over reqwest.
pub type BlockingSession = Session<BlockingReqwestTransport>;
/// Async client session over reqwest.
pub type ReqwestSession = AsyncSession<ReqwestTransport>;

/// Blocking entry point.
///
/// Must not be constructed or dropped inside an async runtime.
#[derive(Clone, Debug)]
pub struct Client {
	config: Config,
	session: BlockingSession,
}
impl Client {
	/// Builds the client and its transport from `config`.
	pub fn new(config: Config) -> Result<Self, ConfigError> {
		let transport = BlockingReqwestTransport::from_config(&config)?;
		let session = Session::new(&config, transport)?;

		Ok(Self { config, session })
	}

	/// Configuration the client was built with.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Authenticated session shared by resource clients.
	pub fn session(&self) -> &BlockingSession {
		&self.session
	}

	/// Sends an arbitrary request.
	pub fn request(&self, descriptor: &RequestDescriptor) -> Result<Response> {
		self.session.request(descriptor)
	}

	/// `GET` a resource.
	pub fn get(&self, path: &str) -> Result<Response> {
		self.session.get(path)
	}

	/// `POST` a JSON document.
	pub fn post(&self, path: &str, body: &serde_json::Value) -> Result<Response> {
		self.session.post(path, body)
	}

	/// `PATCH` a resource guarded by its entity tag.
	pub fn patch(&self, path: &str, body: &serde_json::Value, tag: &Tag) -> Result<Response> {
		self.session.patch(path, body, tag)
	}

	/// `PUT` a JSON document.
	pub fn put(&self, path: &str, body: &serde_json::Value) -> Result<Response> {
		self.session.put(path, body)
	}

	/// `DELETE` a resource.
	pub fn delete(&self, path: &str) -> Result<Response> {
		self.session.delete(path)
	}

	/// Fetches the page at the query's position.
	pub fn first_page<V>(&self, query: &PagedQuery) -> Result<Page<V>>
	where
		V: DeserializeOwned,
	{
		self.session.first_page(query)
	}

	/// Fetches the page following `current`.
	pub fn next_page<V>(&self, current: &Page<V>, query: &PagedQuery) -> Result<Option<Page<V>>>
	where
		V: DeserializeOwned,
	{
		self.session.next_page(current, query)
	}

	/// Lazily yields every item of a list endpoint.
	pub fn items<V>(&self, query: PagedQuery) -> Items<'_, BlockingSession, V>
	where
		V: DeserializeOwned,
	{
		self.session.items(query)
	}
}

/// Async entry point.
#[derive(Clone, Debug)]
pub struct AsyncClient {
	config: Config,
	session: ReqwestSession,
}
impl AsyncClient {
	/// Builds the client and its transport from `config`.
	pub fn new(config: Config) -> Result<Self, ConfigError> {
		let transport = ReqwestTransport::from_config(&config)?;
		let session = AsyncSession::new(&config, transport)?;

		Ok(Self { config, session })
	}

	/// Configuration the client was built with.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Authenticated session shared by resource clients.
	pub fn session(&self) -> &ReqwestSession {
		&self.session
	}

	/// Sends an arbitrary request.
	pub async fn request(&self, descriptor: &RequestDescriptor) -> Result<Response> {
		self.session.request(descriptor).await
	}

	/// `GET` a resource.
	pub async fn get(&self, path: &str) -> Result<Response> {
		self.session.get(path).await
	}

	/// `POST` a JSON document.
	pub async fn post(&self, path: &str, body: &serde_json::Value) -> Result<Response> {
		self.session.post(path, body).await
	}

	/// `PATCH` a resource guarded by its entity tag.
	pub async fn patch(&self, path: &str, body: &serde_json::Value, tag: &Tag) -> Result<Response> {
		self.session.patch(path, body, tag).await
	}

	/// `PUT` a JSON document.
	pub async fn put(&self, path: &str, body: &serde_json::Value) -> Result<Response> {
		self.session.put(path, body).await
	}

	/// `DELETE` a resource.
	pub async fn delete(&self, path: &str) -> Result<Response> {
		self.session.delete(path).await
	}

	/// Fetches the page at the query's position.
	pub async fn first_page<V>(&self, query: &PagedQuery) -> Result<Page<V>>
	where
		V: Send + DeserializeOwned,
	{
		self.session.first_page(query).await
	}

	/// Fetches the page following `current`.
	pub async fn next_page<V>(
		&self,
		current: &Page<V>,
		query: &PagedQuery,
	) -> Result<Option<Page<V>>>
	where
		V: Send + DeserializeOwned,
	{
		self.session.next_page(current, query).await
	}

	/// Lazily yields every item of a list endpoint.
	pub fn items<V>(&self, query: PagedQuery) -> AsyncItems<'_, ReqwestSession, V>
	where
		V: Send + DeserializeOwned,
	{
		self.session.items(query)
	}
}
