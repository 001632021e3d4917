// crates.io
use httpmock::prelude::*;
// self
use threat_intel_client::{
	_preludet::*,
	client::{AsyncClient, Client},
	config::Config,
	error::AuthError,
	http::RequestDescriptor,
	pagination::PagedQuery,
	retry::{Backoff, RetryPolicy},
};

const API_KEY: &str = "reqwest-integration-key";

#[derive(Debug, PartialEq, Deserialize)]
struct Entity {
	id: u64,
}

fn config(server: &MockServer) -> Config {
	Config::builder(API_KEY)
		.api_url(server.url("/api"))
		.retry(
			RetryPolicy::default()
				.with_backoff(Backoff::none())
				.expect("Zero backoff should be a valid policy."),
		)
		.build()
		.expect("Mock server configuration should build.")
}

fn token_mock(server: &MockServer) -> httpmock::Mock<'_> {
	server.mock(|when, then| {
		when.method(GET)
			.path("/auth/token")
			.header("X-Api-Key", API_KEY)
			.header("X-Api-Version", "1");
		then.status(200).header("content-type", "application/json").body(
			"{\"accessToken\":\"mock-token\",\"tokenType\":\"Bearer\",\"expiresIn\":3600}",
		);
	})
}

#[test]
fn blocking_client_walks_pages_with_one_token() {
	let server = MockServer::start();
	let token = token_mock(&server);
	let first = server.mock(|when, then| {
		when.method(GET)
			.path("/api/observable/entities")
			.header("Authorization", "Bearer mock-token")
			.header("X-Api-Version", "1")
			.query_param("limit", "2")
			.query_param_missing("cursor");
		then.status(200)
			.header("content-type", "application/json")
			.body("{\"items\":[{\"id\":1},{\"id\":2}],\"next_cursor\":\"c1\"}");
	});
	let second = server.mock(|when, then| {
		when.method(GET)
			.path("/api/observable/entities")
			.header("Authorization", "Bearer mock-token")
			.query_param("limit", "2")
			.query_param("cursor", "c1");
		then.status(200)
			.header("content-type", "application/json")
			.body("{\"items\":[{\"id\":3}],\"next_cursor\":null}");
	});
	let client = Client::new(config(&server)).expect("Blocking client should build.");
	let entities = client
		.items::<Entity>(PagedQuery::new(RequestDescriptor::get("observable/entities")).with_limit(2))
		.collect::<Result<Vec<_>>>()
		.expect("Traversal should succeed.");

	assert_eq!(entities, [Entity { id: 1 }, Entity { id: 2 }, Entity { id: 3 }]);

	token.assert_calls(1);
	first.assert_calls(1);
	second.assert_calls(1);
}

#[test]
fn blocking_client_maps_conflicts() {
	let server = MockServer::start();
	let _token = token_mock(&server);
	let conflict = server.mock(|when, then| {
		when.method(POST).path("/api/collections").header("content-type", "application/json");
		then.status(409)
			.header("content-type", "application/json")
			.body("{\"code\":\"DuplicateCollection\",\"message\":\"exists\"}");
	});
	let client = Client::new(config(&server)).expect("Blocking client should build.");
	let err = client
		.post("collections", &serde_json::json!({ "name": "feeds" }))
		.expect_err("Conflict should be an error.");

	assert!(err.is_conflict());

	conflict.assert_calls(1);
}

#[tokio::test]
async fn async_client_reauthenticates_after_401() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/token").header("X-Api-Key", API_KEY);
			then.status(200).header("content-type", "application/json").body(
				"{\"accessToken\":\"mock-token\",\"tokenType\":\"Bearer\",\"expiresIn\":3600}",
			);
		})
		.await;
	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/enrichment/analyzers");
			then.status(401);
		})
		.await;
	let client = AsyncClient::new(config(&server)).expect("Async client should build.");
	let err = client.get("enrichment/analyzers").await.expect_err("Persistent 401 should fail.");

	assert!(matches!(err, Error::Authentication(AuthError::Unauthorized)));

	token.assert_calls_async(2).await;
	rejected.assert_calls_async(2).await;
}

#[tokio::test]
async fn async_client_surfaces_rejected_keys() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/token");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"code\":\"InvalidAPIKey\"}");
		})
		.await;
	let client = AsyncClient::new(config(&server)).expect("Async client should build.");
	let err = client.get("observable/entities").await.expect_err("Rejected key should fail.");

	assert!(matches!(err, Error::Authentication(AuthError::Rejected { status: 401, .. })));

	token.assert_calls_async(1).await;
}

#[tokio::test]
async fn async_client_walks_pages() {
	let server = MockServer::start_async().await;
	let _token = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"accessToken\":\"mock-token\",\"tokenType\":\"Bearer\",\"expiresIn\":3600}",
			);
		})
		.await;
	let pages = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/observable/entities").query_param_missing("cursor");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"items\":[{\"id\":5}],\"next_cursor\":\"\"}");
		})
		.await;
	let client = AsyncClient::new(config(&server)).expect("Async client should build.");
	let entities = client
		.items::<Entity>(PagedQuery::new(RequestDescriptor::get("observable/entities")))
		.try_collect()
		.await
		.expect("Traversal should succeed.");

	assert_eq!(entities, [Entity { id: 5 }]);

	pages.assert_calls_async(1).await;
}
