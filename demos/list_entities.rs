//! Walks a cursor-paginated list endpoint with the async client against a local mock server.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde::Deserialize;
// self
use threat_intel_client::{
	client::AsyncClient, config::Config, http::RequestDescriptor, pagination::PagedQuery,
};

#[derive(Debug, Deserialize)]
struct Entity {
	id: u64,
	kind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/token").header("X-Api-Key", "demo-key");
			then.status(200).header("content-type", "application/json").body(
				"{\"accessToken\":\"demo-access\",\"tokenType\":\"Bearer\",\"expiresIn\":900}",
			);
		})
		.await;
	let _first = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/observable/entities").query_param_missing("cursor");
			then.status(200).header("content-type", "application/json").body(
				"{\"items\":[{\"id\":1,\"kind\":\"DomainName\"}],\"next_cursor\":\"page-2\"}",
			);
		})
		.await;
	let _second = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/observable/entities").query_param("cursor", "page-2");
			then.status(200).header("content-type", "application/json").body(
				"{\"items\":[{\"id\":2,\"kind\":\"IPAddress\"}],\"next_cursor\":null}",
			);
		})
		.await;
	let client = AsyncClient::new(Config::builder("demo-key").api_url(server.url("/api")).build()?)?;
	let mut entities = client
		.items::<Entity>(PagedQuery::new(RequestDescriptor::get("observable/entities")).with_limit(1));

	while let Some(entity) = entities.next().await {
		let entity = entity?;

		println!("Entity {}: {}.", entity.id, entity.kind);
	}

	token_mock.assert_async().await;

	Ok(())
}
