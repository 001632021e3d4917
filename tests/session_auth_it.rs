mod common;

// std
use std::thread;
// self
use common::*;
use threat_intel_client::{
	_preludet::*,
	error::{AuthError, ConfigError, StatusKind},
	http::{API_KEY_HEADER, API_VERSION_HEADER, AUTHORIZATION_HEADER},
	session::{AsyncSession, Session},
};

fn session(transport: &Arc<ScriptedTransport>) -> Session<Arc<ScriptedTransport>> {
	Session::new(&config(), Arc::clone(transport)).expect("Session should build.")
}

fn async_session(transport: &Arc<ScriptedTransport>) -> AsyncSession<Arc<ScriptedTransport>> {
	AsyncSession::new(&config(), Arc::clone(transport)).expect("Session should build.")
}

#[test]
fn requests_carry_the_cached_token_and_api_version() {
	let transport =
		Arc::new(ScriptedTransport::new().api_replies([json(200, "{}"), json(200, "{}")]));
	let session = session(&transport);

	session.get("enrichment/analyzers").expect("First request should succeed.");
	session.get("enrichment/analyzers").expect("Second request should succeed.");

	let requests = transport.api_requests();

	assert_eq!(transport.token_calls(), 1);
	assert_eq!(requests.len(), 2);
	assert_eq!(requests[0].url.as_str(), "https://intel.example.com/api/enrichment/analyzers");

	for request in &requests {
		assert_eq!(request.header(AUTHORIZATION_HEADER), Some("Bearer token-1"));
		assert_eq!(request.header(API_VERSION_HEADER), Some("1"));
		assert!(request.header(API_KEY_HEADER).is_none());
	}
}

#[test]
fn a_single_401_triggers_one_reauthentication() {
	let transport =
		Arc::new(ScriptedTransport::new().api_replies([json(401, ""), json(200, r#"{"ok":true}"#)]));
	let response = session(&transport).get("objects").expect("Retry with a fresh token should succeed.");
	let requests = transport.api_requests();

	assert_eq!(response.status, 200);
	assert_eq!(transport.token_calls(), 2);
	assert_eq!(transport.api_calls(), 2);
	assert_eq!(requests[0].header(AUTHORIZATION_HEADER), Some("Bearer token-1"));
	assert_eq!(requests[1].header(AUTHORIZATION_HEADER), Some("Bearer token-2"));
}

#[test]
fn a_second_401_is_surfaced_as_unauthorized() {
	let transport = Arc::new(
		ScriptedTransport::new().api_replies([json(401, ""), json(401, ""), json(200, "{}")]),
	);
	let err = session(&transport).get("objects").expect_err("Repeated 401 should fail.");

	assert!(matches!(err, Error::Authentication(AuthError::Unauthorized)));
	assert_eq!(err.status(), Some(401));
	assert_eq!(transport.api_calls(), 2);
	assert_eq!(transport.token_calls(), 2);
}

#[test]
fn error_statuses_are_mapped_to_kinds() {
	let transport = Arc::new(ScriptedTransport::new().api_replies([
		json(404, r#"{"code":"NotFound","message":"no such object"}"#),
		json(409, r#"{"code":"DuplicateCollection"}"#),
		json(412, ""),
		json(400, r#"{"code":"InvalidQuery"}"#),
	]));
	let session = session(&transport);
	let not_found = session.get("objects/1").expect_err("404 should be an error.");

	assert!(not_found.is_not_found());
	assert_eq!(not_found.status(), Some(404));

	let conflict = session
		.post("collections", &serde_json::json!({ "name": "dup" }))
		.expect_err("409 should be an error.");

	assert!(conflict.is_conflict());

	let stale = session.delete("collections/1").expect_err("412 should be an error.");

	assert_eq!(stale.status_kind(), Some(StatusKind::ResourceModified));

	let bad = session.get("search").expect_err("400 should be an error.");

	match bad {
		Error::Status(err) => {
			assert_eq!(err.kind, StatusKind::InvalidRequest);
			assert_eq!(
				err.content.and_then(|view| view.code).as_deref(),
				Some("InvalidQuery")
			);
		},
		other => panic!("Expected a status error, got {other:?}."),
	}
}

#[test]
fn absolute_urls_on_other_origins_never_see_the_token() {
	let transport = Arc::new(ScriptedTransport::new().api_reply(json(200, "{}")));
	let err = session(&transport)
		.get("https://collector.example.net/steal")
		.expect_err("Foreign origins should be refused.");

	assert!(matches!(err, Error::Config(ConfigError::ForeignOrigin { .. })));
	assert_eq!(transport.token_calls(), 0);
	assert_eq!(transport.api_calls(), 0);
}

#[test]
fn rejected_api_keys_surface_as_authentication_errors() {
	let transport = Arc::new(
		ScriptedTransport::new()
			.token_reply(json(403, r#"{"code":"InvalidAPIKey","message":"revoked"}"#)),
	);
	let err = session(&transport).get("objects").expect_err("Rejected key should fail.");

	match err {
		Error::Authentication(AuthError::Rejected { status, content }) => {
			assert_eq!(status, 403);
			assert_eq!(content.and_then(|view| view.code).as_deref(), Some("InvalidAPIKey"));
		},
		other => panic!("Expected a rejected credential, got {other:?}."),
	}

	assert_eq!(transport.api_calls(), 0);
}

#[test]
fn malformed_token_bodies_are_reported() {
	let transport =
		Arc::new(ScriptedTransport::new().token_reply(json(200, r#"{"accessToken":42}"#)));
	let err = session(&transport).get("objects").expect_err("Bad token body should fail.");

	assert!(matches!(err, Error::Authentication(AuthError::InvalidTokenResponse { .. })));
}

#[test]
fn concurrent_threads_share_one_token_refresh() {
	let transport = Arc::new(
		ScriptedTransport::new()
			.with_delay(StdDuration::from_millis(20))
			.api_replies((0..8).map(|_| json(200, "{}"))),
	);
	let session = session(&transport);
	let handles = (0..8)
		.map(|_| {
			let session = session.clone();

			thread::spawn(move || session.get("objects").map(|response| response.status))
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let status = handle
			.join()
			.expect("Request thread should not panic.")
			.expect("Concurrent request should succeed.");

		assert_eq!(status, 200);
	}

	assert_eq!(transport.token_calls(), 1);
	assert_eq!(transport.api_calls(), 8);
}

#[test]
fn short_lived_tokens_are_refreshed_once_for_concurrent_threads() {
	let transport = Arc::new(
		(1..=8)
			.fold(ScriptedTransport::new(), |transport, n| {
				transport.token_reply(Ok(token(&format!("short-{n}"), 10)))
			})
			.with_delay(StdDuration::from_millis(20))
			.api_replies((0..8).map(|_| json(200, "{}"))),
	);
	let session = session(&transport);
	let handles = (0..8)
		.map(|_| {
			let session = session.clone();

			thread::spawn(move || session.get("objects").map(|response| response.status))
		})
		.collect::<Vec<_>>();

	for handle in handles {
		handle
			.join()
			.expect("Request thread should not panic.")
			.expect("Concurrent request should succeed.");
	}

	assert_eq!(transport.token_calls(), 1);
	assert!(
		transport
			.api_requests()
			.iter()
			.all(|request| request.header(AUTHORIZATION_HEADER) == Some("Bearer short-1"))
	);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn short_lived_tokens_are_refreshed_once_for_concurrent_tasks() {
	let transport = Arc::new(
		(1..=8)
			.fold(ScriptedTransport::new(), |transport, n| {
				transport.token_reply(Ok(token(&format!("short-{n}"), 10)))
			})
			.with_delay(StdDuration::from_millis(20))
			.api_replies((0..8).map(|_| json(200, "{}"))),
	);
	let session = async_session(&transport);
	let handles = (0..8)
		.map(|_| {
			let session = session.clone();

			tokio::spawn(async move { session.get("objects").await.map(|response| response.status) })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		handle
			.await
			.expect("Request task should not panic.")
			.expect("Concurrent request should succeed.");
	}

	assert_eq!(transport.token_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_share_one_token_refresh() {
	let transport = Arc::new(
		ScriptedTransport::new()
			.with_delay(StdDuration::from_millis(20))
			.api_replies((0..8).map(|_| json(200, "{}"))),
	);
	let session = async_session(&transport);
	let handles = (0..8)
		.map(|_| {
			let session = session.clone();

			tokio::spawn(async move { session.get("objects").await.map(|response| response.status) })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let status = handle
			.await
			.expect("Request task should not panic.")
			.expect("Concurrent request should succeed.");

		assert_eq!(status, 200);
	}

	assert_eq!(transport.token_calls(), 1);
	assert_eq!(transport.api_calls(), 8);
}

#[tokio::test]
async fn async_sessions_reauthenticate_once() {
	let transport =
		Arc::new(ScriptedTransport::new().api_replies([json(401, ""), json(401, "")]));
	let err = async_session(&transport).get("objects").await.expect_err("Repeated 401 should fail.");

	assert!(matches!(err, Error::Authentication(AuthError::Unauthorized)));
	assert_eq!(transport.token_calls(), 2);
	assert_eq!(transport.api_calls(), 2);
}
