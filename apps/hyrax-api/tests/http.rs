use std::{collections::BTreeMap, sync::Arc};

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode, header::AUTHORIZATION},
};
use serde_json::Value;
use tower::util::ServiceExt;

use hyrax_api::{routes, state::AppState};
use hyrax_config::Config;
use hyrax_domain::SourceKind;
use hyrax_service::{
	Backends, BoxFuture, Error, HybridSearchService, MetadataStore, RawHit, Result, VectorIndex,
	backends::StaticKeyAuth,
};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str =
	include_str!("../../../packages/hyrax-config/tests/fixtures/sample_config.template.toml");

#[derive(Clone)]
enum Canned {
	Hits(Vec<RawHit>),
	Down,
}
impl Canned {
	fn respond(&self, source_kind: SourceKind) -> Result<Vec<RawHit>> {
		match self {
			Self::Hits(hits) => Ok(hits.clone()),
			Self::Down => Err(Error::backend(source_kind, "connection refused")),
		}
	}
}
impl VectorIndex for Canned {
	fn nearest_neighbors<'a>(
		&'a self,
		_query_text: &'a str,
		_limit: u32,
	) -> BoxFuture<'a, Result<Vec<RawHit>>> {
		let outcome = self.respond(SourceKind::Vector);

		Box::pin(async move { outcome })
	}
}
impl MetadataStore for Canned {
	fn filter_match<'a>(
		&'a self,
		_query_text: &'a str,
		_filters: &'a BTreeMap<String, String>,
		_limit: u32,
	) -> BoxFuture<'a, Result<Vec<RawHit>>> {
		let outcome = self.respond(SourceKind::Metadata);

		Box::pin(async move { outcome })
	}
}

fn test_config() -> Config {
	toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.")
}

fn test_state(vector: Canned, metadata: Canned) -> AppState {
	let backends = Backends::new(
		Arc::new(StaticKeyAuth::new([("token-a", "requester-a")])),
		Arc::new(vector),
		Arc::new(metadata),
	);

	AppState::from_service(HybridSearchService::new(test_config(), backends))
}

fn healthy_state() -> AppState {
	test_state(
		Canned::Hits(vec![
			RawHit::new("A", 0.81).with_attribute("title", "Arrival"),
			RawHit::new("B", 0.40),
		]),
		Canned::Hits(vec![
			RawHit::new("B", 4.5).with_attribute("title", "Blade Runner"),
			RawHit::new("C", 2.0),
		]),
	)
}

fn search_request(token: Option<&str>, body: &str) -> Request<Body> {
	let mut builder = Request::builder()
		.method("POST")
		.uri("/v1/search")
		.header("content-type", "application/json");

	if let Some(token) = token {
		builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
	}

	builder.body(Body::from(body.to_string())).expect("Failed to build request.")
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
	let response = app.oneshot(request).await.expect("Failed to call router.");
	let status = response.status();
	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json = if body.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&body).expect("Failed to parse response.")
	};

	(status, json)
}

#[tokio::test]
async fn health_ok() {
	let app = routes::router(healthy_state());
	let request = Request::builder().uri("/health").body(Body::empty()).expect("request");
	let (status, _) = call(app, request).await;

	assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn search_returns_merged_ranking() {
	let app = routes::router(healthy_state());
	let (status, json) =
		call(app, search_request(Some("token-a"), r#"{"query_text":"sci-fi movies"}"#)).await;

	assert_eq!(status, StatusCode::OK);

	let ids: Vec<&str> = json["results"]
		.as_array()
		.expect("results array")
		.iter()
		.map(|hit| hit["item_id"].as_str().expect("item_id"))
		.collect();

	assert_eq!(ids, vec!["B", "A", "C"]);
	assert_eq!(json["results"][0]["attributes"]["title"], "Blade Runner");
	assert_eq!(json["results"][0]["sources"], serde_json::json!(["vector", "metadata"]));
	assert_eq!(json["results"][0]["degraded"], false);
	assert_eq!(json["degraded_sources"], serde_json::json!([]));
}

#[tokio::test]
async fn missing_bearer_is_unauthorized() {
	let app = routes::router(healthy_state());
	let (status, json) = call(app, search_request(None, r#"{"query_text":"sci-fi"}"#)).await;

	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(json["kind"], "unauthorized");
}

#[tokio::test]
async fn unknown_bearer_is_unauthorized_even_with_bad_json() {
	let app = routes::router(healthy_state());
	let (status, json) = call(app, search_request(Some("token-z"), "{not json")).await;

	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(json["kind"], "unauthorized");
}

#[tokio::test]
async fn malformed_body_is_invalid_request() {
	let app = routes::router(healthy_state());
	let (status, json) = call(app, search_request(Some("token-a"), "{not json")).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["kind"], "invalid_request");
}

#[tokio::test]
async fn malformed_bodies_show_up_in_admin_metrics() {
	let state = healthy_state();
	let app = routes::router(state.clone());
	let admin = routes::admin_router(state);

	for (token, body) in [(Some("token-a"), "{not json"), (None, "{not json")] {
		let (status, _) = call(app.clone(), search_request(token, body)).await;

		assert!(status.is_client_error());
	}

	let request = Request::builder().uri("/v1/admin/metrics").body(Body::empty()).expect("request");
	let (status, json) = call(admin, request).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["requests"], 2);
	assert_eq!(json["invalid_requests"], 1);
	assert_eq!(json["unauthorized"], 1);
	assert_eq!(json["vector"]["calls"], 0);
}

#[tokio::test]
async fn blank_query_is_invalid_request() {
	let app = routes::router(healthy_state());
	let (status, json) =
		call(app, search_request(Some("token-a"), r#"{"query_text":"  ","filters":{}}"#)).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["kind"], "invalid_request");
}

#[tokio::test]
async fn colliding_filter_keys_are_invalid_request() {
	let app = routes::router(healthy_state());
	let body = r#"{"query_text":"sci-fi","filters":{"genre":"space"," genre":"drama"}}"#;
	let (status, json) = call(app, search_request(Some("token-a"), body)).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["kind"], "invalid_request");
}

#[tokio::test]
async fn one_backend_down_is_flagged_degraded() {
	let state = test_state(Canned::Down, Canned::Hits(vec![RawHit::new("B", 4.5)]));
	let app = routes::router(state);
	let (status, json) =
		call(app, search_request(Some("token-a"), r#"{"query_text":"sci-fi movies"}"#)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["degraded_sources"], serde_json::json!(["vector"]));
	assert_eq!(json["results"][0]["degraded"], true);
}

#[tokio::test]
async fn both_backends_down_is_service_unavailable() {
	let app = routes::router(test_state(Canned::Down, Canned::Down));
	let (status, json) =
		call(app, search_request(Some("token-a"), r#"{"query_text":"sci-fi movies"}"#)).await;

	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(json["kind"], "retrieval_unavailable");
}

#[tokio::test]
async fn admin_reports_metrics_and_purges() {
	let state = healthy_state();
	let app = routes::router(state.clone());
	let admin = routes::admin_router(state);

	for _ in 0..2 {
		let (status, _) = call(
			app.clone(),
			search_request(Some("token-a"), r#"{"query_text":"sci-fi movies"}"#),
		)
		.await;

		assert_eq!(status, StatusCode::OK);
	}

	let request = Request::builder().uri("/v1/admin/metrics").body(Body::empty()).expect("request");
	let (status, json) = call(admin.clone(), request).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["requests"], 2);
	assert_eq!(json["responses"], 2);
	assert_eq!(json["cache"]["hits"], 1);
	assert_eq!(json["cache"]["misses"], 1);
	assert_eq!(json["vector"]["calls"], 1);

	let request = Request::builder()
		.method("POST")
		.uri("/v1/admin/cache/purge")
		.body(Body::empty())
		.expect("request");
	let (status, json) = call(admin, request).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["removed"], 0);
}
