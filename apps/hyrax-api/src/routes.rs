use axum::{
	Json, Router,
	extract::{State, rejection::JsonRejection},
	http::{HeaderMap, StatusCode, header::AUTHORIZATION},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::state::AppState;
use hyrax_service::{Error, MetricsSnapshot, SearchQuery, SearchResponse};

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/search", post(search))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/admin/metrics", get(metrics))
		.route("/v1/admin/cache/purge", post(purge_cache))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn search(
	State(state): State<AppState>,
	headers: HeaderMap,
	payload: Result<Json<SearchQuery>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
	let request_id = Uuid::new_v4();
	let span = tracing::info_span!("search", %request_id);

	async move {
		let credential = read_bearer_token(&headers).unwrap_or_default();
		let query = match payload {
			Ok(Json(query)) => query,
			Err(rejection) => {
				let err = state.service.reject_malformed(credential, rejection.body_text()).await;

				return Err(ApiError::from(err));
			},
		};
		let response = state.service.search(credential, query).await?;

		tracing::info!(
			results = response.results.len(),
			degraded = response.is_degraded(),
			"Search completed."
		);

		Ok(Json(response))
	}
	.instrument(span)
	.await
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
	Json(state.service.metrics())
}

#[derive(Debug, Serialize)]
struct PurgeReport {
	removed: usize,
}

async fn purge_cache(State(state): State<AppState>) -> Json<PurgeReport> {
	let removed = state.service.purge_expired();

	tracing::info!(removed, "Purged expired cache entries on request.");

	Json(PurgeReport { removed })
}

fn read_bearer_token(headers: &HeaderMap) -> Option<&str> {
	let raw = headers.get(AUTHORIZATION)?;
	let value = raw.to_str().ok()?.trim();
	let token = value.strip_prefix("Bearer ")?.trim();

	if token.is_empty() { None } else { Some(token) }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	kind: &'static str,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	kind: &'static str,
	message: String,
}

pub fn json_error(status: StatusCode, kind: &'static str, message: impl Into<String>) -> ApiError {
	ApiError { status, kind, message: message.into() }
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::Unauthorized { message } =>
				json_error(StatusCode::UNAUTHORIZED, "unauthorized", message),
			Error::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_request", message),
			err @ (Error::RetrievalUnavailable { .. }
			| Error::BackendTimeout { .. }
			| Error::Backend { .. }) => {
				tracing::warn!(error = %err, "Retrieval unavailable.");

				json_error(StatusCode::SERVICE_UNAVAILABLE, "retrieval_unavailable", err.to_string())
			},
			Error::Internal { message } => {
				tracing::error!(error = %message, "Search failed.");

				json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", "Internal error.")
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { kind: self.kind, message: self.message };

		(self.status, Json(body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use axum::http::HeaderValue;

	use super::*;

	fn headers_with(value: &str) -> HeaderMap {
		let mut headers = HeaderMap::new();

		headers.insert(AUTHORIZATION, HeaderValue::from_str(value).expect("header value"));

		headers
	}

	#[test]
	fn reads_bearer_tokens() {
		assert_eq!(read_bearer_token(&headers_with("Bearer  token-a ")), Some("token-a"));
		assert_eq!(read_bearer_token(&headers_with("Basic dXNlcg==")), None);
		assert_eq!(read_bearer_token(&headers_with("Bearer ")), None);
		assert_eq!(read_bearer_token(&HeaderMap::new()), None);
	}
}
