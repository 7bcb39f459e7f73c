use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::{Error, Result};

/// Asks the remote introspection endpoint who owns `credential`.
///
/// 401 and 403 map to [`Error::Unauthorized`]; any other non-success status is a transport error.
pub async fn validate(cfg: &hyrax_config::RemoteAuth, credential: &str) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let headers = match cfg.api_key.as_deref() {
		Some(api_key) => crate::auth_headers(api_key, &cfg.default_headers)?,
		None => crate::default_headers(&cfg.default_headers)?,
	};
	let res = client
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.headers(headers)
		.json(&serde_json::json!({ "credential": credential }))
		.send()
		.await?;

	if matches!(res.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
		return Err(Error::Unauthorized);
	}

	let json: Value = res.error_for_status()?.json().await?;

	parse_validation_response(&json)
}

fn parse_validation_response(json: &Value) -> Result<String> {
	if json.get("active").and_then(Value::as_bool) == Some(false) {
		return Err(Error::Unauthorized);
	}

	let requester_id = json
		.get("requester_id")
		.or_else(|| json.get("sub"))
		.and_then(Value::as_str)
		.map(str::trim)
		.unwrap_or_default();

	if requester_id.is_empty() {
		return Err(Error::InvalidResponse {
			message: "Auth response is missing requester_id.".to_string(),
		});
	}

	Ok(requester_id.to_string())
}
