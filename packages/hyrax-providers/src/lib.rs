pub mod auth;
pub mod embedding;

mod error;

pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

pub fn default_headers(default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: format!("Default header {key} must be a string."),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse::<HeaderValue>()?);
	}

	Ok(headers)
}

pub fn auth_headers(api_key: &str, defaults: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = default_headers(defaults)?;

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse::<HeaderValue>()?);

	Ok(headers)
}

pub(crate) fn endpoint(api_base: &str, path: &str) -> String {
	format!("{}{}", api_base.trim_end_matches('/'), path)
}
