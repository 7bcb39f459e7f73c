use std::collections::BTreeMap;

use serde_json::Value;

use crate::{Error, Result};

const REQUEST_KEY_SCHEMA_VERSION: i32 = 1;

/// A validated search call, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
	requester_id: String,
	query_text: String,
	filters: BTreeMap<String, String>,
}
impl SearchRequest {
	pub fn new(
		requester_id: impl Into<String>,
		query_text: &str,
		filters: impl IntoIterator<Item = (String, String)>,
		max_query_chars: usize,
	) -> Result<Self> {
		let requester_id = requester_id.into();

		if requester_id.trim().is_empty() {
			return Err(Error::EmptyRequester);
		}

		let query_text = query_text.trim();

		if query_text.is_empty() {
			return Err(Error::EmptyQuery);
		}
		if query_text.chars().count() > max_query_chars {
			return Err(Error::QueryTooLong { max_chars: max_query_chars });
		}

		let mut normalized_filters = BTreeMap::new();

		for (key, value) in filters {
			let key = key.trim();

			if key.is_empty() {
				return Err(Error::EmptyFilterKey);
			}

			if normalized_filters.insert(key.to_string(), value.trim().to_string()).is_some() {
				return Err(Error::DuplicateFilterKey { key: key.to_string() });
			}
		}

		Ok(Self { requester_id, query_text: query_text.to_string(), filters: normalized_filters })
	}

	pub fn requester_id(&self) -> &str {
		&self.requester_id
	}

	pub fn query_text(&self) -> &str {
		&self.query_text
	}

	pub fn filters(&self) -> &BTreeMap<String, String> {
		&self.filters
	}

	pub fn cache_key(&self) -> String {
		request_key(&self.query_text, &self.filters)
	}
}

/// Lowercases and collapses runs of whitespace into single spaces.
pub fn normalize_query(query: &str) -> String {
	query.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}

/// Deterministic cache key over the normalized query and the sorted filters.
///
/// The requester is not part of the key, so identical searches from different callers share
/// one entry.
pub fn request_key(query: &str, filters: &BTreeMap<String, String>) -> String {
	let filters: Vec<Value> = filters
		.iter()
		.map(|(key, value)| serde_json::json!([key, value]))
		.collect();
	let payload = serde_json::json!({
		"kind": "search",
		"schema_version": REQUEST_KEY_SCHEMA_VERSION,
		"query": normalize_query(query),
		"filters": filters,
	});

	blake3::hash(payload.to_string().as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn collapses_whitespace_and_case() {
		assert_eq!(normalize_query("  Sci-Fi \t\n MOVIES "), "sci-fi movies");
		assert_eq!(normalize_query(""), "");
	}

	#[test]
	fn key_ignores_filter_insertion_order() {
		let mut left = BTreeMap::new();

		left.insert("genre".to_string(), "drama".to_string());
		left.insert("year".to_string(), "1999".to_string());

		let right: BTreeMap<String, String> = [("year", "1999"), ("genre", "drama")]
			.into_iter()
			.map(|(key, value)| (key.to_string(), value.to_string()))
			.collect();

		assert_eq!(request_key("q", &left), request_key("q", &right));
	}
}
