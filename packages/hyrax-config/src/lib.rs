mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, Postgres, Providers, Qdrant, RemoteAuth, Search,
	SearchBackend, SearchCache, Security, SecurityAuthKey, Service, Storage,
};

use std::{collections::HashSet, fs, net::SocketAddr, path::Path};

pub const AUTH_MODE_STATIC_KEYS: &str = "static_keys";
pub const AUTH_MODE_REMOTE: &str = "remote";
pub const NORMALIZATION_RANGE: &str = "range";
pub const NORMALIZATION_MIN_MAX: &str = "min_max";

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	validate_service(cfg)?;
	validate_security(cfg)?;

	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::validation("providers.embedding.dimensions must be greater than zero."));
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::validation(
			"providers.embedding.dimensions must match storage.qdrant.vector_dim.",
		));
	}
	if cfg.providers.embedding.timeout_ms == 0 {
		return Err(Error::validation("providers.embedding.timeout_ms must be greater than zero."));
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::validation("Provider embedding api_key must be non-empty."));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::validation("storage.postgres.pool_max_conns must be greater than zero."));
	}
	if !is_sql_identifier(&cfg.storage.postgres.table) {
		return Err(Error::validation(
			"storage.postgres.table must contain only lowercase letters, digits, or underscores.",
		));
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::validation("storage.qdrant.collection must be non-empty."));
	}

	validate_search(cfg)
}

fn validate_service(cfg: &Config) -> Result<()> {
	let http_addr: SocketAddr = cfg.service.http_bind.parse().map_err(|err| {
		Error::validation(format!("service.http_bind must be a valid socket address: {err}"))
	})?;
	let admin_addr: SocketAddr = cfg.service.admin_bind.parse().map_err(|err| {
		Error::validation(format!("service.admin_bind must be a valid socket address: {err}"))
	})?;

	if cfg.security.bind_localhost_only && !http_addr.ip().is_loopback() {
		return Err(Error::validation(
			"service.http_bind must be a loopback address when security.bind_localhost_only is true.",
		));
	}
	if !admin_addr.ip().is_loopback() {
		return Err(Error::validation("service.admin_bind must be a loopback address."));
	}

	Ok(())
}

fn validate_security(cfg: &Config) -> Result<()> {
	match cfg.security.auth_mode.as_str() {
		AUTH_MODE_STATIC_KEYS => {
			if cfg.security.auth_keys.is_empty() {
				return Err(Error::validation(
					"security.auth_keys must be non-empty when security.auth_mode=static_keys.",
				));
			}

			let mut seen = HashSet::new();

			for key in &cfg.security.auth_keys {
				if key.token.trim().is_empty() {
					return Err(Error::validation("security.auth_keys.token must be non-empty."));
				}
				if key.requester_id.trim().is_empty() {
					return Err(Error::validation(
						"security.auth_keys.requester_id must be non-empty.",
					));
				}
				if !seen.insert(key.token.as_str()) {
					return Err(Error::validation("security.auth_keys.token values must be unique."));
				}
			}
		},
		AUTH_MODE_REMOTE => {
			let Some(remote) = cfg.security.remote.as_ref() else {
				return Err(Error::validation(
					"security.remote is required when security.auth_mode=remote.",
				));
			};

			if remote.api_base.trim().is_empty() {
				return Err(Error::validation("security.remote.api_base must be non-empty."));
			}
			if remote.timeout_ms == 0 {
				return Err(Error::validation(
					"security.remote.timeout_ms must be greater than zero.",
				));
			}
		},
		other => {
			return Err(Error::validation(format!(
				"security.auth_mode must be one of static_keys or remote, got {other}."
			)));
		},
	}

	Ok(())
}

fn validate_search(cfg: &Config) -> Result<()> {
	let search = &cfg.search;

	if search.candidate_k == 0 {
		return Err(Error::validation("search.candidate_k must be greater than zero."));
	}
	if search.top_k == 0 {
		return Err(Error::validation("search.top_k must be greater than zero."));
	}
	if search.top_k > search.candidate_k {
		return Err(Error::validation("search.top_k must be less than or equal to search.candidate_k."));
	}
	if search.max_query_chars == 0 {
		return Err(Error::validation("search.max_query_chars must be greater than zero."));
	}

	for (label, backend) in [("search.vector", &search.vector), ("search.metadata", &search.metadata)]
	{
		validate_backend(label, backend)?;
	}

	if search.cache.enabled {
		if search.cache.ttl_secs == 0 {
			return Err(Error::validation("search.cache.ttl_secs must be greater than zero."));
		}
		if search.cache.capacity == 0 {
			return Err(Error::validation("search.cache.capacity must be greater than zero."));
		}
		if search.cache.sweep_interval_secs == 0 {
			return Err(Error::validation(
				"search.cache.sweep_interval_secs must be greater than zero.",
			));
		}
	}

	Ok(())
}

fn validate_backend(label: &str, backend: &SearchBackend) -> Result<()> {
	if backend.timeout_ms == 0 {
		return Err(Error::validation(format!("{label}.timeout_ms must be greater than zero.")));
	}
	if !matches!(backend.normalization.as_str(), NORMALIZATION_RANGE | NORMALIZATION_MIN_MAX) {
		return Err(Error::validation(format!(
			"{label}.normalization must be one of range or min_max."
		)));
	}
	if !backend.score_min.is_finite() || !backend.score_max.is_finite() {
		return Err(Error::validation(format!(
			"{label}.score_min and {label}.score_max must be finite numbers."
		)));
	}
	if backend.score_min >= backend.score_max {
		return Err(Error::validation(format!(
			"{label}.score_min must be less than {label}.score_max."
		)));
	}

	Ok(())
}

fn is_sql_identifier(raw: &str) -> bool {
	let mut chars = raw.chars();

	match chars.next() {
		Some(first) if first.is_ascii_lowercase() || first == '_' => {},
		_ => return false,
	}

	chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
}

fn normalize(cfg: &mut Config) {
	cfg.security.auth_mode = cfg.security.auth_mode.trim().to_ascii_lowercase();

	for backend in [&mut cfg.search.vector, &mut cfg.search.metadata] {
		backend.normalization = backend.normalization.trim().to_ascii_lowercase();
	}

	if let Some(remote) = cfg.security.remote.as_mut()
		&& remote.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false)
	{
		remote.api_key = None;
	}
}

#[cfg(test)]
mod tests {
	use super::is_sql_identifier;

	#[test]
	fn accepts_plain_identifiers_only() {
		assert!(is_sql_identifier("catalog_items"));
		assert!(is_sql_identifier("_items2"));
		assert!(!is_sql_identifier("2items"));
		assert!(!is_sql_identifier("items; DROP TABLE x"));
		assert!(!is_sql_identifier("Items"));
		assert!(!is_sql_identifier(""));
	}
}
