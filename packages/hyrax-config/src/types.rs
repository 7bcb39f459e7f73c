use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub security: Security,
	pub providers: Providers,
	pub storage: Storage,
	pub search: Search,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
	/// One of "static_keys" or "remote".
	pub auth_mode: String,
	#[serde(default)]
	pub auth_keys: Vec<SecurityAuthKey>,
	pub remote: Option<RemoteAuth>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityAuthKey {
	pub token: String,
	pub requester_id: String,
}

/// Token introspection endpoint used when `auth_mode = "remote"`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAuth {
	pub api_base: String,
	pub path: String,
	/// Optional service credential sent as a bearer token alongside the validated credential.
	pub api_key: Option<String>,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
	#[serde(default = "default_catalog_table")]
	pub table: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Search {
	/// Per-backend fetch limit.
	pub candidate_k: u32,
	/// Final number of merged results returned to the caller.
	pub top_k: u32,
	#[serde(default = "default_max_query_chars")]
	pub max_query_chars: u32,
	#[serde(default = "SearchBackend::vector_default")]
	pub vector: SearchBackend,
	#[serde(default = "SearchBackend::metadata_default")]
	pub metadata: SearchBackend,
	#[serde(default)]
	pub cache: SearchCache,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchBackend {
	pub timeout_ms: u64,
	/// One of "range" or "min_max".
	pub normalization: String,
	pub score_min: f32,
	pub score_max: f32,
}
impl SearchBackend {
	pub fn vector_default() -> Self {
		Self {
			timeout_ms: 800,
			normalization: "range".to_string(),
			score_min: 0.0,
			score_max: 1.0,
		}
	}

	pub fn metadata_default() -> Self {
		Self {
			timeout_ms: 800,
			normalization: "range".to_string(),
			score_min: 0.0,
			score_max: 5.0,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchCache {
	pub enabled: bool,
	pub ttl_secs: u64,
	pub capacity: u32,
	pub sweep_interval_secs: u64,
	/// Store results assembled while one backend was down. Turn off to retry such requests
	/// against the full backend set instead of serving them for the whole TTL.
	pub cache_degraded: bool,
}
impl Default for SearchCache {
	fn default() -> Self {
		Self {
			enabled: true,
			ttl_secs: 60,
			capacity: 1_024,
			sweep_interval_secs: 30,
			cache_degraded: true,
		}
	}
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_catalog_table() -> String {
	"catalog_items".to_string()
}

fn default_max_query_chars() -> u32 {
	1_024
}
