//! Production adapters behind the backend traits.

use std::{
	collections::{BTreeMap, HashMap},
	sync::Arc,
};

use crate::{
	AuthProvider, Backends, BoxFuture, Error, MetadataStore, RawHit, Requester, Result,
	VectorIndex,
};
use hyrax_config::{AUTH_MODE_REMOTE, AUTH_MODE_STATIC_KEYS, Config, EmbeddingProviderConfig};
use hyrax_domain::SourceKind;
use hyrax_storage::{catalog, db::Db, qdrant::QdrantStore};

/// Embeds the query text, then asks Qdrant for its nearest neighbors.
pub struct QdrantVectorIndex {
	embedding: EmbeddingProviderConfig,
	store: QdrantStore,
}
impl QdrantVectorIndex {
	pub fn new(embedding: EmbeddingProviderConfig, store: QdrantStore) -> Self {
		Self { embedding, store }
	}

	async fn search(&self, query_text: &str, limit: u32) -> Result<Vec<RawHit>> {
		let vector = hyrax_providers::embedding::embed_query(&self.embedding, query_text)
			.await
			.map_err(|err| Error::backend(SourceKind::Vector, err))?;
		let matches = self
			.store
			.nearest(vector, limit)
			.await
			.map_err(|err| Error::backend(SourceKind::Vector, err))?;

		Ok(matches
			.into_iter()
			.map(|hit| RawHit {
				item_id: hit.item_id,
				raw_score: hit.score,
				attributes: hit.attributes,
			})
			.collect())
	}
}
impl VectorIndex for QdrantVectorIndex {
	fn nearest_neighbors<'a>(
		&'a self,
		query_text: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<RawHit>>> {
		Box::pin(self.search(query_text, limit))
	}
}

/// Fuzzy title/body match over the Postgres catalog, scored by rating.
pub struct CatalogMetadataStore {
	db: Db,
	table: String,
}
impl CatalogMetadataStore {
	pub fn new(db: Db, table: impl Into<String>) -> Self {
		Self { db, table: table.into() }
	}

	async fn search(
		&self,
		query_text: &str,
		filters: &BTreeMap<String, String>,
		limit: u32,
	) -> Result<Vec<RawHit>> {
		let matches = catalog::filter_match(&self.db, &self.table, query_text, filters, limit)
			.await
			.map_err(|err| Error::backend(SourceKind::Metadata, err))?;

		Ok(matches
			.into_iter()
			.map(|row| RawHit {
				item_id: row.item_id,
				raw_score: row.rating,
				attributes: row.attributes,
			})
			.collect())
	}
}
impl MetadataStore for CatalogMetadataStore {
	fn filter_match<'a>(
		&'a self,
		query_text: &'a str,
		filters: &'a BTreeMap<String, String>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<RawHit>>> {
		Box::pin(self.search(query_text, filters, limit))
	}
}

/// Bearer tokens listed in the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyAuth {
	keys: HashMap<String, String>,
}
impl StaticKeyAuth {
	pub fn new<I, T, R>(keys: I) -> Self
	where
		I: IntoIterator<Item = (T, R)>,
		T: Into<String>,
		R: Into<String>,
	{
		let keys = keys.into_iter().map(|(token, requester)| (token.into(), requester.into()));

		Self { keys: keys.collect() }
	}

	pub fn from_config(cfg: &hyrax_config::Security) -> Self {
		Self::new(cfg.auth_keys.iter().map(|key| (key.token.clone(), key.requester_id.clone())))
	}
}
impl AuthProvider for StaticKeyAuth {
	fn validate<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Result<Requester>> {
		let outcome = match self.keys.get(credential) {
			Some(requester_id) => Ok(Requester { requester_id: requester_id.clone() }),
			None => Err(Error::Unauthorized { message: "Unknown bearer token.".to_string() }),
		};

		Box::pin(async move { outcome })
	}
}

/// Delegates credential checks to an external introspection endpoint.
#[derive(Debug, Clone)]
pub struct RemoteAuthProvider {
	cfg: hyrax_config::RemoteAuth,
}
impl RemoteAuthProvider {
	pub fn new(cfg: hyrax_config::RemoteAuth) -> Self {
		Self { cfg }
	}
}
impl AuthProvider for RemoteAuthProvider {
	fn validate<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Result<Requester>> {
		Box::pin(async move {
			let requester_id = hyrax_providers::auth::validate(&self.cfg, credential).await?;

			Ok(Requester { requester_id })
		})
	}
}

impl Backends {
	pub fn from_config(cfg: &Config, db: Db, qdrant: QdrantStore) -> Result<Self> {
		let auth: Arc<dyn AuthProvider> = match cfg.security.auth_mode.as_str() {
			AUTH_MODE_STATIC_KEYS => Arc::new(StaticKeyAuth::from_config(&cfg.security)),
			AUTH_MODE_REMOTE => {
				let remote = cfg.security.remote.clone().ok_or_else(|| Error::Internal {
					message: "security.remote is missing.".to_string(),
				})?;

				Arc::new(RemoteAuthProvider::new(remote))
			},
			other => {
				return Err(Error::Internal { message: format!("Unsupported auth mode {other}.") });
			},
		};
		let vector = Arc::new(QdrantVectorIndex::new(cfg.providers.embedding.clone(), qdrant));
		let metadata = Arc::new(CatalogMetadataStore::new(db, cfg.storage.postgres.table.clone()));

		Ok(Self::new(auth, vector, metadata))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn static_keys_resolve_requesters() {
		let auth = StaticKeyAuth::new([("token-a", "requester-a")]);
		let requester = auth.validate("token-a").await.expect("known token");

		assert_eq!(requester.requester_id, "requester-a");
		assert!(matches!(auth.validate("token-b").await, Err(Error::Unauthorized { .. })));
	}
}
