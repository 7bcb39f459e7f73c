pub mod aggregate;
pub mod backends;
pub mod cache;
pub mod metrics;
pub mod normalize;
pub mod search;

mod error;

pub use aggregate::{Aggregator, AggregatorSettings, BackendPolicy};
pub use cache::{CacheStatsSnapshot, CacheValue, Lookup, LookupOrigin, ResultCache};
pub use error::{Error, Result};
pub use metrics::{BackendSnapshot, Metrics, MetricsSnapshot};
pub use normalize::{MinMax, Range, ScoreNormalizer};
pub use search::{HybridSearchService, SearchHit, SearchQuery, SearchResponse};

use std::{collections::BTreeMap, future::Future, pin::Pin, sync::Arc};

use serde_json::{Map, Value};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A raw hit returned by a backend adapter, scored on that backend's scale.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
	pub item_id: String,
	pub raw_score: f32,
	pub attributes: Map<String, Value>,
}
impl RawHit {
	pub fn new(item_id: impl Into<String>, raw_score: f32) -> Self {
		Self { item_id: item_id.into(), raw_score, attributes: Map::new() }
	}

	pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.attributes.insert(key.into(), value.into());

		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
	pub requester_id: String,
}

pub trait AuthProvider
where
	Self: Send + Sync,
{
	/// Maps a bearer credential to a requester, or fails with [`Error::Unauthorized`].
	fn validate<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Result<Requester>>;
}

pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn nearest_neighbors<'a>(
		&'a self,
		query_text: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<RawHit>>>;
}

pub trait MetadataStore
where
	Self: Send + Sync,
{
	fn filter_match<'a>(
		&'a self,
		query_text: &'a str,
		filters: &'a BTreeMap<String, String>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<RawHit>>>;
}

#[derive(Clone)]
pub struct Backends {
	pub auth: Arc<dyn AuthProvider>,
	pub vector: Arc<dyn VectorIndex>,
	pub metadata: Arc<dyn MetadataStore>,
}
impl Backends {
	pub fn new(
		auth: Arc<dyn AuthProvider>,
		vector: Arc<dyn VectorIndex>,
		metadata: Arc<dyn MetadataStore>,
	) -> Self {
		Self { auth, vector, metadata }
	}
}
