use std::{collections::BTreeMap, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{
	AuthProvider, Backends, Error, Requester, Result,
	aggregate::{Aggregator, AggregatorSettings},
	cache::{LookupOrigin, ResultCache},
	metrics::{Metrics, MetricsSnapshot},
};
use hyrax_config::Config;
use hyrax_domain::{SearchRequest, SearchResults, SourceKind};

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
	pub query_text: String,
	#[serde(default)]
	pub filters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
	pub item_id: String,
	pub score: f32,
	pub attributes: Map<String, Value>,
	pub sources: Vec<SourceKind>,
	pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
	pub results: Vec<SearchHit>,
	pub degraded_sources: Vec<SourceKind>,
}
impl SearchResponse {
	fn from_results(results: &SearchResults) -> Self {
		let degraded = results.is_degraded();

		Self {
			results: results
				.items
				.iter()
				.map(|item| SearchHit {
					item_id: item.item_id.clone(),
					score: item.normalized_score,
					attributes: item.attributes.clone(),
					sources: item.sources.clone(),
					degraded,
				})
				.collect(),
			degraded_sources: results.degraded_sources.clone(),
		}
	}

	pub fn is_degraded(&self) -> bool {
		!self.degraded_sources.is_empty()
	}
}

pub struct HybridSearchService {
	pub cfg: Config,
	auth: Arc<dyn AuthProvider>,
	aggregator: Arc<Aggregator>,
	cache: Option<ResultCache<Arc<SearchResults>>>,
	metrics: Arc<Metrics>,
}
impl HybridSearchService {
	pub fn new(cfg: Config, backends: Backends) -> Self {
		let metrics = Arc::new(Metrics::default());
		let aggregator = Arc::new(Aggregator::new(
			&backends,
			AggregatorSettings::from_config(&cfg.search),
			metrics.clone(),
		));
		let cache = cfg.search.cache.enabled.then(|| ResultCache::from_config(&cfg.search.cache));

		Self { cfg, auth: backends.auth, aggregator, cache, metrics }
	}

	/// Authenticates the bearer credential and answers the query, recording request metrics.
	pub async fn search(&self, credential: &str, query: SearchQuery) -> Result<SearchResponse> {
		self.metrics.record_request();

		let outcome = match self.authenticate(credential).await {
			Ok(requester) => self.search_as(&requester, query).await,
			Err(err) => Err(err),
		};

		match &outcome {
			Ok(response) => self.metrics.record_response(response.is_degraded()),
			Err(err) => self.metrics.record_error(err),
		}

		outcome
	}

	/// Accounts for a call whose body could not be decoded. The credential is still checked
	/// first, so an unauthenticated caller learns nothing about the body.
	pub async fn reject_malformed(&self, credential: &str, message: impl Into<String>) -> Error {
		self.metrics.record_request();

		let err = match self.authenticate(credential).await {
			Ok(_) => Error::InvalidRequest { message: message.into() },
			Err(err) => err,
		};

		self.metrics.record_error(&err);

		err
	}

	pub async fn authenticate(&self, credential: &str) -> Result<Requester> {
		let credential = credential.trim();

		if credential.is_empty() {
			let message = "Bearer credential is required.".to_string();

			return Err(Error::Unauthorized { message });
		}

		self.auth.validate(credential).await
	}

	async fn search_as(&self, requester: &Requester, query: SearchQuery) -> Result<SearchResponse> {
		let request = SearchRequest::new(
			requester.requester_id.clone(),
			&query.query_text,
			query.filters,
			self.cfg.search.max_query_chars as usize,
		)?;
		let results = match &self.cache {
			Some(cache) => {
				let key = request.cache_key();
				let aggregator = self.aggregator.clone();
				let lookup = cache
					.get_or_compute(&key, move || async move {
						aggregator.search(&request).await.map(Arc::new)
					})
					.await?;

				if lookup.origin != LookupOrigin::Miss {
					tracing::debug!(origin = ?lookup.origin, "Served search from cache.");
				}

				lookup.value
			},
			None => Arc::new(self.aggregator.search(&request).await?),
		};

		if results.is_degraded() {
			tracing::info!(
				requester_id = %requester.requester_id,
				degraded = ?results.degraded_sources,
				"Returning degraded search results."
			);
		}

		Ok(SearchResponse::from_results(&results))
	}

	pub fn metrics(&self) -> MetricsSnapshot {
		self.metrics.snapshot(self.cache.as_ref().map(ResultCache::stats))
	}

	pub fn cache(&self) -> Option<&ResultCache<Arc<SearchResults>>> {
		self.cache.as_ref()
	}

	pub fn purge_expired(&self) -> usize {
		self.cache.as_ref().map(ResultCache::purge_expired).unwrap_or(0)
	}

	/// Starts the background task that drops expired cache entries. Returns `None` when the
	/// cache is disabled.
	pub fn spawn_cache_sweeper(&self) -> Option<JoinHandle<()>> {
		let cache = self.cache.clone()?;
		let period = Duration::from_secs(self.cfg.search.cache.sweep_interval_secs);

		Some(tokio::spawn(async move {
			let mut ticker = tokio::time::interval(period);

			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				ticker.tick().await;
				cache.purge_expired();
			}
		}))
	}
}
