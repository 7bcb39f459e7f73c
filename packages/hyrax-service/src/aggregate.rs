use std::{
	cmp::Ordering,
	collections::{BTreeMap, HashMap, hash_map::Entry},
	sync::Arc,
	time::Duration,
};

use tokio::time::{self, Instant};

use crate::{
	Backends, MetadataStore, RawHit, Result, VectorIndex,
	metrics::{BackendOutcome, Metrics},
	normalize::{self, ScoreNormalizer},
};
use hyrax_config::Search;
use hyrax_domain::{CandidateResult, RankedResult, SearchRequest, SearchResults, SourceKind};

#[derive(Debug, Clone)]
pub struct BackendPolicy {
	pub timeout: Duration,
	pub normalizer: Arc<dyn ScoreNormalizer>,
}
impl BackendPolicy {
	pub fn new(timeout: Duration, normalizer: Arc<dyn ScoreNormalizer>) -> Self {
		Self { timeout, normalizer }
	}
}

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
	pub candidate_k: u32,
	pub top_k: u32,
	pub vector: BackendPolicy,
	pub metadata: BackendPolicy,
}
impl AggregatorSettings {
	pub fn from_config(cfg: &Search) -> Self {
		Self {
			candidate_k: cfg.candidate_k,
			top_k: cfg.top_k,
			vector: BackendPolicy::new(
				Duration::from_millis(cfg.vector.timeout_ms),
				normalize::from_config(&cfg.vector),
			),
			metadata: BackendPolicy::new(
				Duration::from_millis(cfg.metadata.timeout_ms),
				normalize::from_config(&cfg.metadata),
			),
		}
	}
}

/// Fans one request out to both backends and merges their answers into a single ranking.
pub struct Aggregator {
	vector: Arc<dyn VectorIndex>,
	metadata: Arc<dyn MetadataStore>,
	settings: AggregatorSettings,
	metrics: Arc<Metrics>,
}
impl Aggregator {
	pub fn new(backends: &Backends, settings: AggregatorSettings, metrics: Arc<Metrics>) -> Self {
		Self {
			vector: backends.vector.clone(),
			metadata: backends.metadata.clone(),
			settings,
			metrics,
		}
	}

	pub fn settings(&self) -> &AggregatorSettings {
		&self.settings
	}

	pub async fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
		let query_text = request.query_text();

		if query_text.trim().is_empty() {
			return Err(crate::Error::InvalidRequest {
				message: "query_text must be non-empty.".to_string(),
			});
		}

		let limit = self.settings.candidate_k;
		let (vector, metadata) = tokio::join!(
			self.call_backend(
				SourceKind::Vector,
				self.settings.vector.timeout,
				self.vector.nearest_neighbors(query_text, limit),
			),
			self.call_backend(
				SourceKind::Metadata,
				self.settings.metadata.timeout,
				self.metadata.filter_match(query_text, request.filters(), limit),
			),
		);

		let mut degraded_sources = Vec::new();
		let mut failures = Vec::new();
		let mut normalized = Vec::new();

		for (source_kind, outcome, policy) in [
			(SourceKind::Vector, vector, &self.settings.vector),
			(SourceKind::Metadata, metadata, &self.settings.metadata),
		] {
			match outcome {
				Ok(hits) => {
					let candidates = to_candidates(source_kind, hits);

					normalized.extend(normalize_batch(policy.normalizer.as_ref(), candidates));
				},
				Err(err) => {
					degraded_sources.push(source_kind);
					failures.push(err.to_string());
				},
			}
		}

		if degraded_sources.len() == 2 {
			return Err(crate::Error::RetrievalUnavailable { message: failures.join(" ") });
		}

		let mut items = merge_normalized(normalized);

		items.truncate(self.settings.top_k as usize);

		tracing::debug!(
			items = items.len(),
			degraded = ?degraded_sources,
			"Aggregated hybrid search results."
		);

		Ok(SearchResults { items, degraded_sources })
	}

	async fn call_backend(
		&self,
		source_kind: SourceKind,
		timeout: Duration,
		call: impl Future<Output = Result<Vec<RawHit>>>,
	) -> Result<Vec<RawHit>> {
		let started = Instant::now();
		let outcome = time::timeout(timeout, call).await;
		let elapsed = started.elapsed();

		match outcome {
			Ok(Ok(hits)) => {
				self.metrics.record_backend(source_kind, BackendOutcome::Ok, elapsed);

				Ok(hits)
			},
			Ok(Err(err)) => {
				tracing::warn!(source = %source_kind, error = %err, "Search backend failed.");
				self.metrics.record_backend(source_kind, BackendOutcome::Failed, elapsed);

				Err(err)
			},
			Err(_) => {
				let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

				tracing::warn!(source = %source_kind, timeout_ms, "Search backend timed out.");
				self.metrics.record_backend(source_kind, BackendOutcome::TimedOut, elapsed);

				Err(crate::Error::BackendTimeout { source_kind, timeout_ms })
			},
		}
	}
}

/// Orders by score descending, NaN last.
pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

fn to_candidates(source_kind: SourceKind, hits: Vec<RawHit>) -> Vec<CandidateResult> {
	let mut by_id: BTreeMap<String, CandidateResult> = BTreeMap::new();

	for hit in hits {
		if !hit.raw_score.is_finite() {
			tracing::warn!(
				source = %source_kind,
				item_id = %hit.item_id,
				"Dropping candidate with non-finite score."
			);

			continue;
		}

		let candidate = CandidateResult {
			item_id: hit.item_id,
			source_kind,
			score: hit.raw_score,
			attributes: hit.attributes,
		};

		let keep_existing = by_id
			.get(&candidate.item_id)
			.is_some_and(|existing| existing.score >= candidate.score);

		if !keep_existing {
			by_id.insert(candidate.item_id.clone(), candidate);
		}
	}

	by_id.into_values().collect()
}

fn normalize_batch(
	normalizer: &dyn ScoreNormalizer,
	candidates: Vec<CandidateResult>,
) -> Vec<(CandidateResult, f32)> {
	let raw: Vec<f32> = candidates.iter().map(|candidate| candidate.score).collect();
	let normalized = normalizer.normalize(&raw);

	candidates.into_iter().zip(normalized).collect()
}

/// Collapses candidates sharing an item id into one result carrying the highest normalized score.
///
/// Input is expected vector-first, so metadata attributes win on key collisions.
fn merge_normalized(normalized: Vec<(CandidateResult, f32)>) -> Vec<RankedResult> {
	let mut merged: HashMap<String, RankedResult> = HashMap::new();

	for (candidate, score) in normalized {
		let score = score.clamp(0.0, 1.0);

		match merged.entry(candidate.item_id) {
			Entry::Occupied(mut entry) => {
				let ranked = entry.get_mut();

				ranked.normalized_score = ranked.normalized_score.max(score);
				ranked.attributes.extend(candidate.attributes);

				if !ranked.sources.contains(&candidate.source_kind) {
					ranked.sources.push(candidate.source_kind);
				}
			},
			Entry::Vacant(entry) => {
				let item_id = entry.key().clone();

				entry.insert(RankedResult {
					item_id,
					normalized_score: score,
					attributes: candidate.attributes,
					sources: vec![candidate.source_kind],
				});
			},
		}
	}

	let mut items: Vec<RankedResult> = merged
		.into_values()
		.map(|mut ranked| {
			ranked.sources.sort();

			ranked
		})
		.collect();

	items.sort_by(|a, b| {
		cmp_f32_desc(a.normalized_score, b.normalized_score).then_with(|| a.item_id.cmp(&b.item_id))
	});

	items
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::normalize::Range;

	fn hit(item_id: &str, score: f32) -> RawHit {
		RawHit::new(item_id, score)
	}

	fn scored(source_kind: SourceKind, item_id: &str, score: f32) -> (CandidateResult, f32) {
		let candidate = CandidateResult {
			item_id: item_id.to_string(),
			source_kind,
			score,
			attributes: Default::default(),
		};

		(candidate, score)
	}

	#[test]
	fn duplicates_within_a_source_keep_highest_raw_score() {
		let candidates =
			to_candidates(SourceKind::Vector, vec![hit("a", 0.2), hit("a", 0.7), hit("b", 0.5)]);

		assert_eq!(candidates.len(), 2);
		assert_eq!(candidates[0].item_id, "a");
		assert_eq!(candidates[0].score, 0.7);
	}

	#[test]
	fn non_finite_scores_are_dropped() {
		let candidates = to_candidates(
			SourceKind::Metadata,
			vec![hit("a", f32::NAN), hit("b", f32::INFINITY), hit("c", 1.0)],
		);

		assert_eq!(candidates.len(), 1);
		assert_eq!(candidates[0].item_id, "c");
	}

	#[test]
	fn ties_break_on_item_id() {
		let items = merge_normalized(vec![
			scored(SourceKind::Vector, "zeta", 0.5),
			scored(SourceKind::Metadata, "alpha", 0.5),
			scored(SourceKind::Metadata, "mid", 0.8),
		]);
		let ids: Vec<&str> = items.iter().map(|item| item.item_id.as_str()).collect();

		assert_eq!(ids, vec!["mid", "alpha", "zeta"]);
	}

	#[test]
	fn shared_items_take_the_max_and_merge_provenance() {
		let mut vector = scored(SourceKind::Vector, "x", 0.3);
		let mut metadata = scored(SourceKind::Metadata, "x", 0.6);

		vector.0.attributes.insert("title".to_string(), json!("from vector"));
		vector.0.attributes.insert("genre".to_string(), json!("sci-fi"));
		metadata.0.attributes.insert("title".to_string(), json!("from catalog"));

		let items = merge_normalized(vec![vector, metadata]);

		assert_eq!(items.len(), 1);
		assert_eq!(items[0].normalized_score, 0.6);
		assert_eq!(items[0].sources, vec![SourceKind::Vector, SourceKind::Metadata]);
		assert_eq!(items[0].attributes["title"], json!("from catalog"));
		assert_eq!(items[0].attributes["genre"], json!("sci-fi"));
	}

	#[test]
	fn sci_fi_scenario_ranks_across_scales() {
		let vector = to_candidates(SourceKind::Vector, vec![hit("A", 0.81), hit("B", 0.40)]);
		let metadata = to_candidates(SourceKind::Metadata, vec![hit("B", 4.5), hit("C", 2.0)]);
		let mut normalized = normalize_batch(&Range::new(0.0, 1.0), vector);

		normalized.extend(normalize_batch(&Range::new(0.0, 5.0), metadata));

		let items = merge_normalized(normalized);
		let ranked: Vec<(&str, f32)> =
			items.iter().map(|item| (item.item_id.as_str(), item.normalized_score)).collect();

		assert_eq!(ranked.len(), 3);
		assert_eq!(ranked[0].0, "B");
		assert!((ranked[0].1 - 0.9).abs() < 1e-6);
		assert_eq!(ranked[1].0, "A");
		assert!((ranked[1].1 - 0.81).abs() < 1e-6);
		assert_eq!(ranked[2].0, "C");
		assert!((ranked[2].1 - 0.4).abs() < 1e-6);
	}
}
