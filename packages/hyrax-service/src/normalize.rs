//! Per-source score normalization.
//!
//! Each backend scores on its own scale, so raw scores are never compared across sources. A
//! normalizer maps one backend's batch onto `[0, 1]` before the merge step sees it.

use std::{fmt, sync::Arc};

use hyrax_config::{NORMALIZATION_MIN_MAX, NORMALIZATION_RANGE, SearchBackend};

pub trait ScoreNormalizer
where
	Self: fmt::Debug + Send + Sync,
{
	fn name(&self) -> &'static str;

	/// Returns one normalized score per input score, in input order, each within `[0, 1]`.
	fn normalize(&self, scores: &[f32]) -> Vec<f32>;
}

/// Rescales by the batch's own minimum and maximum.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinMax;
impl ScoreNormalizer for MinMax {
	fn name(&self) -> &'static str {
		NORMALIZATION_MIN_MAX
	}

	fn normalize(&self, scores: &[f32]) -> Vec<f32> {
		let Some((lo, hi)) = observed_bounds(scores) else { return Vec::new() };

		rescale(scores, lo, hi)
	}
}

/// Rescales by a declared score range, widened to cover anything the batch reports outside it.
#[derive(Debug, Clone, Copy)]
pub struct Range {
	min: f32,
	max: f32,
}
impl Range {
	pub fn new(min: f32, max: f32) -> Self {
		Self { min, max }
	}
}
impl ScoreNormalizer for Range {
	fn name(&self) -> &'static str {
		NORMALIZATION_RANGE
	}

	fn normalize(&self, scores: &[f32]) -> Vec<f32> {
		let Some((lo, hi)) = observed_bounds(scores) else { return Vec::new() };

		rescale(scores, lo.min(self.min), hi.max(self.max))
	}
}

pub fn from_config(cfg: &SearchBackend) -> Arc<dyn ScoreNormalizer> {
	match cfg.normalization.as_str() {
		NORMALIZATION_MIN_MAX => Arc::new(MinMax),
		_ => Arc::new(Range::new(cfg.score_min, cfg.score_max)),
	}
}

fn observed_bounds(scores: &[f32]) -> Option<(f32, f32)> {
	scores.iter().copied().filter(|score| score.is_finite()).fold(None, |acc, score| match acc {
		None => Some((score, score)),
		Some((lo, hi)) => Some((lo.min(score), hi.max(score))),
	})
}

fn rescale(scores: &[f32], lo: f32, hi: f32) -> Vec<f32> {
	let span = hi - lo;

	scores
		.iter()
		.map(|score| {
			if !score.is_finite() {
				0.0
			} else if span <= f32::EPSILON {
				1.0
			} else {
				((score - lo) / span).clamp(0.0, 1.0)
			}
		})
		.collect()
}
