use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
	Vector,
	Metadata,
}
impl SourceKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Vector => "vector",
			Self::Metadata => "metadata",
		}
	}
}
impl fmt::Display for SourceKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One hit from a single backend, scored on that backend's own scale.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateResult {
	pub item_id: String,
	pub source_kind: SourceKind,
	pub score: f32,
	pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
	pub item_id: String,
	/// Cross-source comparable score in `[0, 1]`.
	pub normalized_score: f32,
	pub attributes: Map<String, Value>,
	pub sources: Vec<SourceKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
	pub items: Vec<RankedResult>,
	/// Backends that failed or timed out while assembling `items`.
	pub degraded_sources: Vec<SourceKind>,
}
impl SearchResults {
	pub fn is_degraded(&self) -> bool {
		!self.degraded_sources.is_empty()
	}
}
