//! Process-wide counters exposed on the admin router.

use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::Duration,
};

use serde::Serialize;

use hyrax_domain::SourceKind;

use crate::cache::CacheStatsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOutcome {
	Ok,
	Failed,
	TimedOut,
}

#[derive(Debug, Default)]
pub struct Metrics {
	requests: AtomicU64,
	responses: AtomicU64,
	degraded_responses: AtomicU64,
	retrieval_unavailable: AtomicU64,
	unauthorized: AtomicU64,
	invalid_requests: AtomicU64,
	internal_errors: AtomicU64,
	vector: BackendStats,
	metadata: BackendStats,
}
impl Metrics {
	pub fn record_request(&self) {
		self.requests.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_response(&self, degraded: bool) {
		self.responses.fetch_add(1, Ordering::Relaxed);

		if degraded {
			self.degraded_responses.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub fn record_error(&self, err: &crate::Error) {
		let counter = match err {
			crate::Error::Unauthorized { .. } => &self.unauthorized,
			crate::Error::InvalidRequest { .. } => &self.invalid_requests,
			crate::Error::RetrievalUnavailable { .. } => &self.retrieval_unavailable,
			_ => &self.internal_errors,
		};

		counter.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_backend(
		&self,
		source_kind: SourceKind,
		outcome: BackendOutcome,
		elapsed: Duration,
	) {
		let stats = match source_kind {
			SourceKind::Vector => &self.vector,
			SourceKind::Metadata => &self.metadata,
		};

		stats.record(outcome, elapsed);
	}

	pub fn snapshot(&self, cache: Option<CacheStatsSnapshot>) -> MetricsSnapshot {
		let responses = self.responses.load(Ordering::Relaxed);
		let degraded_responses = self.degraded_responses.load(Ordering::Relaxed);
		let degraded_rate =
			if responses == 0 { 0.0 } else { degraded_responses as f64 / responses as f64 };

		MetricsSnapshot {
			requests: self.requests.load(Ordering::Relaxed),
			responses,
			degraded_responses,
			degraded_rate,
			retrieval_unavailable: self.retrieval_unavailable.load(Ordering::Relaxed),
			unauthorized: self.unauthorized.load(Ordering::Relaxed),
			invalid_requests: self.invalid_requests.load(Ordering::Relaxed),
			internal_errors: self.internal_errors.load(Ordering::Relaxed),
			vector: self.vector.snapshot(),
			metadata: self.metadata.snapshot(),
			cache,
		}
	}
}

#[derive(Debug, Default)]
struct BackendStats {
	calls: AtomicU64,
	failures: AtomicU64,
	timeouts: AtomicU64,
	latency_ms_total: AtomicU64,
	latency_ms_max: AtomicU64,
}
impl BackendStats {
	fn record(&self, outcome: BackendOutcome, elapsed: Duration) {
		let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

		self.calls.fetch_add(1, Ordering::Relaxed);
		self.latency_ms_total.fetch_add(elapsed_ms, Ordering::Relaxed);
		self.latency_ms_max.fetch_max(elapsed_ms, Ordering::Relaxed);

		match outcome {
			BackendOutcome::Ok => {},
			BackendOutcome::Failed => {
				self.failures.fetch_add(1, Ordering::Relaxed);
			},
			BackendOutcome::TimedOut => {
				self.timeouts.fetch_add(1, Ordering::Relaxed);
			},
		}
	}

	fn snapshot(&self) -> BackendSnapshot {
		BackendSnapshot {
			calls: self.calls.load(Ordering::Relaxed),
			failures: self.failures.load(Ordering::Relaxed),
			timeouts: self.timeouts.load(Ordering::Relaxed),
			latency_ms_total: self.latency_ms_total.load(Ordering::Relaxed),
			latency_ms_max: self.latency_ms_max.load(Ordering::Relaxed),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
	pub requests: u64,
	pub responses: u64,
	pub degraded_responses: u64,
	pub degraded_rate: f64,
	pub retrieval_unavailable: u64,
	pub unauthorized: u64,
	pub invalid_requests: u64,
	pub internal_errors: u64,
	pub vector: BackendSnapshot,
	pub metadata: BackendSnapshot,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cache: Option<CacheStatsSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackendSnapshot {
	pub calls: u64,
	pub failures: u64,
	pub timeouts: u64,
	pub latency_ms_total: u64,
	pub latency_ms_max: u64,
}
