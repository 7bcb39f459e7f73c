//! TTL + LRU result cache with single-flight computation.
//!
//! A miss spawns the computation on the runtime and parks a shared handle to it in the
//! in-flight map. Every caller asking for the same key while it runs awaits that handle, and the
//! handle is removed only once the computation has settled. Dropping a waiter never cancels the
//! spawned task, so a disconnecting client cannot starve the callers coalesced behind it.

use std::{
	collections::{BTreeMap, HashMap},
	sync::{
		Arc, Mutex, MutexGuard,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration,
};

use futures::future::{FutureExt, Shared};
use serde::Serialize;
use tokio::time::Instant;

use crate::{BoxFuture, Error, Result};
use hyrax_domain::SearchResults;

type Flight<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Values the cache can hold. Degraded values are stored only when the cache is built with
/// `cache_degraded`; otherwise they reach every waiter of the current flight without being kept.
pub trait CacheValue
where
	Self: Clone + Send + Sync + 'static,
{
	fn is_degraded(&self) -> bool {
		false
	}
}

impl CacheValue for Arc<SearchResults> {
	fn is_degraded(&self) -> bool {
		SearchResults::is_degraded(self)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOrigin {
	Hit,
	Miss,
	Coalesced,
}

#[derive(Debug, Clone)]
pub struct Lookup<V> {
	pub value: V,
	pub origin: LookupOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
	pub entries: usize,
	pub in_flight: usize,
	pub hits: u64,
	pub misses: u64,
	pub coalesced: u64,
	pub evictions: u64,
	pub expirations: u64,
}

#[derive(Clone)]
pub struct ResultCache<V> {
	state: Arc<Mutex<State<V>>>,
	stats: Arc<CacheStats>,
	ttl: Duration,
	capacity: usize,
	cache_degraded: bool,
}
impl<V> ResultCache<V>
where
	V: CacheValue,
{
	pub fn new(ttl: Duration, capacity: usize) -> Self {
		Self {
			state: Arc::new(Mutex::new(State::default())),
			stats: Arc::new(CacheStats::default()),
			ttl,
			capacity: capacity.max(1),
			cache_degraded: true,
		}
	}

	pub fn from_config(cfg: &hyrax_config::SearchCache) -> Self {
		Self::new(Duration::from_secs(cfg.ttl_secs), cfg.capacity as usize)
			.with_cache_degraded(cfg.cache_degraded)
	}

	pub fn with_cache_degraded(mut self, cache_degraded: bool) -> Self {
		self.cache_degraded = cache_degraded;

		self
	}

	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Returns the cached value for `key`, or runs `compute` at most once across concurrent
	/// callers and shares its outcome with all of them.
	pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<Lookup<V>>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<V>> + Send + 'static,
	{
		let (flight, origin) = {
			let mut state = self.lock();
			let now = Instant::now();

			if let Some(value) = state.touch(key, now, &self.stats) {
				self.stats.hits.fetch_add(1, Ordering::Relaxed);

				return Ok(Lookup { value, origin: LookupOrigin::Hit });
			}

			if let Some(flight) = state.in_flight.get(key) {
				self.stats.coalesced.fetch_add(1, Ordering::Relaxed);

				(flight.clone(), LookupOrigin::Coalesced)
			} else {
				self.stats.misses.fetch_add(1, Ordering::Relaxed);

				let flight = self.launch(key.to_string(), compute());

				state.in_flight.insert(key.to_string(), flight.clone());

				(flight, LookupOrigin::Miss)
			}
		};
		let value = flight.await?;

		Ok(Lookup { value, origin })
	}

	/// Drops every expired entry and reports how many were removed.
	pub fn purge_expired(&self) -> usize {
		let removed = self.lock().purge_expired(Instant::now());

		if removed > 0 {
			self.stats.expirations.fetch_add(removed as u64, Ordering::Relaxed);
			tracing::debug!(removed, "Purged expired cache entries.");
		}

		removed
	}

	/// Whether an unexpired entry exists for `key`. Does not touch recency.
	pub fn contains(&self, key: &str) -> bool {
		let now = Instant::now();

		self.lock().entries.get(key).is_some_and(|entry| entry.expires_at > now)
	}

	pub fn len(&self) -> usize {
		self.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn in_flight_len(&self) -> usize {
		self.lock().in_flight.len()
	}

	pub fn stats(&self) -> CacheStatsSnapshot {
		let (entries, in_flight) = {
			let state = self.lock();

			(state.entries.len(), state.in_flight.len())
		};

		CacheStatsSnapshot {
			entries,
			in_flight,
			hits: self.stats.hits.load(Ordering::Relaxed),
			misses: self.stats.misses.load(Ordering::Relaxed),
			coalesced: self.stats.coalesced.load(Ordering::Relaxed),
			evictions: self.stats.evictions.load(Ordering::Relaxed),
			expirations: self.stats.expirations.load(Ordering::Relaxed),
		}
	}

	// Called with the state lock held; the spawned task cannot settle before the caller has
	// registered the flight.
	fn launch<Fut>(&self, key: String, compute: Fut) -> Flight<V>
	where
		Fut: Future<Output = Result<V>> + Send + 'static,
	{
		let mut guard = FlightGuard { cache: self.clone(), key: Some(key) };
		let handle = tokio::spawn(async move {
			let result = compute.await;

			guard.settle(&result);

			result
		});
		let flight: BoxFuture<'static, Result<V>> = Box::pin(async move {
			handle.await.unwrap_or_else(|err| {
				Err(Error::Internal { message: format!("Cache computation aborted: {err}") })
			})
		});

		flight.shared()
	}

	fn settle(&self, key: &str, result: &Result<V>) {
		let mut state = self.lock();

		state.in_flight.remove(key);

		let Ok(value) = result else { return };

		if value.is_degraded() && !self.cache_degraded {
			tracing::debug!(key, "Skipping cache store for degraded value.");

			return;
		}

		let now = Instant::now();
		let expires_at = now + self.ttl;

		state.insert(key.to_string(), value.clone(), now, expires_at, self.capacity, &self.stats);
	}

	fn lock(&self) -> MutexGuard<'_, State<V>> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}
}

// Clears the in-flight slot even when the computation panics or its task is aborted, so the
// key is not pinned to a dead flight.
struct FlightGuard<V>
where
	V: CacheValue,
{
	cache: ResultCache<V>,
	key: Option<String>,
}
impl<V> FlightGuard<V>
where
	V: CacheValue,
{
	fn settle(&mut self, result: &Result<V>) {
		if let Some(key) = self.key.take() {
			self.cache.settle(&key, result);
		}
	}
}
impl<V> Drop for FlightGuard<V>
where
	V: CacheValue,
{
	fn drop(&mut self) {
		if let Some(key) = self.key.take() {
			tracing::warn!(key = %key, "Cache computation ended without a result.");
			self.cache.lock().in_flight.remove(&key);
		}
	}
}

#[derive(Debug, Default)]
struct CacheStats {
	hits: AtomicU64,
	misses: AtomicU64,
	coalesced: AtomicU64,
	evictions: AtomicU64,
	expirations: AtomicU64,
}

struct CacheEntry<V> {
	value: V,
	created_at: Instant,
	expires_at: Instant,
	stamp: u64,
}

struct State<V> {
	entries: HashMap<String, CacheEntry<V>>,
	// Recency stamp -> key; the first entry is the least recently used.
	recency: BTreeMap<u64, String>,
	in_flight: HashMap<String, Flight<V>>,
	tick: u64,
}
impl<V> Default for State<V> {
	fn default() -> Self {
		Self {
			entries: HashMap::new(),
			recency: BTreeMap::new(),
			in_flight: HashMap::new(),
			tick: 0,
		}
	}
}
impl<V> State<V>
where
	V: Clone,
{
	fn next_stamp(&mut self) -> u64 {
		self.tick += 1;

		self.tick
	}

	fn touch(&mut self, key: &str, now: Instant, stats: &CacheStats) -> Option<V> {
		let entry = self.entries.get(key)?;

		if entry.expires_at <= now {
			self.remove(key);
			stats.expirations.fetch_add(1, Ordering::Relaxed);

			return None;
		}

		let stamp = self.next_stamp();
		let entry = self.entries.get_mut(key)?;

		self.recency.remove(&entry.stamp);
		self.recency.insert(stamp, key.to_string());

		entry.stamp = stamp;

		tracing::trace!(
			key,
			age_ms = now.saturating_duration_since(entry.created_at).as_millis() as u64,
			"Cache hit."
		);

		Some(entry.value.clone())
	}

	fn insert(
		&mut self,
		key: String,
		value: V,
		now: Instant,
		expires_at: Instant,
		capacity: usize,
		stats: &CacheStats,
	) {
		self.remove(&key);

		if self.entries.len() >= capacity {
			let expired = self.purge_expired(now);

			stats.expirations.fetch_add(expired as u64, Ordering::Relaxed);
		}

		while self.entries.len() >= capacity {
			let Some((_, lru_key)) = self.recency.pop_first() else { break };

			self.entries.remove(&lru_key);
			stats.evictions.fetch_add(1, Ordering::Relaxed);
		}

		let stamp = self.next_stamp();

		self.recency.insert(stamp, key.clone());
		self.entries.insert(key, CacheEntry { value, created_at: now, expires_at, stamp });
	}

	fn remove(&mut self, key: &str) {
		if let Some(entry) = self.entries.remove(key) {
			self.recency.remove(&entry.stamp);
		}
	}

	fn purge_expired(&mut self, now: Instant) -> usize {
		let expired: Vec<String> = self
			.entries
			.iter()
			.filter(|(_, entry)| entry.expires_at <= now)
			.map(|(key, _)| key.clone())
			.collect();

		for key in &expired {
			self.remove(key);
		}

		expired.len()
	}
}
