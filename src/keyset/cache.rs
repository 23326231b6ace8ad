//! Verification key cache with TTL staleness, single-flight refresh, and serve-stale
//! failure isolation.

// crates.io
use tokio::sync::{Mutex, RwLock};
// self
use crate::{
	_prelude::*,
	error::KeySourceError,
	keyset::{
		snapshot::{KeySetSnapshot, VerificationKey},
		source::KeySourceClient,
	},
	metrics::{self, KeySetMetrics},
};

/// Caches the provider key set and coordinates refreshes.
///
/// The snapshot is the only shared mutable state in the crate. It is replaced
/// wholesale under the write lock, so readers never observe a partially updated key
/// set. The refresh slot serialises fetches: concurrent callers that observe a stale
/// snapshot share one outstanding fetch and its outcome instead of racing.
#[derive(Debug)]
pub struct KeyCache {
	source: KeySourceClient,
	ttl: Duration,
	snapshot: RwLock<Option<Arc<KeySetSnapshot>>>,
	refresh: Mutex<RefreshSlot>,
	metrics: Arc<KeySetMetrics>,
}
impl KeyCache {
	/// Build a cache over the given key source with the given freshness window.
	pub fn new(source: KeySourceClient, ttl: Duration) -> Self {
		Self {
			source,
			ttl,
			snapshot: RwLock::new(None),
			refresh: Mutex::new(RefreshSlot::default()),
			metrics: KeySetMetrics::new(),
		}
	}

	/// Access the per-cache telemetry accumulator.
	pub fn metrics(&self) -> Arc<KeySetMetrics> {
		self.metrics.clone()
	}

	/// Capture the current snapshot for status reporting.
	pub async fn snapshot(&self) -> Option<Arc<KeySetSnapshot>> {
		self.current().await
	}

	/// Resolve the verification key for `kid`, refreshing per the staleness policy.
	///
	/// A miss against a fresh snapshot is authoritative and returns `None` without
	/// touching the network; refetching per unknown kid would let unauthenticated
	/// traffic drive upstream load. An empty or stale cache triggers one refresh
	/// before the lookup is answered, which also covers provider-side key rotation.
	#[tracing::instrument(skip(self))]
	pub async fn resolve(&self, kid: &str) -> Result<Option<VerificationKey>, KeySourceError> {
		self.metrics.record_lookup();

		let entered = Instant::now();
		let previous = match self.current().await {
			Some(snapshot) if !snapshot.is_stale(self.ttl, entered) =>
				return Ok(snapshot.get(kid).cloned()),
			other => other,
		};

		match self.refresh_shared(entered).await {
			Ok(snapshot) => Ok(snapshot.get(kid).cloned()),
			Err(err) =>
				if let Some(snapshot) = previous {
					tracing::warn!(
						error = %err,
						"key set refresh failed, serving last known good snapshot"
					);
					self.metrics.record_stale_serve();
					metrics::record_keyset_stale_serve();

					Ok(snapshot.get(kid).cloned())
				} else {
					Err(err)
				},
		}
	}

	/// Perform one fetch, sharing the outcome with callers that queued behind it.
	async fn refresh_shared(&self, entered: Instant) -> Result<Arc<KeySetSnapshot>, KeySourceError> {
		let mut slot = self.refresh.lock().await;

		// A refresh that completed while this caller awaited the guard counts as its
		// own attempt; issuing another fetch here would defeat single-flight.
		if let Some(at) = slot.last_attempt_at
			&& at >= entered
		{
			match (&slot.last_error, self.current().await) {
				(None, Some(snapshot)) => return Ok(snapshot),
				(Some(err), _) => return Err(err.clone()),
				(None, None) => {},
			}
		}

		let start = Instant::now();
		let outcome = self.source.fetch_key_set().await;

		slot.last_attempt_at = Some(Instant::now());

		match outcome {
			Ok(snapshot) => {
				let snapshot = Arc::new(snapshot);

				slot.last_error = None;
				*self.snapshot.write().await = Some(snapshot.clone());

				self.metrics.record_refresh_success(start.elapsed());
				metrics::record_keyset_refresh_success(start.elapsed());
				tracing::debug!(keys = snapshot.len(), "key set snapshot replaced");

				Ok(snapshot)
			},
			Err(err) => {
				slot.last_error = Some(err.clone());

				self.metrics.record_refresh_error();
				metrics::record_keyset_refresh_error();

				Err(err)
			},
		}
	}

	async fn current(&self) -> Option<Arc<KeySetSnapshot>> {
		self.snapshot.read().await.clone()
	}
}

#[derive(Debug, Default)]
struct RefreshSlot {
	last_attempt_at: Option<Instant>,
	last_error: Option<KeySourceError>,
}
