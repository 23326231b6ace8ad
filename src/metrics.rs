//! Telemetry counters for key set activity and provisioning outcomes.
//!
//! Per-instance accumulators are always available; global emission through the
//! `metrics` facade and the Prometheus exporter are feature-gated.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::_prelude::*;

#[cfg(feature = "metrics")] type LabelSet = smallvec::SmallVec<[metrics::Label; 2]>;

#[cfg(feature = "metrics")]
const METRIC_KEYSET_REFRESH_TOTAL: &str = "auth_bridge_keyset_refresh_total";
#[cfg(feature = "metrics")]
const METRIC_KEYSET_REFRESH_DURATION: &str = "auth_bridge_keyset_refresh_duration_seconds";
#[cfg(feature = "metrics")]
const METRIC_KEYSET_STALE_TOTAL: &str = "auth_bridge_keyset_stale_total";
#[cfg(feature = "metrics")]
const METRIC_VERIFY_TOTAL: &str = "auth_bridge_verify_total";
#[cfg(feature = "metrics")]
const METRIC_PROVISION_TOTAL: &str = "auth_bridge_provision_total";
#[cfg(feature = "metrics")]
const METRIC_COMPENSATION_FAILURES: &str = "auth_bridge_compensation_failures_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: std::sync::OnceLock<metrics_exporter_prometheus::PrometheusHandle> =
	std::sync::OnceLock::new();

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is
/// installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<(), metrics_exporter_prometheus::BuildError> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static metrics_exporter_prometheus::PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Thread-safe telemetry accumulator for one key cache instance.
#[derive(Debug, Default)]
pub struct KeySetMetrics {
	lookups: AtomicU64,
	stale_serves: AtomicU64,
	refresh_successes: AtomicU64,
	refresh_errors: AtomicU64,
	last_refresh_micros: AtomicU64,
}
impl KeySetMetrics {
	/// Create a new accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a key lookup.
	pub fn record_lookup(&self) {
		self.lookups.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a lookup answered from a stale snapshot after a failed refresh.
	pub fn record_stale_serve(&self) {
		self.stale_serves.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a successful refresh and its latency.
	pub fn record_refresh_success(&self, duration: Duration) {
		self.refresh_successes.fetch_add(1, Ordering::Relaxed);
		self.last_refresh_micros.store(duration.as_micros() as u64, Ordering::Relaxed);
	}

	/// Record a failed refresh.
	pub fn record_refresh_error(&self) {
		self.refresh_errors.fetch_add(1, Ordering::Relaxed);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> KeySetMetricsSnapshot {
		KeySetMetricsSnapshot {
			lookups: self.lookups.load(Ordering::Relaxed),
			stale_serves: self.stale_serves.load(Ordering::Relaxed),
			refresh_successes: self.refresh_successes.load(Ordering::Relaxed),
			refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
			last_refresh_micros: match self.last_refresh_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}
}

/// Read-only snapshot of key set telemetry counters.
#[derive(Clone, Debug)]
pub struct KeySetMetricsSnapshot {
	/// Total number of key lookups observed.
	pub lookups: u64,
	/// Count of lookups answered from a stale snapshot.
	pub stale_serves: u64,
	/// Count of successful refresh operations.
	pub refresh_successes: u64,
	/// Count of refresh attempts that resulted in errors.
	pub refresh_errors: u64,
	/// Microsecond latency of the most recent refresh.
	pub last_refresh_micros: Option<u64>,
}
impl KeySetMetricsSnapshot {
	/// Ratio of stale serves over total lookups.
	pub fn stale_ratio(&self) -> f64 {
		if self.lookups == 0 { 0.0 } else { self.stale_serves as f64 / self.lookups as f64 }
	}
}

/// Thread-safe telemetry accumulator for one provisioning coordinator.
#[derive(Debug, Default)]
pub struct ProvisioningMetrics {
	attempts: AtomicU64,
	provisioned: AtomicU64,
	remote_conflicts: AtomicU64,
	remote_failures: AtomicU64,
	local_failures: AtomicU64,
	compensations_completed: AtomicU64,
	compensations_failed: AtomicU64,
}
impl ProvisioningMetrics {
	/// Create a new accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record the start of a provisioning attempt.
	pub fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a fully persisted user.
	pub fn record_provisioned(&self) {
		self.provisioned.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a duplicate-identity rejection from the remote provider.
	pub fn record_remote_conflict(&self) {
		self.remote_conflicts.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a remote creation failure with nothing to roll back.
	pub fn record_remote_failure(&self) {
		self.remote_failures.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a failure after remote creation (credential, validation, or local
	/// persistence).
	pub fn record_local_failure(&self) {
		self.local_failures.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a compensating delete attempt and whether it succeeded.
	pub fn record_compensation(&self, completed: bool) {
		if completed {
			self.compensations_completed.fetch_add(1, Ordering::Relaxed);
		} else {
			self.compensations_failed.fetch_add(1, Ordering::Relaxed);
		}
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> ProvisioningMetricsSnapshot {
		ProvisioningMetricsSnapshot {
			attempts: self.attempts.load(Ordering::Relaxed),
			provisioned: self.provisioned.load(Ordering::Relaxed),
			remote_conflicts: self.remote_conflicts.load(Ordering::Relaxed),
			remote_failures: self.remote_failures.load(Ordering::Relaxed),
			local_failures: self.local_failures.load(Ordering::Relaxed),
			compensations_completed: self.compensations_completed.load(Ordering::Relaxed),
			compensations_failed: self.compensations_failed.load(Ordering::Relaxed),
		}
	}
}

/// Read-only snapshot of provisioning telemetry counters.
#[derive(Clone, Debug)]
pub struct ProvisioningMetricsSnapshot {
	/// Total provisioning attempts observed.
	pub attempts: u64,
	/// Attempts that produced a persisted local user.
	pub provisioned: u64,
	/// Attempts rejected because the remote identity already existed.
	pub remote_conflicts: u64,
	/// Attempts that failed at remote creation.
	pub remote_failures: u64,
	/// Attempts that failed after remote creation succeeded.
	pub local_failures: u64,
	/// Compensating deletes that removed the orphaned remote identity.
	pub compensations_completed: u64,
	/// Compensating deletes that failed and left a possible orphan behind.
	pub compensations_failed: u64,
}

/// Record a successful key set refresh with its latency.
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn record_keyset_refresh_success(duration: Duration) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(METRIC_KEYSET_REFRESH_TOTAL, status_labels("success").iter())
			.increment(1);
		metrics::histogram!(METRIC_KEYSET_REFRESH_DURATION).record(duration.as_secs_f64());
	}
}

/// Record a failed key set refresh.
pub fn record_keyset_refresh_error() {
	#[cfg(feature = "metrics")]
	metrics::counter!(METRIC_KEYSET_REFRESH_TOTAL, status_labels("error").iter()).increment(1);
}

/// Record a lookup served from a stale snapshot.
pub fn record_keyset_stale_serve() {
	#[cfg(feature = "metrics")]
	metrics::counter!(METRIC_KEYSET_STALE_TOTAL).increment(1);
}

/// Record one token verification outcome.
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn record_verification(outcome: &'static str) {
	#[cfg(feature = "metrics")]
	metrics::counter!(METRIC_VERIFY_TOTAL, outcome_labels(outcome).iter()).increment(1);
}

/// Record one provisioning outcome.
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn record_provisioning(outcome: &'static str) {
	#[cfg(feature = "metrics")]
	metrics::counter!(METRIC_PROVISION_TOTAL, outcome_labels(outcome).iter()).increment(1);
}

/// Record a compensating delete that failed and needs reconciliation.
pub fn record_compensation_failure() {
	#[cfg(feature = "metrics")]
	metrics::counter!(METRIC_COMPENSATION_FAILURES).increment(1);
}

#[cfg(feature = "metrics")]
fn status_labels(status: &'static str) -> LabelSet {
	let mut labels = LabelSet::with_capacity(1);

	labels.push(metrics::Label::new("status", status));

	labels
}

#[cfg(feature = "metrics")]
fn outcome_labels(outcome: &'static str) -> LabelSet {
	let mut labels = LabelSet::with_capacity(1);

	labels.push(metrics::Label::new("outcome", outcome));

	labels
}
