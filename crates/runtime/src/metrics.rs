//! Resolver metrics.
//!
//! Counters are atomics updated on the hot path and read on demand; they
//! exist for observability only and never feed back into correctness.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters for the resolver.
#[derive(Debug, Default)]
pub struct ResolveMetrics {
    resolutions: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    errors: AtomicU64,
    degraded_passes: AtomicU64,
    latency_total_us: AtomicU64,
    latency_max_us: AtomicU64,
}

impl ResolveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pass(&self, latency_us: u64, degraded: bool) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.degraded_passes.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_total_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_max_us.fetch_max(latency_us, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough point-in-time report.
    pub fn report(&self) -> MetricsReport {
        let resolutions = self.resolutions.load(Ordering::Relaxed);
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let computed = resolutions.saturating_sub(hits);

        MetricsReport {
            total_resolutions: resolutions,
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate: if hits + misses == 0 {
                0.0
            } else {
                hits as f64 / (hits + misses) as f64
            },
            avg_latency_us: if computed == 0 {
                0
            } else {
                self.latency_total_us.load(Ordering::Relaxed) / computed
            },
            max_latency_us: self.latency_max_us.load(Ordering::Relaxed),
            error_count: self.errors.load(Ordering::Relaxed),
            degraded_passes: self.degraded_passes.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of resolver metrics for observability endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsReport {
    pub total_resolutions: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub error_count: u64,
    pub degraded_passes: u64,
}
