//! The multi-layer snapshot cache.
//!
//! Three independent key-value tiers behind one facade:
//!
//! - **fast** — volatile, bounded, per-key concurrent, TTL + LRU
//! - **mapped** — larger, block-addressed mapped file, compressed values
//! - **durable** — disk-backed store behind a minimal async contract
//!
//! Reads probe fast→mapped→durable and promote hits upward by copying;
//! writes land in the fast tier synchronously and propagate outward
//! through the background flush worker. Each tier stays independently
//! consistent — promotion copies data, never shares references.

mod durable;
mod fast;
mod manager;
mod mapped;

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stat_core::ActorId;

pub use durable::{DurableEntry, DurableStore, FileStore};
pub(crate) use fast::FastCache;
pub use manager::SnapshotCache;
pub(crate) use mapped::MappedCache;

/// Cache key: actor id plus the version the snapshot was computed against,
/// optionally extended by a context hash.
///
/// Because the version is part of the key, a stale snapshot is unreachable
/// the moment the actor's version advances — no tier ever has to compare
/// versions on the read path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub actor: ActorId,
    pub version: u64,
    pub context: Option<String>,
}

impl CacheKey {
    pub fn new(actor: ActorId, version: u64) -> Self {
        Self {
            actor,
            version,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Stable string form used by the mapped index and durable filenames.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }

    /// Prefix shared by every key of one actor, regardless of version or
    /// context.
    pub fn actor_prefix(actor: ActorId) -> String {
        format!("{}:", actor)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{}:v{}:{}", self.actor, self.version, context),
            None => write!(f, "{}:v{}", self.actor, self.version),
        }
    }
}

/// Errors raised by cache tiers.
///
/// The manager absorbs these on the read path (a failing slower tier
/// degrades to the faster one or to recomputation); they surface to
/// callers only from explicit maintenance operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupted cache entry: {0}")]
    CorruptedEntry(String),

    #[error("entry of {size} bytes exceeds mapped tier capacity of {capacity} bytes")]
    EntryTooLarge { size: usize, capacity: usize },
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Configuration for the three tiers and the flush worker.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Maximum entry count of the fast tier
    pub fast_capacity: usize,
    /// Byte size of the mapped tier's file region
    pub mapped_capacity_bytes: usize,
    /// Path of the mapped tier's backing file
    pub mapped_path: PathBuf,
    /// Directory of the durable tier's file store
    pub durable_dir: PathBuf,
    /// TTL applied when `set` is called without an explicit one
    pub default_ttl: Duration,
    /// Interval of the background mapped→durable flush
    pub flush_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("stat-cache");
        Self {
            fast_capacity: 1024,
            mapped_capacity_bytes: 8 * 1024 * 1024,
            mapped_path: base.join("snapshots.map"),
            durable_dir: base.join("durable"),
            default_ttl: Duration::from_secs(300),
            flush_interval: Duration::from_secs(30),
        }
    }
}

/// Atomic per-tier counters; observability only, never correctness.
#[derive(Debug, Default)]
pub struct TierStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
}

impl TierStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TierCounters {
        TierCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counters for one tier.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TierCounters {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
}

/// Counters for all three tiers.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TierStatsReport {
    pub fast: TierCounters,
    pub mapped: TierCounters,
    pub durable: TierCounters,
}

/// Seconds since the unix epoch; expiry timestamps must survive process
/// restarts, so the durable-facing tiers use wall-clock time.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
