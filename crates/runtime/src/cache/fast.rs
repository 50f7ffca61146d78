//! Fast tier: volatile, bounded, per-key concurrent.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use stat_core::{ActorId, Snapshot};

use super::{CacheKey, TierStats};

struct FastEntry {
    snapshot: Arc<Snapshot>,
    expires_at: Instant,
    /// Milliseconds since cache creation at last access; drives LRU
    /// eviction without a lock on the read path
    last_access: AtomicU64,
}

/// Bounded in-memory tier.
///
/// Backed by a sharded concurrent map, so operations on different keys
/// never contend. Expiry is checked on every read; LRU eviction runs only
/// when an insert pushes the tier over capacity.
pub struct FastCache {
    entries: DashMap<CacheKey, FastEntry>,
    capacity: usize,
    epoch: Instant,
    stats: TierStats,
}

impl FastCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            epoch: Instant::now(),
            stats: TierStats::default(),
        }
    }

    fn tick(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Snapshot>> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                if entry.expires_at > Instant::now() {
                    entry.last_access.store(self.tick(), Ordering::Relaxed);
                    let snapshot = Arc::clone(&entry.snapshot);
                    self.stats.record_hit();
                    return Some(snapshot);
                }
                true
            }
            None => false,
        };
        // The shard guard must be released before removing the key.
        if expired {
            self.entries.remove(key);
        }
        self.stats.record_miss();
        None
    }

    pub fn insert(&self, key: CacheKey, snapshot: Arc<Snapshot>, ttl: Duration) {
        let entry = FastEntry {
            snapshot,
            expires_at: Instant::now() + ttl,
            last_access: AtomicU64::new(self.tick()),
        };
        self.entries.insert(key, entry);
        self.stats.record_set();

        if self.entries.len() > self.capacity {
            self.evict();
        }
    }

    pub fn remove(&self, key: &CacheKey) {
        self.entries.remove(key);
    }

    /// Drop every entry belonging to the actor, across versions and
    /// contexts.
    pub fn remove_actor(&self, actor: ActorId) {
        self.entries.retain(|key, _| key.actor != actor);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> &TierStats {
        &self.stats
    }

    /// Evict expired entries first, then the least recently used, down to
    /// 90% of capacity.
    fn evict(&self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);

        let target = self.capacity * 9 / 10;
        if self.entries.len() > target {
            let mut by_access: Vec<(CacheKey, u64)> = self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), entry.last_access.load(Ordering::Relaxed)))
                .collect();
            by_access.sort_by_key(|(_, tick)| *tick);

            let excess = self.entries.len().saturating_sub(target);
            for (key, _) in by_access.into_iter().take(excess) {
                self.entries.remove(&key);
            }
        }

        self.stats
            .record_evictions(before.saturating_sub(self.entries.len()) as u64);
    }
}
