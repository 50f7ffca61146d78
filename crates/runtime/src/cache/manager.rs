//! The cache manager: one facade over the three tiers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use stat_core::{ActorId, Snapshot};

use crate::workers::{FlushCommand, FlushWorker};

use super::{
    CacheConfig, CacheKey, DurableStore, FastCache, MappedCache, Result, TierStats,
    TierStatsReport, unix_now,
};

/// Multi-layer snapshot cache.
///
/// `get` probes fast→mapped→durable and promotes hits into the faster
/// tiers; `set` writes the fast tier synchronously and schedules outward
/// propagation. A failing slower tier degrades to the next probe with a
/// warning — the read path never surfaces tier errors to the caller.
pub struct SnapshotCache {
    fast: FastCache,
    mapped: Arc<MappedCache>,
    durable: Arc<dyn DurableStore>,
    durable_stats: Arc<TierStats>,
    flush_tx: mpsc::Sender<FlushCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
    default_ttl: Duration,
}

impl SnapshotCache {
    /// Build the tiers and spawn the flush worker. Must be called from
    /// within a tokio runtime.
    pub fn new(config: CacheConfig, durable: Arc<dyn DurableStore>) -> Result<Self> {
        let mapped = Arc::new(MappedCache::new(
            &config.mapped_path,
            config.mapped_capacity_bytes,
        )?);

        let durable_stats = Arc::new(TierStats::default());
        let (flush_tx, flush_rx) = mpsc::channel(1024);
        let worker = FlushWorker::new(
            Arc::clone(&mapped),
            Arc::clone(&durable),
            Arc::clone(&durable_stats),
            flush_rx,
            config.flush_interval,
        );
        let handle = tokio::spawn(worker.run());

        Ok(Self {
            fast: FastCache::new(config.fast_capacity),
            mapped,
            durable,
            durable_stats,
            flush_tx,
            worker: Mutex::new(Some(handle)),
            default_ttl: config.default_ttl,
        })
    }

    /// Probe the tiers in order, promoting a hit upward. Returns nothing on
    /// a full miss; an entry invalid in any tier is never returned.
    pub async fn get(&self, key: &CacheKey) -> Option<Arc<Snapshot>> {
        if let Some(snapshot) = self.fast.get(key) {
            return Some(snapshot);
        }

        match self.mapped.get(key) {
            Ok(Some((snapshot, expires_at))) => {
                self.promote_to_fast(key, &snapshot, expires_at);
                return Some(snapshot);
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "mapped tier read failed; degrading"),
        }

        match self.durable.get(key).await {
            Ok(Some(entry)) => {
                self.durable_stats.record_hit();
                let snapshot = Arc::new(entry.snapshot);
                if let Err(e) = self.mapped.put(key, &snapshot, entry.expires_at) {
                    warn!(key = %key, error = %e, "promotion to mapped tier failed");
                }
                self.promote_to_fast(key, &snapshot, entry.expires_at);
                debug!(key = %key, "promoted durable hit");
                Some(snapshot)
            }
            Ok(None) => {
                self.durable_stats.record_miss();
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "durable tier read failed; treating as miss");
                self.durable_stats.record_miss();
                None
            }
        }
    }

    /// Write the fast tier now and propagate outward in the background.
    pub fn set(&self, key: CacheKey, snapshot: Arc<Snapshot>, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.fast.insert(key.clone(), Arc::clone(&snapshot), ttl);

        let command = FlushCommand::Propagate {
            key,
            snapshot,
            expires_at: unix_now() + ttl.as_secs(),
        };
        if let Err(e) = self.flush_tx.try_send(command) {
            // Propagation is best-effort; the fast tier already has the
            // value and a miss recomputes.
            warn!(error = %e, "flush queue full; outer tiers skip this write");
        }
    }

    /// Remove one key from every tier.
    ///
    /// Routed through the flush worker and acknowledged, so a propagation
    /// enqueued before the invalidation can never resurrect the key.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.fast.remove(key);
        let (reply, ack) = oneshot::channel();
        let command = FlushCommand::Invalidate {
            key: key.clone(),
            reply,
        };
        if self.flush_tx.send(command).await.is_ok() {
            let _ = ack.await;
        } else {
            // Worker gone; fall back to direct removal.
            self.mapped.remove(key);
            if let Err(e) = self.durable.delete(key).await {
                warn!(key = %key, error = %e, "durable delete failed");
            }
        }
    }

    /// Remove every key of an actor from the in-memory tiers, plus the
    /// given current-version keys from the durable tier.
    pub async fn invalidate_actor(&self, actor: ActorId, durable_keys: &[CacheKey]) {
        self.fast.remove_actor(actor);
        let (reply, ack) = oneshot::channel();
        let command = FlushCommand::InvalidateActor {
            actor,
            durable_keys: durable_keys.to_vec(),
            reply,
        };
        if self.flush_tx.send(command).await.is_ok() {
            let _ = ack.await;
        } else {
            self.mapped.remove_prefix(&CacheKey::actor_prefix(actor));
            for key in durable_keys {
                if let Err(e) = self.durable.delete(key).await {
                    warn!(key = %key, error = %e, "durable delete failed");
                }
            }
        }
    }

    /// Drop everything from every tier.
    pub async fn clear(&self) {
        self.fast.clear();
        let (reply, ack) = oneshot::channel();
        if self.flush_tx.send(FlushCommand::Clear { reply }).await.is_ok() {
            let _ = ack.await;
        } else {
            self.mapped.clear();
            if let Err(e) = self.durable.clear().await {
                warn!(error = %e, "durable clear failed");
            }
        }
    }

    /// Per-tier counters.
    pub fn stats(&self) -> TierStatsReport {
        TierStatsReport {
            fast: self.fast.stats().snapshot(),
            mapped: self.mapped.stats().snapshot(),
            durable: self.durable_stats.snapshot(),
        }
    }

    /// Stop the flush worker, draining pending writes.
    pub async fn shutdown(&self) {
        let _ = self.flush_tx.send(FlushCommand::Shutdown).await;
        let handle = self.worker.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "flush worker join failed");
        }
    }

    fn promote_to_fast(&self, key: &CacheKey, snapshot: &Arc<Snapshot>, expires_at: u64) {
        let remaining = expires_at.saturating_sub(unix_now());
        if remaining > 0 {
            self.fast.insert(
                key.clone(),
                Arc::clone(snapshot),
                Duration::from_secs(remaining),
            );
        }
    }
}

impl Drop for SnapshotCache {
    fn drop(&mut self) {
        // Best-effort: ask the worker to stop if shutdown was never called.
        let _ = self.flush_tx.try_send(FlushCommand::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }
}
