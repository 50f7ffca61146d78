//! Flush worker: propagates cache writes outward in the background.
//!
//! `set` on the cache manager writes the fast tier synchronously and hands
//! this worker a propagation command. The worker writes the mapped tier
//! immediately and batches durable writes, draining them on a periodic
//! tick and on shutdown — the durable tier is always written
//! asynchronously from the mid tier, never on the caller's path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use stat_core::{ActorId, Snapshot};

use crate::cache::{CacheKey, DurableStore, MappedCache, TierStats};

/// Commands accepted by the flush worker.
///
/// Invalidation commands travel through the same queue as propagations and
/// carry a reply channel: the FIFO order guarantees an invalidation
/// processes after every propagation enqueued before it, so a queued write
/// can never resurrect an invalidated key.
pub enum FlushCommand {
    /// Propagate a fresh snapshot to the outer tiers
    Propagate {
        key: CacheKey,
        snapshot: Arc<Snapshot>,
        expires_at: u64,
    },
    /// Remove one key from the outer tiers
    Invalidate {
        key: CacheKey,
        reply: oneshot::Sender<()>,
    },
    /// Remove an actor's keys from the outer tiers
    InvalidateActor {
        actor: ActorId,
        durable_keys: Vec<CacheKey>,
        reply: oneshot::Sender<()>,
    },
    /// Drop everything from the outer tiers
    Clear { reply: oneshot::Sender<()> },
    /// Drain pending writes and stop
    Shutdown,
}

/// Background task owning the outward write path.
pub struct FlushWorker {
    mapped: Arc<MappedCache>,
    durable: Arc<dyn DurableStore>,
    durable_stats: Arc<TierStats>,
    command_rx: mpsc::Receiver<FlushCommand>,
    flush_interval: Duration,
    pending: Vec<(CacheKey, Arc<Snapshot>, u64)>,
}

impl FlushWorker {
    pub fn new(
        mapped: Arc<MappedCache>,
        durable: Arc<dyn DurableStore>,
        durable_stats: Arc<TierStats>,
        command_rx: mpsc::Receiver<FlushCommand>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            mapped,
            durable,
            durable_stats,
            command_rx,
            flush_interval,
            pending: Vec::new(),
        }
    }

    /// Main worker loop.
    pub async fn run(mut self) {
        info!(interval = ?self.flush_interval, "flush worker started");
        let mut tick = tokio::time::interval(self.flush_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(FlushCommand::Propagate { key, snapshot, expires_at }) => {
                            self.propagate(key, snapshot, expires_at);
                        }
                        Some(FlushCommand::Invalidate { key, reply }) => {
                            self.invalidate(&key).await;
                            let _ = reply.send(());
                        }
                        Some(FlushCommand::InvalidateActor { actor, durable_keys, reply }) => {
                            self.invalidate_actor(actor, durable_keys).await;
                            let _ = reply.send(());
                        }
                        Some(FlushCommand::Clear { reply }) => {
                            self.clear().await;
                            let _ = reply.send(());
                        }
                        Some(FlushCommand::Shutdown) | None => break,
                    }
                }
                _ = tick.tick() => {
                    self.flush_pending().await;
                }
            }
        }

        // Drain before stopping so shutdown never loses accepted writes.
        self.flush_pending().await;
        if let Err(e) = self.mapped.sync() {
            warn!(error = %e, "final mapped sync failed");
        }
        if let Err(e) = self.durable.flush().await {
            warn!(error = %e, "final durable flush failed");
        }
        info!("flush worker stopped");
    }

    /// Write the mapped tier now; queue the durable write for the next
    /// tick.
    fn propagate(&mut self, key: CacheKey, snapshot: Arc<Snapshot>, expires_at: u64) {
        if let Err(e) = self.mapped.put(&key, &snapshot, expires_at) {
            warn!(key = %key, error = %e, "mapped tier write failed");
        }
        self.pending.push((key, snapshot, expires_at));
    }

    async fn invalidate(&mut self, key: &CacheKey) {
        self.pending.retain(|(pending_key, _, _)| pending_key != key);
        self.mapped.remove(key);
        if let Err(e) = self.durable.delete(key).await {
            warn!(key = %key, error = %e, "durable delete failed");
        }
    }

    async fn invalidate_actor(&mut self, actor: ActorId, durable_keys: Vec<CacheKey>) {
        self.pending.retain(|(pending_key, _, _)| pending_key.actor != actor);
        self.mapped.remove_prefix(&CacheKey::actor_prefix(actor));
        for key in durable_keys {
            if let Err(e) = self.durable.delete(&key).await {
                warn!(key = %key, error = %e, "durable delete failed");
            }
        }
    }

    async fn clear(&mut self) {
        self.pending.clear();
        self.mapped.clear();
        if let Err(e) = self.durable.clear().await {
            warn!(error = %e, "durable clear failed");
        }
    }

    async fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();

        for (key, snapshot, expires_at) in batch {
            match self.durable.put(&key, &snapshot, expires_at).await {
                Ok(()) => self.durable_stats.record_set(),
                Err(e) => warn!(key = %key, error = %e, "durable tier write failed"),
            }
        }
        if let Err(e) = self.mapped.sync() {
            warn!(error = %e, "mapped sync failed");
        }
        if let Err(e) = self.durable.flush().await {
            warn!(error = %e, "durable flush failed");
        }

        debug!(count, "flushed pending cache writes");
    }
}
