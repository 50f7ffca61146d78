//! The resolver: one end-to-end resolution pass.
//!
//! A pass runs: cache lookup → subsystem-list snapshot → concurrent
//! contribution fan-out (bounded, failure-isolated) → bucket composition →
//! caps → clamp → snapshot assembly → cache write-through. The pure stages
//! come from `stat-core`; this module owns the orchestration around them.

mod builder;
mod context;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use stat_core::{
    Actor, ActorId, CapContribution, Contribution, DimensionMap, EffectiveCaps, RuleTable,
    Snapshot, compose, effective_caps_across_layers,
};

use crate::api::{Result, SubsystemOutput};
use crate::cache::{CacheKey, SnapshotCache, TierStatsReport};
use crate::metrics::{MetricsReport, ResolveMetrics};
use crate::registry::{CapLayerRegistry, CombinerRegistry, PluginRegistry};
use crate::versions::VersionLedger;

pub use builder::ResolverBuilder;
pub use context::ResolveContext;

/// Tunables for the resolver.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    /// Upper bound on concurrent subsystem contribution calls per pass
    pub max_concurrent_subsystems: usize,
    /// TTL for cached snapshots; `None` uses the cache default
    pub snapshot_ttl: Option<std::time::Duration>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrent_subsystems: 8,
            snapshot_ttl: None,
        }
    }
}

/// Orchestrates resolution passes over the registries and the cache.
pub struct Resolver {
    plugins: Arc<PluginRegistry>,
    combiner: Arc<CombinerRegistry>,
    layers: Arc<CapLayerRegistry>,
    cache: Arc<SnapshotCache>,
    versions: Arc<VersionLedger>,
    metrics: Arc<ResolveMetrics>,
    config: ResolverConfig,
}

impl Resolver {
    pub(crate) fn from_parts(
        plugins: Arc<PluginRegistry>,
        combiner: Arc<CombinerRegistry>,
        layers: Arc<CapLayerRegistry>,
        cache: Arc<SnapshotCache>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            plugins,
            combiner,
            layers,
            cache,
            versions: Arc::new(VersionLedger::new()),
            metrics: Arc::new(ResolveMetrics::new()),
            config,
        }
    }

    /// The plugin registry; register subsystems here.
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// The combiner rule handle, for hot reloads.
    pub fn combiner(&self) -> &CombinerRegistry {
        &self.combiner
    }

    /// The cap layer handle, for hot reloads.
    pub fn layers(&self) -> &CapLayerRegistry {
        &self.layers
    }

    /// Resolve an actor's snapshot with an empty context.
    pub async fn resolve(&self, actor: &Actor) -> Result<Snapshot> {
        self.resolve_with_context(actor, ResolveContext::new()).await
    }

    /// Resolve an actor's snapshot under an explicit evaluation context.
    pub async fn resolve_with_context(
        &self,
        actor: &Actor,
        ctx: ResolveContext,
    ) -> Result<Snapshot> {
        let started = Instant::now();
        let version = self.versions.observe(actor);
        let mut key = CacheKey::new(actor.id, version);
        if let Some(hash) = ctx.cache_hash() {
            key = key.with_context(hash);
        }

        if let Some(hit) = self.cache.get(&key).await
            && hit.version == version
        {
            self.metrics.record_hit();
            return Ok((*hit).clone());
        }
        self.metrics.record_miss();

        let result = self.run_pass(actor, version, &key, &ctx, started).await;
        if result.is_err() {
            self.metrics.record_error();
        }
        result
    }

    /// Resolve many actors; one actor's failure is logged and skipped,
    /// never aborting the batch.
    pub async fn resolve_batch(&self, actors: &[Actor]) -> Vec<Snapshot> {
        let mut snapshots = Vec::with_capacity(actors.len());
        for actor in actors {
            match self.resolve(actor).await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    warn!(actor = %actor.id, error = %e, "batch resolution failed for actor");
                }
            }
        }
        snapshots
    }

    /// Cached snapshot for the actor's current version, if any tier holds
    /// one.
    pub async fn get_cached_snapshot(&self, actor_id: ActorId) -> Option<Snapshot> {
        let version = self.versions.current(actor_id)?;
        let key = CacheKey::new(actor_id, version);
        let snapshot = self.cache.get(&key).await?;
        (snapshot.version == version).then(|| (*snapshot).clone())
    }

    /// Advance the actor's version and drop its cached snapshots from
    /// every tier. Older versions become unreachable by key construction.
    pub async fn invalidate_cache(&self, actor_id: ActorId) {
        let stale_version = self.versions.current(actor_id);
        let new_version = self.versions.bump(actor_id);
        let mut durable_keys = Vec::new();
        if let Some(version) = stale_version {
            durable_keys.push(CacheKey::new(actor_id, version));
        }
        self.cache.invalidate_actor(actor_id, &durable_keys).await;
        debug!(actor = %actor_id, version = new_version, "cache invalidated");
    }

    /// Drop every cached snapshot from every tier.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("snapshot cache cleared");
    }

    /// Resolver counters: hit rate, latency, errors.
    pub fn get_metrics(&self) -> MetricsReport {
        self.metrics.report()
    }

    /// Per-tier cache counters.
    pub fn cache_stats(&self) -> TierStatsReport {
        self.cache.stats()
    }

    /// Stop background cache work, draining pending writes.
    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
    }

    /// One full computation pass; the caller has already missed the cache.
    async fn run_pass(
        &self,
        actor: &Actor,
        version: u64,
        key: &CacheKey,
        ctx: &ResolveContext,
        started: Instant,
    ) -> Result<Snapshot> {
        // Snapshots taken once at the outset: mutations during the pass
        // affect only passes that start later.
        let subsystems = self.plugins.get_by_priority();
        let rules = self.combiner.snapshot();
        let layer_set = self.layers.snapshot();

        let actor_shared = Arc::new(actor.clone());
        let ctx_shared = Arc::new(ctx.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_subsystems.max(1)));

        let mut join_set = JoinSet::new();
        for subsystem in subsystems.iter() {
            let subsystem = Arc::clone(subsystem);
            let actor = Arc::clone(&actor_shared);
            let ctx = Arc::clone(&ctx_shared);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let system_id = subsystem.system_id().to_string();
                let output = subsystem.contribute(&actor, &ctx).await;
                (system_id, output)
            });
        }

        let mut outputs: Vec<SubsystemOutput> = Vec::with_capacity(subsystems.len());
        let mut processed = Vec::new();
        let mut failed = 0u32;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((system_id, Ok(output))) => {
                    processed.push(system_id);
                    outputs.push(output);
                }
                Ok((system_id, Err(e))) => {
                    warn!(system = %system_id, error = %e, "subsystem contribution failed; skipping");
                    failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "subsystem task join failed; skipping");
                    failed += 1;
                }
            }
        }
        // Completion order varies run to run; the composition sort makes
        // the result order-independent, and the processed list is sorted
        // for a stable snapshot.
        processed.sort();

        let mut primary_by_dim: HashMap<String, Vec<Contribution>> = HashMap::new();
        let mut derived_by_dim: HashMap<String, Vec<Contribution>> = HashMap::new();
        let mut cap_contributions: Vec<CapContribution> = Vec::new();
        for output in outputs {
            for contribution in output.primary {
                primary_by_dim
                    .entry(contribution.dimension.clone())
                    .or_default()
                    .push(contribution);
            }
            for contribution in output.derived {
                derived_by_dim
                    .entry(contribution.dimension.clone())
                    .or_default()
                    .push(contribution);
            }
            cap_contributions.extend(output.caps);
        }

        let realm = ctx.realm.as_deref().or(actor.realm.as_deref());
        let caps_outcome = effective_caps_across_layers(&layer_set, &cap_contributions, realm);
        for warning in &caps_outcome.warnings {
            warn!(
                dimension = %warning.dimension,
                layer = %warning.layer,
                min = warning.original.min,
                max = warning.original.max,
                "inverted cap range collapsed"
            );
        }

        let primary = compose_group(primary_by_dim, &rules, &caps_outcome.caps)?;
        let derived = compose_group(derived_by_dim, &rules, &caps_outcome.caps)?;

        let degraded = failed > 0 || processed.is_empty();
        let mut snapshot = Snapshot::new(actor.id, version);
        snapshot.primary = primary;
        snapshot.derived = derived;
        snapshot.caps_used = caps_outcome.caps;
        snapshot.degraded = degraded;
        snapshot.failed_subsystems = failed;
        snapshot.subsystems_processed = processed;
        snapshot.processing_time_us = Some(started.elapsed().as_micros() as u64);

        // A pass that lost the version race still returns its result, but
        // never publishes it: the next resolve recomputes against the new
        // version.
        if self.versions.current(actor.id) == Some(version) {
            self.cache.set(
                key.clone(),
                Arc::new(snapshot.clone()),
                self.config.snapshot_ttl,
            );
        } else {
            debug!(actor = %actor.id, version, "actor advanced mid-pass; cache write discarded");
        }

        self.metrics
            .record_pass(started.elapsed().as_micros() as u64, degraded);
        if degraded {
            debug!(actor = %actor.id, failed, "resolution degraded");
        }
        Ok(snapshot)
    }
}

/// Compose each dimension's contributions, clamp into the effective range,
/// and apply the dimension's rounding policy.
fn compose_group(
    by_dimension: HashMap<String, Vec<Contribution>>,
    rules: &RuleTable,
    effective: &EffectiveCaps,
) -> Result<DimensionMap> {
    let mut dimensions: Vec<(String, Vec<Contribution>)> = by_dimension.into_iter().collect();
    dimensions.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut values = DimensionMap::new();
    for (dimension, contributions) in dimensions {
        let raw = compose(&dimension, &contributions, rules)?;
        let clamp = effective
            .get(&dimension)
            .copied()
            .or_else(|| rules.rule(&dimension).and_then(|r| r.clamp_default));
        let clamped = match clamp {
            Some(range) => range.clamp(raw),
            None => raw,
        };
        let rounded = match rules.rule(&dimension) {
            Some(rule) => rule.rounding.apply(clamped),
            None => clamped,
        };
        values.set(&dimension, rounded);
    }
    Ok(values)
}
