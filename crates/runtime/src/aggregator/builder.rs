//! Builder wiring registries, cache, and limits into a [`Resolver`].

use std::sync::Arc;
use std::time::Duration;

use stat_core::{CapLayer, LayerSet, MergePolicy, ReductionMode, RuleTable};

use crate::api::Result;
use crate::cache::{CacheConfig, DurableStore, FileStore, SnapshotCache};
use crate::registry::{CapLayerRegistry, CombinerRegistry, PluginRegistry};

use super::{Resolver, ResolverConfig};

/// Builder for [`Resolver`].
///
/// Registries validate at build time, so a misconfigured rule table or
/// layer set fails here rather than inside a resolution pass.
pub struct ResolverBuilder {
    config: ResolverConfig,
    cache_config: CacheConfig,
    rules: Option<RuleTable>,
    layers: Option<LayerSet>,
    durable: Option<Arc<dyn DurableStore>>,
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self {
            config: ResolverConfig::default(),
            cache_config: CacheConfig::default(),
            rules: None,
            layers: None,
            durable: None,
        }
    }

    /// Supply the combiner rule table.
    pub fn with_rules(mut self, rules: RuleTable) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Supply the cap layer set.
    pub fn with_layers(mut self, layers: LayerSet) -> Self {
        self.layers = Some(layers);
        self
    }

    /// Override the cache configuration.
    pub fn with_cache_config(mut self, cache_config: CacheConfig) -> Self {
        self.cache_config = cache_config;
        self
    }

    /// Bound concurrent subsystem calls per pass.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.config.max_concurrent_subsystems = limit;
        self
    }

    /// TTL for cached snapshots.
    pub fn with_snapshot_ttl(mut self, ttl: Duration) -> Self {
        self.config.snapshot_ttl = Some(ttl);
        self
    }

    /// Swap the durable tier's storage medium.
    pub fn with_durable_store(mut self, durable: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(durable);
        self
    }

    /// Validate the configuration and assemble the resolver. Must be
    /// called from within a tokio runtime (the cache spawns its flush
    /// worker).
    pub fn build(self) -> Result<Resolver> {
        let combiner = CombinerRegistry::new(self.rules.unwrap_or_default())
            .map_err(crate::api::ResolveError::Registry)?;
        let layers = CapLayerRegistry::new(self.layers.unwrap_or_else(default_layers))
            .map_err(crate::api::ResolveError::Registry)?;

        let durable: Arc<dyn DurableStore> = match self.durable {
            Some(durable) => durable,
            None => Arc::new(FileStore::new(&self.cache_config.durable_dir)?),
        };
        let cache = SnapshotCache::new(self.cache_config, durable)?;

        Ok(Resolver::from_parts(
            Arc::new(PluginRegistry::new()),
            Arc::new(combiner),
            Arc::new(layers),
            Arc::new(cache),
            self.config,
        ))
    }
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Conventional layer stack: gameplay layers narrow, events may widen,
/// administrative overrides have the last word.
fn default_layers() -> LayerSet {
    LayerSet::new(vec![
        CapLayer::new("base", MergePolicy::Intersect, ReductionMode::Narrow),
        CapLayer::new("equipment", MergePolicy::Intersect, ReductionMode::Narrow),
        CapLayer::new("guild", MergePolicy::Intersect, ReductionMode::Narrow),
        CapLayer::new("event", MergePolicy::Max, ReductionMode::Widen),
        CapLayer::new("admin", MergePolicy::Intersect, ReductionMode::Override),
    ])
}
