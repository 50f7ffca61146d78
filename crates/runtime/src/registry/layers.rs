//! Hot-reload handle for the cap layer set.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use stat_core::LayerSet;

use super::Result;

/// Versioned, copy-on-write access to the [`LayerSet`].
///
/// Same discipline as the combiner registry: one immutable snapshot per
/// pass, whole-set validate-then-swap on reload.
pub struct CapLayerRegistry {
    layers: ArcSwap<LayerSet>,
}

impl CapLayerRegistry {
    /// Create the registry from a validated layer set.
    pub fn new(layers: LayerSet) -> Result<Self> {
        layers.validate()?;
        Ok(Self {
            layers: ArcSwap::from_pointee(layers),
        })
    }

    /// The current layer set snapshot.
    pub fn snapshot(&self) -> Arc<LayerSet> {
        self.layers.load_full()
    }

    /// Replace the layer set. Visible to passes starting after the swap.
    pub fn reload(&self, mut layers: LayerSet) -> Result<()> {
        layers.validate()?;
        let previous = self.layers.load();
        if layers.version <= previous.version {
            layers.version = previous.version + 1;
        }
        let version = layers.version;
        self.layers.store(Arc::new(layers));
        info!(version, "cap layer set reloaded");
        Ok(())
    }

    /// Version of the current layer set.
    pub fn version(&self) -> u64 {
        self.layers.load().version
    }
}
