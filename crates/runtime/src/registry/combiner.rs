//! Hot-reload handle for the combiner rule table.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use stat_core::{CombinerRule, RuleTable};

use super::Result;

/// Versioned, copy-on-write access to the [`RuleTable`].
///
/// Readers load one immutable snapshot per resolution pass; writers
/// validate a replacement table and swap it in whole. A pass reading an
/// older table is never corrupted by a concurrent reload.
pub struct CombinerRegistry {
    table: ArcSwap<RuleTable>,
}

impl CombinerRegistry {
    /// Create the registry from a validated table. Validation failures are
    /// configuration errors and reject the registration outright.
    pub fn new(table: RuleTable) -> Result<Self> {
        table.validate()?;
        Ok(Self {
            table: ArcSwap::from_pointee(table),
        })
    }

    /// The current table snapshot; holds rules stable for one pass.
    pub fn snapshot(&self) -> Arc<RuleTable> {
        self.table.load_full()
    }

    /// Replace the whole table. The new version is visible to passes that
    /// start after the swap.
    pub fn reload(&self, mut table: RuleTable) -> Result<()> {
        table.validate()?;
        let previous = self.table.load();
        if table.version <= previous.version {
            table.version = previous.version + 1;
        }
        let version = table.version;
        self.table.store(Arc::new(table));
        info!(version, "combiner rule table reloaded");
        Ok(())
    }

    /// Add or replace one dimension rule, revalidating the whole table
    /// before it becomes visible.
    pub fn set_rule(&self, dimension: impl Into<String>, rule: CombinerRule) -> Result<()> {
        let current = self.table.load_full();
        let mut next = (*current).clone();
        next = next.with_rule(dimension, rule);
        next.version = current.version + 1;
        next.validate()?;
        self.table.store(Arc::new(next));
        Ok(())
    }

    /// Version of the current table.
    pub fn version(&self) -> u64 {
        self.table.load().version
    }
}
