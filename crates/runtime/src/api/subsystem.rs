//! The subsystem capability contract.
//!
//! Any game system that wants a say in an actor's stats (equipment, buffs,
//! cultivation, guild bonuses, ...) implements [`Subsystem`] and registers
//! it with the [`PluginRegistry`]. The resolver calls `contribute` once per
//! pass; implementations return fresh value objects each call and hold no
//! reference to them afterwards.
//!
//! [`PluginRegistry`]: crate::registry::PluginRegistry

use async_trait::async_trait;

use stat_core::{Actor, CapContribution, Contribution};

use crate::aggregator::ResolveContext;
use crate::api::Result;

/// One subsystem's answer for one resolution pass.
#[derive(Clone, Debug, Default)]
pub struct SubsystemOutput {
    /// Contributions to primary dimensions
    pub primary: Vec<Contribution>,
    /// Contributions to derived dimensions
    pub derived: Vec<Contribution>,
    /// Proposed cap constraints
    pub caps: Vec<CapContribution>,
}

impl SubsystemOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_primary(&mut self, contribution: Contribution) {
        self.primary.push(contribution);
    }

    pub fn add_derived(&mut self, contribution: Contribution) {
        self.derived.push(contribution);
    }

    pub fn add_cap(&mut self, cap: CapContribution) {
        self.caps.push(cap);
    }
}

/// A game system that contributes to actor stats.
///
/// Implementations must be safe to call concurrently across actors; one
/// `contribute` call may suspend (database reads, service calls), and its
/// failure is isolated to the pass that made it.
#[async_trait]
pub trait Subsystem: Send + Sync {
    /// Unique identifier for this subsystem.
    fn system_id(&self) -> &str;

    /// Priority used to order contributions; higher runs earlier in the
    /// stable subsystem ordering.
    fn priority(&self) -> i64;

    /// Produce this pass's contributions for the actor.
    async fn contribute(&self, actor: &Actor, ctx: &ResolveContext) -> Result<SubsystemOutput>;
}
