//! Registries: subsystem lifecycle and hot-reloadable rule tables.
//!
//! All three registries hand resolution passes versioned, copy-on-write
//! snapshots: readers never block writers and never observe a
//! partially-updated state. A pass loads its snapshots once at the outset
//! and keeps them for its whole lifetime, so mutations only affect passes
//! that start afterwards.

mod combiner;
mod layers;
mod plugins;

use thiserror::Error;

pub use combiner::CombinerRegistry;
pub use layers::CapLayerRegistry;
pub use plugins::{LifecycleState, PluginRegistry};

/// Errors raised by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("system id cannot be empty")]
    EmptySystemId,

    #[error("subsystem already registered: {0}")]
    DuplicateSystem(String),

    #[error("subsystem not registered: {0}")]
    UnknownSystem(String),

    #[error("subsystem {system}: cannot transition from {from:?} to {to:?}")]
    InvalidTransition {
        system: String,
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error(transparent)]
    Rule(#[from] stat_core::RuleError),

    #[error(transparent)]
    Layer(#[from] stat_core::LayerError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
