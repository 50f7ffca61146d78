//! Unified error types surfaced by the resolver API.
//!
//! Wraps failures from the deterministic kernels, registries, cache tiers,
//! and worker coordination so clients can bubble them up with consistent
//! context. Partial subsystem failures are absorbed inside a pass and never
//! appear here; what does appear is either a configuration defect or a
//! whole-pass failure.

use thiserror::Error;

pub use crate::cache::CacheError;
pub use crate::registry::RegistryError;

pub type Result<T> = std::result::Result<T, ResolveError>;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Compose(#[from] stat_core::ComposeError),

    #[error(transparent)]
    Rule(#[from] stat_core::RuleError),

    #[error(transparent)]
    Layer(#[from] stat_core::LayerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A subsystem's own failure; isolated per pass, never fatal to it.
    #[error("subsystem {system} failed: {message}")]
    Subsystem { system: String, message: String },

    #[error("subsystem fan-out join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),
}
