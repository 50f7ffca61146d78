//! Pure, deterministic stat composition.
//!
//! This crate is the synchronous kernel of the stat resolution system. It
//! defines the shared data model (contributions, caps, snapshots) and the
//! two computation stages every resolution pass runs:
//!
//! ```text
//! [ Contributions ]
//!      ↓ compose (ordered operator buckets)
//! [ Raw dimension values ]
//!      ↓ caps engine (per-layer merge, across-layer fold)
//! [ Clamped dimension values ] → Snapshot
//! ```
//!
//! ## Principles
//!
//! 1. **Deterministic**: identical contribution multisets produce identical
//!    output regardless of arrival order.
//! 2. **Pure**: no I/O, no clocks inside computation, no logging — warnings
//!    are returned as data.
//! 3. **Fail loud**: non-finite values and illegal buckets are errors at the
//!    point of composition, never silently dropped.
//!
//! Orchestration (subsystem fan-out, caching, hot reload) lives in the
//! `stat-runtime` crate.

pub mod actor;
pub mod bucket;
pub mod caps;
pub mod combiner;
pub mod compose;
pub mod contribution;
pub mod dimension;
pub mod snapshot;

// Re-export primary types
pub use actor::{Actor, ActorId};
pub use bucket::Bucket;
pub use caps::{
    CapLayer, CapRange, CapWarning, CapsOutcome, EffectiveCaps, InvertedCapPolicy, LayerError,
    LayerSet, MergePolicy, ReductionMode, effective_caps_across_layers,
    effective_caps_within_layer,
};
pub use combiner::{
    CombinerRule, ExtensionBucketDef, ExtensionOp, MultMode, RoundingPolicy, RuleError, RuleTable,
};
pub use compose::{ComposeError, compose};
pub use contribution::{CapContribution, CapKind, CapMode, Contribution};
pub use dimension::DimensionMap;
pub use snapshot::Snapshot;
