//! Cap ranges, cap layers, and the caps engine.
//!
//! Caps constrain a composed dimension value to a legal (min, max) range.
//! Cap contributions land in ordered layers (base, equipment, guild, ...);
//! each layer merges its own contributions with a declared policy, then the
//! ordered per-layer results fold into one [`EffectiveCaps`] using each
//! layer's declared reduction mode.

mod engine;
mod layer;
mod range;

pub use engine::{
    CapWarning, CapsOutcome, LayerCaps, effective_caps_across_layers, effective_caps_within_layer,
};
pub use layer::{CapLayer, InvertedCapPolicy, LayerError, LayerSet, MergePolicy, ReductionMode};
pub use range::{CapRange, EffectiveCaps};
