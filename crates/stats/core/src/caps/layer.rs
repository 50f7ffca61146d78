//! Cap layer declarations.
//!
//! Layers partition cap contributions into an ordered sequence (base,
//! equipment, guild, event, administrative, ...). Each layer declares how
//! its own contributions merge and how its merged result folds into the
//! accumulated range from earlier layers. The layer set is supplied by the
//! configuration source as validated in-memory records; file formats are a
//! collaborator concern.

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// How multiple absolute cap contributions landing in one layer combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum MergePolicy {
    /// Most restrictive wins: highest min, lowest max
    Intersect,
    /// Values sum per bound
    Sum,
    /// Lowest value wins per bound
    Min,
    /// Highest value wins per bound
    Max,
    /// Priority-weighted average per bound
    WeightedAverage,
}

/// How a layer's merged result folds into the range accumulated from
/// earlier layers.
///
/// This is per-layer configuration: a "base" layer typically narrows while
/// an "event" layer may deliberately widen a cap for its duration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ReductionMode {
    /// Intersect with the accumulated range
    Narrow,
    /// Union with the accumulated range
    Widen,
    /// Replace the bounds this layer constrains
    Override,
}

/// What to do when a merge produces an inverted range (min > max).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum InvertedCapPolicy {
    /// Collapse both bounds onto the more restrictive (lower) bound
    Restrictive,
    /// Collapse both bounds onto the midpoint of the crossed pair
    Midpoint,
}

/// One ordered cap layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapLayer {
    /// Layer identifier; cap contributions reference it by this id
    pub id: String,
    /// Within-layer merge policy for absolute contributions
    pub merge: MergePolicy,
    /// Across-layer reduction mode for this layer's merged result
    pub reduction: ReductionMode,
}

impl CapLayer {
    pub fn new(id: impl Into<String>, merge: MergePolicy, reduction: ReductionMode) -> Self {
        Self {
            id: id.into(),
            merge,
            reduction,
        }
    }
}

/// Errors raised when validating a layer set at registration time.
#[derive(Debug, Error)]
pub enum LayerError {
    #[error("layer set must declare at least one layer")]
    Empty,

    #[error("layer id cannot be empty")]
    EmptyLayerId,

    #[error("duplicate layer id: {0}")]
    DuplicateLayer(String),
}

/// The ordered set of cap layers plus the inverted-range policy.
///
/// Validated once at registration; resolution passes read an immutable
/// snapshot and never observe a partial update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerSet {
    layers: Vec<CapLayer>,
    /// Policy for collapsing inverted merge results
    pub inverted_policy: InvertedCapPolicy,
    /// Version stamp advanced by the configuration source on each reload
    pub version: u64,
}

impl LayerSet {
    pub fn new(layers: Vec<CapLayer>) -> Self {
        Self {
            layers,
            inverted_policy: InvertedCapPolicy::Restrictive,
            version: 1,
        }
    }

    /// Set the inverted-range policy (builder style).
    pub fn with_inverted_policy(mut self, policy: InvertedCapPolicy) -> Self {
        self.inverted_policy = policy;
        self
    }

    /// Layers in declared order.
    pub fn layers(&self) -> &[CapLayer] {
        &self.layers
    }

    /// Look up a layer by id.
    pub fn get(&self, id: &str) -> Option<&CapLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Reject contradictory declarations before any resolution uses them.
    pub fn validate(&self) -> Result<(), LayerError> {
        if self.layers.is_empty() {
            return Err(LayerError::Empty);
        }
        let mut seen = std::collections::HashSet::new();
        for layer in &self.layers {
            if layer.id.is_empty() {
                return Err(LayerError::EmptyLayerId);
            }
            if !seen.insert(layer.id.as_str()) {
                return Err(LayerError::DuplicateLayer(layer.id.clone()));
            }
        }
        Ok(())
    }
}
