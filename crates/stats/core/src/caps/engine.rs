//! The caps engine: per-layer merge, then across-layer reduction.
//!
//! Phase 1 merges every cap contribution landing in one layer into a single
//! partial range per dimension, using that layer's merge policy. Phase 2
//! folds the ordered per-layer results into one [`EffectiveCaps`], applying
//! each layer's declared reduction mode and percentage deltas.
//!
//! Both phases are pure and deterministic: entries are sorted by
//! (priority, system, value) before any order-sensitive step, and warnings
//! are returned as data rather than logged.

use std::collections::HashMap;

use crate::contribution::{CapContribution, CapKind, CapMode};

use super::layer::{CapLayer, InvertedCapPolicy, LayerSet, MergePolicy, ReductionMode};
use super::range::{CapRange, EffectiveCaps};

/// A layer's merged result for one dimension.
///
/// Absent bounds mean the layer does not constrain that side. Percentage
/// deltas are carried to the across-layer fold, where they scale the
/// accumulated bound.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LayerCaps {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub pct_min: f64,
    pub pct_max: f64,
}

impl LayerCaps {
    /// The layer's own bounds, with unconstrained sides open.
    pub fn bounds(&self) -> CapRange {
        CapRange::new(
            self.min.unwrap_or(f64::NEG_INFINITY),
            self.max.unwrap_or(f64::INFINITY),
        )
    }
}

/// A non-fatal configuration conflict detected while folding caps.
#[derive(Clone, Debug, PartialEq)]
pub struct CapWarning {
    pub dimension: String,
    pub layer: String,
    /// The inverted range before collapsing
    pub original: CapRange,
    /// The single legal point both bounds were collapsed to
    pub resolved: CapRange,
}

/// Result of the across-layer fold: final ranges plus any conflicts that
/// were auto-collapsed along the way.
#[derive(Clone, Debug, Default)]
pub struct CapsOutcome {
    pub caps: EffectiveCaps,
    pub warnings: Vec<CapWarning>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Min,
    Max,
}

/// Deterministic order for cap entries: priority, then system, then value.
fn sort_caps(entries: &mut [&CapContribution]) {
    entries.sort_by(|a, b| {
        a.effective_priority()
            .cmp(&b.effective_priority())
            .then_with(|| a.system.cmp(&b.system))
            .then_with(|| a.value.total_cmp(&b.value))
    });
}

/// Merge absolute values for one side of the range under a policy.
fn merge_absolute(policy: MergePolicy, side: Side, entries: &[(f64, i64)]) -> Option<f64> {
    if entries.is_empty() {
        return None;
    }
    let merged = match policy {
        // Most restrictive: the highest floor, the lowest ceiling.
        MergePolicy::Intersect => match side {
            Side::Min => entries.iter().map(|(v, _)| *v).fold(f64::NEG_INFINITY, f64::max),
            Side::Max => entries.iter().map(|(v, _)| *v).fold(f64::INFINITY, f64::min),
        },
        MergePolicy::Sum => entries.iter().map(|(v, _)| *v).sum(),
        MergePolicy::Min => entries.iter().map(|(v, _)| *v).fold(f64::INFINITY, f64::min),
        MergePolicy::Max => entries.iter().map(|(v, _)| *v).fold(f64::NEG_INFINITY, f64::max),
        MergePolicy::WeightedAverage => {
            let total_weight: f64 = entries.iter().map(|(_, p)| (*p).max(1) as f64).sum();
            entries
                .iter()
                .map(|(v, p)| v * (*p).max(1) as f64)
                .sum::<f64>()
                / total_weight
        }
    };
    Some(merged)
}

/// Merge all cap contributions landing in `layer` into one partial range
/// per dimension.
///
/// Entries are filtered to the layer and the evaluation realm before
/// merging. Absolute entries merge under the layer policy, override entries
/// replace the merged bound with the highest-priority value, and
/// percent-additive entries accumulate as deltas for the across-layer fold.
pub fn effective_caps_within_layer(
    layer: &CapLayer,
    caps: &[CapContribution],
    realm: Option<&str>,
) -> HashMap<String, LayerCaps> {
    let mut by_dimension: HashMap<&str, Vec<&CapContribution>> = HashMap::new();
    for cap in caps {
        if cap.layer == layer.id && cap.matches_realm(realm) {
            by_dimension.entry(cap.dimension.as_str()).or_default().push(cap);
        }
    }

    let mut merged = HashMap::new();
    for (dimension, mut entries) in by_dimension {
        sort_caps(&mut entries);

        let mut mins: Vec<(f64, i64)> = Vec::new();
        let mut maxs: Vec<(f64, i64)> = Vec::new();
        let mut result = LayerCaps::default();

        for cap in &entries {
            let touches_min = matches!(cap.mode, CapMode::Min | CapMode::Both);
            let touches_max = matches!(cap.mode, CapMode::Max | CapMode::Both);
            match cap.kind {
                CapKind::Absolute => {
                    if touches_min {
                        mins.push((cap.value, cap.effective_priority()));
                    }
                    if touches_max {
                        maxs.push((cap.value, cap.effective_priority()));
                    }
                }
                CapKind::PercentAdditive => {
                    if touches_min {
                        result.pct_min += cap.value;
                    }
                    if touches_max {
                        result.pct_max += cap.value;
                    }
                }
                CapKind::Override => {}
            }
        }

        result.min = merge_absolute(layer.merge, Side::Min, &mins);
        result.max = merge_absolute(layer.merge, Side::Max, &maxs);

        // Overrides replace the merged bound; the sort leaves the
        // highest-priority entry last, so the final write wins.
        for cap in entries.iter().filter(|c| c.kind == CapKind::Override) {
            if matches!(cap.mode, CapMode::Min | CapMode::Both) {
                result.min = Some(cap.value);
            }
            if matches!(cap.mode, CapMode::Max | CapMode::Both) {
                result.max = Some(cap.value);
            }
        }

        merged.insert(dimension.to_string(), result);
    }

    merged
}

/// Collapse an inverted range to a single legal point.
fn collapse(range: CapRange, policy: InvertedCapPolicy) -> CapRange {
    let point = match policy {
        InvertedCapPolicy::Restrictive => range.min.min(range.max),
        InvertedCapPolicy::Midpoint => (range.min + range.max) / 2.0,
    };
    CapRange::new(point, point)
}

/// Fold the ordered per-layer results into one [`EffectiveCaps`].
///
/// The first layer to mention a dimension establishes its range; later
/// layers apply their declared reduction mode (narrow, widen, or override)
/// and then their percentage deltas. An inverted intermediate result is
/// collapsed per the set's [`InvertedCapPolicy`] and recorded as a warning,
/// so the output always satisfies min ≤ max.
pub fn effective_caps_across_layers(
    set: &LayerSet,
    caps: &[CapContribution],
    realm: Option<&str>,
) -> CapsOutcome {
    let mut outcome = CapsOutcome::default();

    for layer in set.layers() {
        let layer_caps = effective_caps_within_layer(layer, caps, realm);
        let mut dimensions: Vec<&String> = layer_caps.keys().collect();
        dimensions.sort();

        for dimension in dimensions {
            let lc = &layer_caps[dimension];
            let layer_range = lc.bounds();

            // Fold per side so a bound the layer does not constrain is left
            // untouched regardless of the reduction mode.
            let mut next = match outcome.caps.get(dimension.as_str()) {
                None => layer_range,
                Some(prev) => {
                    let min = match (layer.reduction, lc.min) {
                        (ReductionMode::Narrow, Some(m)) => prev.min.max(m),
                        (ReductionMode::Widen, Some(m)) => prev.min.min(m),
                        (ReductionMode::Override, Some(m)) => m,
                        (_, None) => prev.min,
                    };
                    let max = match (layer.reduction, lc.max) {
                        (ReductionMode::Narrow, Some(m)) => prev.max.min(m),
                        (ReductionMode::Widen, Some(m)) => prev.max.max(m),
                        (ReductionMode::Override, Some(m)) => m,
                        (_, None) => prev.max,
                    };
                    CapRange::new(min, max)
                }
            };

            // Percentage deltas scale the bound accumulated so far; an
            // unconstrained (infinite) bound is left untouched.
            if lc.pct_min != 0.0 && next.min.is_finite() {
                next.min *= 1.0 + lc.pct_min / 100.0;
            }
            if lc.pct_max != 0.0 && next.max.is_finite() {
                next.max *= 1.0 + lc.pct_max / 100.0;
            }

            if next.is_inverted() {
                let resolved = collapse(next, set.inverted_policy);
                outcome.warnings.push(CapWarning {
                    dimension: dimension.clone(),
                    layer: layer.id.clone(),
                    original: next,
                    resolved,
                });
                next = resolved;
            }

            outcome.caps.insert(dimension.clone(), next);
        }
    }

    outcome
}
