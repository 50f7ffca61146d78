//! The (min, max) legal range for a dimension.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A closed legal range for one dimension value.
///
/// Unconstrained bounds are represented as ±infinity, so a fresh range
/// starts [`CapRange::unbounded`] and narrows as layers apply.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapRange {
    pub min: f64,
    pub max: f64,
}

/// Final legal ranges per dimension, valid only for the resolution pass
/// that produced them.
pub type EffectiveCaps = HashMap<String, CapRange>;

impl CapRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// A range that admits every finite value.
    pub const fn unbounded() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    /// Clamp a value into this range.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    /// True when the range contains the value.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// True when the bounds have crossed (min > max).
    pub fn is_inverted(&self) -> bool {
        self.min > self.max
    }

    /// Most restrictive combination: the overlap of both ranges.
    pub fn intersect(&self, other: &CapRange) -> CapRange {
        CapRange::new(self.min.max(other.min), self.max.min(other.max))
    }

    /// Least restrictive combination: the hull of both ranges.
    pub fn union(&self, other: &CapRange) -> CapRange {
        CapRange::new(self.min.min(other.min), self.max.max(other.max))
    }
}

impl Default for CapRange {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_is_idempotent_and_noop_in_range() {
        let range = CapRange::new(0.0, 120.0);
        assert_eq!(range.clamp(50.0), 50.0);
        assert_eq!(range.clamp(150.0), 120.0);
        assert_eq!(range.clamp(range.clamp(150.0)), 120.0);
        assert_eq!(range.clamp(-3.0), 0.0);
    }

    #[test]
    fn intersect_and_union() {
        let a = CapRange::new(0.0, 100.0);
        let b = CapRange::new(50.0, 150.0);
        assert_eq!(a.intersect(&b), CapRange::new(50.0, 100.0));
        assert_eq!(a.union(&b), CapRange::new(0.0, 150.0));
    }

    #[test]
    fn disjoint_intersection_is_inverted() {
        let a = CapRange::new(0.0, 10.0);
        let b = CapRange::new(20.0, 30.0);
        assert!(a.intersect(&b).is_inverted());
    }
}
