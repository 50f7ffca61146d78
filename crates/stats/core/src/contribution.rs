//! Contribution value objects.
//!
//! Contributions are the transient inputs of one resolution pass: each
//! subsystem creates them fresh per call, the pass consumes them, and they
//! are discarded once the snapshot is built. They are never cached.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::bucket::Bucket;

/// A single signed numeric input to one stat dimension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// The dimension being modified (e.g. "power", "speed")
    pub dimension: String,
    /// How this contribution combines with others
    pub bucket: Bucket,
    /// The contributed value
    pub value: f64,
    /// The subsystem that produced this contribution
    pub system: String,
    /// Optional priority; `None` is treated as 0
    pub priority: Option<i64>,
    /// Optional free-form tags
    pub tags: Option<HashMap<String, String>>,
}

impl Contribution {
    pub fn new(
        dimension: impl Into<String>,
        bucket: Bucket,
        value: f64,
        system: impl Into<String>,
    ) -> Self {
        Self {
            dimension: dimension.into(),
            bucket,
            value,
            system: system.into(),
            priority: None,
            tags: None,
        }
    }

    /// Set the priority (builder style).
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Effective priority with `None` mapped to 0.
    pub fn effective_priority(&self) -> i64 {
        self.priority.unwrap_or(0)
    }

    /// A contribution is valid when its ids are non-empty and its value is
    /// finite.
    pub fn is_valid(&self) -> bool {
        !self.dimension.is_empty() && !self.system.is_empty() && self.value.is_finite()
    }
}

/// Which bound(s) of a cap a [`CapContribution`] constrains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum CapMode {
    /// Constrains the minimum bound
    Min,
    /// Constrains the maximum bound
    Max,
    /// Constrains both bounds symmetrically
    Both,
}

/// How a [`CapContribution`] value is interpreted when merging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum CapKind {
    /// An absolute bound value
    Absolute,
    /// A percentage delta applied to the bound accumulated so far
    PercentAdditive,
    /// Replaces the layer's merged bound; highest priority wins
    Override,
}

/// A single cap constraint proposed by a subsystem.
///
/// Same transient lifecycle as [`Contribution`]: created per resolution
/// pass, consumed by the caps engine, never cached individually.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapContribution {
    /// The subsystem that proposed this cap
    pub system: String,
    /// The dimension being capped
    pub dimension: String,
    /// Which bound(s) are constrained
    pub mode: CapMode,
    /// How the value is interpreted
    pub kind: CapKind,
    /// The cap value (absolute bound or percentage, per `kind`)
    pub value: f64,
    /// Optional priority; `None` is treated as 0
    pub priority: Option<i64>,
    /// The layer this cap lands in (e.g. "base", "equipment")
    pub layer: String,
    /// Realm scope; caps whose realm does not match the evaluation context
    /// are excluded before merging. `None` matches every realm.
    pub realm: Option<String>,
    /// Optional free-form tags
    pub tags: Option<HashMap<String, String>>,
}

impl CapContribution {
    pub fn new(
        system: impl Into<String>,
        dimension: impl Into<String>,
        mode: CapMode,
        kind: CapKind,
        value: f64,
        layer: impl Into<String>,
    ) -> Self {
        Self {
            system: system.into(),
            dimension: dimension.into(),
            mode,
            kind,
            value,
            priority: None,
            layer: layer.into(),
            realm: None,
            tags: None,
        }
    }

    /// Set the priority (builder style).
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Restrict to a realm (builder style).
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Effective priority with `None` mapped to 0.
    pub fn effective_priority(&self) -> i64 {
        self.priority.unwrap_or(0)
    }

    /// A cap contribution is valid when its ids are non-empty and its value
    /// is finite.
    pub fn is_valid(&self) -> bool {
        !self.system.is_empty()
            && !self.dimension.is_empty()
            && !self.layer.is_empty()
            && self.value.is_finite()
    }

    /// Whether this cap applies in the given evaluation realm.
    pub fn matches_realm(&self, realm: Option<&str>) -> bool {
        match (&self.realm, realm) {
            (None, _) => true,
            (Some(own), Some(current)) => own == current,
            (Some(_), None) => false,
        }
    }
}
