//! The immutable result of one complete resolution pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actor::ActorId;
use crate::caps::{CapRange, EffectiveCaps};
use crate::dimension::DimensionMap;

/// Version-stamped, immutable view of an actor's derived statistics.
///
/// Produced exactly once per resolution pass and never mutated afterwards;
/// this is the sole unit the cache tiers store. Validity is tied to the
/// actor's mutation version — a snapshot stamped with an older version is
/// stale and must never be served.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The actor this snapshot belongs to
    pub actor_id: ActorId,
    /// Composed primary dimension values
    pub primary: DimensionMap,
    /// Composed derived dimension values
    pub derived: DimensionMap,
    /// Effective caps the pass clamped against
    pub caps_used: EffectiveCaps,
    /// The actor's mutation version at the start of the pass
    pub version: u64,
    /// When the snapshot was assembled
    pub created_at: DateTime<Utc>,
    /// True when at least one subsystem failed, or none contributed
    pub degraded: bool,
    /// How many subsystems failed during the pass
    pub failed_subsystems: u32,
    /// Ids of the subsystems whose contributions are reflected here
    pub subsystems_processed: Vec<String>,
    /// Wall-clock duration of the pass in microseconds
    pub processing_time_us: Option<u64>,
}

impl Snapshot {
    pub fn new(actor_id: ActorId, version: u64) -> Self {
        Self {
            actor_id,
            primary: DimensionMap::new(),
            derived: DimensionMap::new(),
            caps_used: EffectiveCaps::new(),
            version,
            created_at: Utc::now(),
            degraded: false,
            failed_subsystems: 0,
            subsystems_processed: Vec::new(),
            processing_time_us: None,
        }
    }

    /// Composed primary value for a dimension.
    pub fn primary(&self, dimension: &str) -> Option<f64> {
        self.primary.get(dimension)
    }

    /// Composed derived value for a dimension.
    pub fn derived(&self, dimension: &str) -> Option<f64> {
        self.derived.get(dimension)
    }

    /// Effective caps the pass used for a dimension.
    pub fn caps(&self, dimension: &str) -> Option<&CapRange> {
        self.caps_used.get(dimension)
    }
}
