//! Dimension identifiers and value storage.
//!
//! A small fixed set of core dimensions covers the hot path of every
//! resolution, while mods and events introduce arbitrary custom dimensions.
//! [`DimensionMap`] serves both through one accessor: core dimensions live
//! in indexed slots, everything else falls back to an associative map. The
//! split is an internal storage detail; callers only see get/set/iter by
//! name.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Core dimension names.
pub mod core_dimensions {
    pub const POWER: &str = "power";
    pub const SPEED: &str = "speed";
    pub const HEALTH: &str = "health";
    pub const MANA: &str = "mana";
    pub const DEFENSE: &str = "defense";
    pub const CRIT_RATE: &str = "crit_rate";
}

/// The core dimensions in slot order.
pub const CORE_DIMENSIONS: [&str; 6] = [
    core_dimensions::POWER,
    core_dimensions::SPEED,
    core_dimensions::HEALTH,
    core_dimensions::MANA,
    core_dimensions::DEFENSE,
    core_dimensions::CRIT_RATE,
];

/// Slot index of a core dimension, if `name` is one.
fn core_slot(name: &str) -> Option<usize> {
    CORE_DIMENSIONS.iter().position(|d| *d == name)
}

/// Unified storage for dimension values.
///
/// Core dimensions are stored in fixed slots, custom dimensions in a map.
/// Serializes as a plain name → value mapping so cache payloads stay
/// layout-independent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DimensionMap {
    core: [Option<f64>; CORE_DIMENSIONS.len()],
    custom: HashMap<String, f64>,
}

impl DimensionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value by dimension name.
    pub fn get(&self, name: &str) -> Option<f64> {
        match core_slot(name) {
            Some(slot) => self.core[slot],
            None => self.custom.get(name).copied(),
        }
    }

    /// Store a value by dimension name.
    pub fn set(&mut self, name: &str, value: f64) {
        match core_slot(name) {
            Some(slot) => self.core[slot] = Some(value),
            None => {
                self.custom.insert(name.to_string(), value);
            }
        }
    }

    /// Number of populated dimensions.
    pub fn len(&self) -> usize {
        self.core.iter().filter(|v| v.is_some()).count() + self.custom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate populated (name, value) pairs; core slots first, then custom
    /// dimensions in map order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.core
            .iter()
            .enumerate()
            .filter_map(|(slot, v)| v.map(|value| (CORE_DIMENSIONS[slot], value)))
            .chain(self.custom.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

impl FromIterator<(String, f64)> for DimensionMap {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.set(&name, value);
        }
        map
    }
}

impl Serialize for DimensionMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DimensionMap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = HashMap::<String, f64>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}
