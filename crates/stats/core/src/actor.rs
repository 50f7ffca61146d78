//! Actor identity and mutation versioning.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for an actor (player or NPC).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ActorId(pub u64);

impl ActorId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.0)
    }
}

/// The slice of actor state the resolution pipeline needs.
///
/// The version is the actor's mutation counter: every externally visible
/// change (equip, level, buff expiry, ...) advances it, and a [`Snapshot`]
/// is only valid for the version it was computed against.
///
/// [`Snapshot`]: crate::snapshot::Snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    /// Unique identifier
    pub id: ActorId,
    /// Mutation version; advanced on every externally visible change
    pub version: u64,
    /// Realm the actor is currently evaluated in, if any
    pub realm: Option<String>,
    /// Free-form tags subsystems may read (guild id, zone, ...)
    pub tags: HashMap<String, String>,
}

impl Actor {
    /// Create an actor at version 1 with no realm or tags.
    pub fn new(id: ActorId) -> Self {
        Self {
            id,
            version: 1,
            realm: None,
            tags: HashMap::new(),
        }
    }

    /// Set the evaluation realm (builder style).
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Advance the mutation version.
    pub fn touch(&mut self) {
        self.version += 1;
    }
}
