//! Per-actor mutation version tracking.

use dashmap::DashMap;

use stat_core::{Actor, ActorId};

/// Tracks the highest mutation version observed per actor.
///
/// The ledger is what ties cache validity to actor state: resolution
/// passes stamp the version they observed at the outset, and a pass whose
/// actor advanced mid-flight discards its cache write instead of
/// publishing a stale snapshot. Keyed per actor through a concurrent map,
/// so different actors never contend.
pub struct VersionLedger {
    versions: DashMap<ActorId, u64>,
}

impl VersionLedger {
    pub fn new() -> Self {
        Self {
            versions: DashMap::new(),
        }
    }

    /// Record the actor's version and return the highest seen so far.
    ///
    /// An actor object carrying an older version than the ledger (for
    /// example a caller racing an invalidation) resolves against the newer
    /// ledger version so its result cannot shadow fresher state.
    pub fn observe(&self, actor: &Actor) -> u64 {
        let mut entry = self.versions.entry(actor.id).or_insert(actor.version);
        if actor.version > *entry {
            *entry = actor.version;
        }
        *entry
    }

    /// Current version for an actor, if one was ever observed.
    pub fn current(&self, actor_id: ActorId) -> Option<u64> {
        self.versions.get(&actor_id).map(|v| *v)
    }

    /// Advance the actor's version, invalidating every snapshot stamped
    /// with an older one.
    pub fn bump(&self, actor_id: ActorId) -> u64 {
        let mut entry = self.versions.entry(actor_id).or_insert(0);
        *entry += 1;
        *entry
    }
}

impl Default for VersionLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_keeps_the_highest_version() {
        let ledger = VersionLedger::new();
        let mut actor = Actor::new(ActorId::new(1));
        assert_eq!(ledger.observe(&actor), 1);

        ledger.bump(actor.id);
        assert_eq!(ledger.observe(&actor), 2);

        actor.version = 5;
        assert_eq!(ledger.observe(&actor), 5);
        assert_eq!(ledger.current(actor.id), Some(5));
    }
}
