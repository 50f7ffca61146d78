//! Per-resolution evaluation context.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Extra evaluation state for one resolution pass.
///
/// The context selects which realm-scoped caps apply and feeds the cache
/// key: two passes with different contexts never share a cache entry.
#[derive(Clone, Debug, Default)]
pub struct ResolveContext {
    /// Realm the pass evaluates in; overrides the actor's own realm
    pub realm: Option<String>,
    /// Free-form key/value state subsystems may read. Ordered so the
    /// context hash is stable.
    pub tags: BTreeMap<String, String>,
}

impl ResolveContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the realm (builder style).
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Add a tag (builder style).
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.realm.is_none() && self.tags.is_empty()
    }

    /// Short stable digest of the context, or `None` when empty so
    /// context-free passes keep the plain actor:version cache key.
    pub fn cache_hash(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut hasher = Sha256::new();
        if let Some(realm) = &self.realm {
            hasher.update(b"realm:");
            hasher.update(realm.as_bytes());
        }
        for (key, value) in &self.tags {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b";");
        }
        let digest = hasher.finalize();
        Some(hex::encode(&digest[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_has_no_hash() {
        assert!(ResolveContext::new().cache_hash().is_none());
    }

    #[test]
    fn hash_is_stable_and_distinguishes_contexts() {
        let a = ResolveContext::new().with_realm("arena").with_tag("party", "raid");
        let b = ResolveContext::new().with_realm("arena").with_tag("party", "raid");
        let c = ResolveContext::new().with_realm("overworld");

        assert_eq!(a.cache_hash(), b.cache_hash());
        assert_ne!(a.cache_hash(), c.cache_hash());
    }
}
