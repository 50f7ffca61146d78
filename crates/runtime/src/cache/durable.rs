//! Durable tier: disk-backed store behind a minimal async contract.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use stat_core::Snapshot;

use super::{CacheError, CacheKey, Result, unix_now};

/// What the durable tier stores per key.
///
/// The full key is embedded so a read can verify it got the entry it asked
/// for even though filenames are hashed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DurableEntry {
    pub key: CacheKey,
    pub snapshot: Snapshot,
    pub expires_at: u64,
    pub created_at: u64,
}

/// Minimal contract for the durable tier's storage medium.
///
/// Whatever sits behind this — local files, a shared volume, a remote
/// store — only needs get/put/delete by key plus a periodic flush hook.
/// Implementations must never return an expired entry.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<DurableEntry>>;

    async fn put(&self, key: &CacheKey, snapshot: &Snapshot, expires_at: u64) -> Result<()>;

    async fn delete(&self, key: &CacheKey) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// Called periodically by the flush worker and on shutdown.
    async fn flush(&self) -> Result<()>;
}

/// File-backed durable store: one bincode entry file per key.
///
/// Files are named by the sha-256 of the storage key so arbitrary context
/// hashes stay filesystem-safe. Writes go to a temp file first and rename
/// into place, so readers in other processes never observe a partial
/// entry.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let digest = Sha256::digest(key.storage_key().as_bytes());
        self.base_dir.join(format!("snap_{}.bin", hex::encode(digest)))
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<DurableEntry>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = std::fs::read(&path)?;
        let entry: DurableEntry = bincode::deserialize(&bytes)
            .map_err(|e| CacheError::CorruptedEntry(e.to_string()))?;

        if entry.key != *key {
            return Err(CacheError::CorruptedEntry(format!(
                "entry at {} belongs to key {}",
                path.display(),
                entry.key
            )));
        }

        if entry.expires_at <= unix_now() {
            let _ = std::fs::remove_file(&path);
            return Ok(None);
        }

        Ok(Some(entry))
    }

    async fn put(&self, key: &CacheKey, snapshot: &Snapshot, expires_at: u64) -> Result<()> {
        let entry = DurableEntry {
            key: key.clone(),
            snapshot: snapshot.clone(),
            expires_at,
            created_at: unix_now(),
        };
        let bytes = bincode::serialize(&entry)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        let path = self.entry_path(key);
        let temp_path = path.with_extension("bin.tmp");
        std::fs::write(&temp_path, bytes)?;
        std::fs::rename(&temp_path, &path)?;

        debug!(key = %key, path = %path.display(), "durable entry written");
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<()> {
        let path = self.entry_path(key);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "bin") {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        // Writes are already durable after the rename; nothing buffered.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stat_core::ActorId;

    fn snapshot(actor: u64, version: u64) -> Snapshot {
        let mut snapshot = Snapshot::new(ActorId::new(actor), version);
        snapshot.primary.set("power", 9.0);
        snapshot
    }

    #[tokio::test]
    async fn round_trips_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::new(ActorId::new(3), 2);

        {
            let store = FileStore::new(dir.path()).unwrap();
            store.put(&key, &snapshot(3, 2), unix_now() + 60).await.unwrap();
        }

        // A fresh store over the same directory sees the entry, as a
        // restarted process would.
        let store = FileStore::new(dir.path()).unwrap();
        let entry = store.get(&key).await.unwrap().expect("entry should persist");
        assert_eq!(entry.snapshot.primary("power"), Some(9.0));
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let key = CacheKey::new(ActorId::new(3), 2);

        store
            .put(&key, &snapshot(3, 2), unix_now().saturating_sub(1))
            .await
            .unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_and_clear_remove_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let key_a = CacheKey::new(ActorId::new(1), 1);
        let key_b = CacheKey::new(ActorId::new(2), 1);

        store.put(&key_a, &snapshot(1, 1), unix_now() + 60).await.unwrap();
        store.put(&key_b, &snapshot(2, 1), unix_now() + 60).await.unwrap();

        store.delete(&key_a).await.unwrap();
        assert!(store.get(&key_a).await.unwrap().is_none());
        assert!(store.get(&key_b).await.unwrap().is_some());

        store.clear().await.unwrap();
        assert!(store.get(&key_b).await.unwrap().is_none());
    }
}
