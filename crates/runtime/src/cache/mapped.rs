//! Mid tier: block-addressed mapped storage with compressed values.
//!
//! One `MmapMut` region is divided into fixed-size blocks; an in-memory
//! index maps storage keys to block runs. Values are bincode-encoded and
//! zlib-compressed. The index lock is not on the resolver's hot path — the
//! fast tier absorbs repeat lookups — so a single `RwLock` over the region
//! state is sufficient here.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use memmap2::MmapMut;
use parking_lot::RwLock;
use tracing::debug;

use stat_core::Snapshot;

use super::{CacheError, CacheKey, Result, TierStats, unix_now};

const BLOCK_SIZE: usize = 4096;

#[derive(Clone, Copy, Debug)]
struct MappedEntry {
    start_block: usize,
    block_len: usize,
    byte_len: usize,
    expires_at: u64,
    created_at: u64,
}

struct MappedState {
    mmap: MmapMut,
    /// One flag per block; `true` means free
    free: Vec<bool>,
    index: HashMap<String, MappedEntry>,
}

impl MappedState {
    fn release(&mut self, entry: &MappedEntry) {
        for block in entry.start_block..entry.start_block + entry.block_len {
            self.free[block] = true;
        }
    }

    fn first_fit(&self, blocks_needed: usize) -> Option<usize> {
        let mut run = 0;
        for (block, free) in self.free.iter().enumerate() {
            if *free {
                run += 1;
                if run == blocks_needed {
                    return Some(block + 1 - blocks_needed);
                }
            } else {
                run = 0;
            }
        }
        None
    }

    fn remove_key(&mut self, key: &str) -> bool {
        if let Some(entry) = self.index.remove(key) {
            self.release(&entry);
            true
        } else {
            false
        }
    }
}

/// Block-addressed mapped tier.
pub struct MappedCache {
    state: RwLock<MappedState>,
    capacity_bytes: usize,
    stats: TierStats,
}

impl MappedCache {
    /// Create (or recreate) the mapped region. The index lives in memory,
    /// so the region starts empty each process run; durability across
    /// restarts is the durable tier's job.
    pub fn new(path: &Path, capacity_bytes: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let block_count = capacity_bytes.div_ceil(BLOCK_SIZE).max(1);
        let capacity_bytes = block_count * BLOCK_SIZE;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(capacity_bytes as u64)?;

        // Safety: the region is private to this process; the file was just
        // truncated and sized, and all access goes through the state lock.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        debug!(
            path = %path.display(),
            blocks = block_count,
            "mapped cache region created"
        );

        Ok(Self {
            state: RwLock::new(MappedState {
                mmap,
                free: vec![true; block_count],
                index: HashMap::new(),
            }),
            capacity_bytes,
            stats: TierStats::default(),
        })
    }

    /// Look up a snapshot; returns the value and its expiry so promotion
    /// can carry the remaining TTL upward.
    pub fn get(&self, key: &CacheKey) -> Result<Option<(Arc<Snapshot>, u64)>> {
        let storage_key = key.storage_key();

        let payload = {
            let state = self.state.read();
            let Some(entry) = state.index.get(&storage_key).copied() else {
                self.stats.record_miss();
                return Ok(None);
            };
            if entry.expires_at <= unix_now() {
                None
            } else {
                let offset = entry.start_block * BLOCK_SIZE;
                Some((
                    state.mmap[offset..offset + entry.byte_len].to_vec(),
                    entry.expires_at,
                ))
            }
        };

        match payload {
            None => {
                // Expired: reclaim the blocks outside the read lock.
                self.state.write().remove_key(&storage_key);
                self.stats.record_miss();
                Ok(None)
            }
            Some((compressed, expires_at)) => {
                let mut decoder = ZlibDecoder::new(compressed.as_slice());
                let mut encoded = Vec::new();
                decoder
                    .read_to_end(&mut encoded)
                    .map_err(|e| CacheError::CorruptedEntry(e.to_string()))?;
                let snapshot: Snapshot = bincode::deserialize(&encoded)
                    .map_err(|e| CacheError::Serialization(e.to_string()))?;
                self.stats.record_hit();
                Ok(Some((Arc::new(snapshot), expires_at)))
            }
        }
    }

    pub fn put(&self, key: &CacheKey, snapshot: &Snapshot, expires_at: u64) -> Result<()> {
        let encoded = bincode::serialize(snapshot)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&encoded)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let payload = encoder
            .finish()
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        if payload.len() > self.capacity_bytes {
            return Err(CacheError::EntryTooLarge {
                size: payload.len(),
                capacity: self.capacity_bytes,
            });
        }
        let blocks_needed = payload.len().div_ceil(BLOCK_SIZE).max(1);

        let storage_key = key.storage_key();
        let mut state = self.state.write();
        state.remove_key(&storage_key);

        let start_block = match state.first_fit(blocks_needed) {
            Some(start) => start,
            None => self.evict_until_fit(&mut state, blocks_needed),
        };

        for block in start_block..start_block + blocks_needed {
            state.free[block] = false;
        }
        let offset = start_block * BLOCK_SIZE;
        state.mmap[offset..offset + payload.len()].copy_from_slice(&payload);
        state.index.insert(
            storage_key,
            MappedEntry {
                start_block,
                block_len: blocks_needed,
                byte_len: payload.len(),
                expires_at,
                created_at: unix_now(),
            },
        );

        self.stats.record_set();
        Ok(())
    }

    pub fn remove(&self, key: &CacheKey) {
        self.state.write().remove_key(&key.storage_key());
    }

    /// Drop every entry whose storage key starts with the prefix.
    pub fn remove_prefix(&self, prefix: &str) {
        let mut state = self.state.write();
        let matching: Vec<String> = state
            .index
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in matching {
            state.remove_key(&key);
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.index.clear();
        state.free.fill(true);
    }

    /// Flush the mapped region to its backing file.
    pub fn sync(&self) -> Result<()> {
        self.state.read().mmap.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    pub fn stats(&self) -> &TierStats {
        &self.stats
    }

    /// Free space for a new entry: expired entries first, then oldest by
    /// creation time. The payload fits the region, so once the index
    /// drains a run must exist.
    fn evict_until_fit(&self, state: &mut MappedState, blocks_needed: usize) -> usize {
        let now = unix_now();
        let mut evicted = 0u64;

        let expired: Vec<String> = state
            .index
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            state.remove_key(&key);
            evicted += 1;
        }

        loop {
            if let Some(start) = state.first_fit(blocks_needed) {
                self.stats.record_evictions(evicted);
                return start;
            }
            let oldest = state
                .index
                .iter()
                .min_by(|(ka, a), (kb, b)| a.created_at.cmp(&b.created_at).then_with(|| ka.cmp(kb)))
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    state.remove_key(&key);
                    evicted += 1;
                }
                None => {
                    // Empty index with a fitting payload: the whole region
                    // is free.
                    self.stats.record_evictions(evicted);
                    return 0;
                }
            }
        }
    }
}
