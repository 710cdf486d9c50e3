// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded in-memory result cache.
//!
//! Keys are content hashes over the input raster and the option set, so an
//! identical re-run reuses the prior result instead of recomputing.
//! Entries expire after a TTL and are evicted lazily on the next write;
//! readers share a lock so concurrent lookups do not serialize.

use std::hash::{Hash, Hasher};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use rustc_hash::FxHasher;

use crate::types::{PipelineConfig, PipelineResult};

/// Compute the cache key for an input raster and option set.
///
/// FxHasher is enough here: the key only needs to distinguish inputs within
/// one process, not resist collisions adversarially.
pub fn cache_key(rgba: &[u8], width: u32, height: u32, config: &PipelineConfig) -> u64 {
    let mut hasher = FxHasher::default();
    width.hash(&mut hasher);
    height.hash(&mut hasher);
    rgba.hash(&mut hasher);
    // Fold the option set in through its serialized form
    if let Ok(encoded) = serde_json::to_vec(config) {
        encoded.hash(&mut hasher);
    }
    hasher.finish()
}

struct CacheEntry {
    key: u64,
    value: PipelineResult,
    inserted: Instant,
}

/// Orchestrator-owned result cache with a capacity bound and TTL
pub struct ResultCache {
    entries: RwLock<Vec<CacheEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(24 * 60 * 60))
    }
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Look up an unexpired entry. Expired entries are skipped here and
    /// reclaimed on the next write.
    pub fn get(&self, key: u64) -> Option<PipelineResult> {
        let entries = self.entries.read().ok()?;
        let hit = entries
            .iter()
            .find(|e| e.key == key && e.inserted.elapsed() < self.ttl)
            .map(|e| e.value.clone());
        if hit.is_some() {
            tracing::debug!(key, "pipeline cache hit");
        }
        hit
    }

    /// Insert a result, evicting expired entries first and the oldest
    /// entry when at capacity.
    pub fn set(&self, key: u64, value: PipelineResult) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };

        entries.retain(|e| e.inserted.elapsed() < self.ttl);
        entries.retain(|e| e.key != key);
        while entries.len() >= self.capacity {
            entries.remove(0);
        }

        entries.push(CacheEntry {
            key,
            value,
            inserted: Instant::now(),
        });
        tracing::debug!(key, len = entries.len(), "pipeline result cached");
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
