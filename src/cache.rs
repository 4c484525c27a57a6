//! Partition state cache with position-based locking.
//!
//! Each partition the projection has touched keeps its current state
//! string here, locked at the tag of the work item that last used it.
//! Entries are purged by `unlock(upto)` once a checkpoint covers them;
//! the root partition is seeded at initialization and never purged.

use std::collections::HashMap;

use crate::error::{ProjectionError, Result};
use crate::tag::CheckpointTag;

/// Key of the root partition.
pub const ROOT_PARTITION: &str = "";

#[derive(Debug, Clone)]
struct CachedState {
    state: String,
    locked_at: Option<CheckpointTag>,
    owner: Option<u64>,
}

/// In-memory cache of per-partition state.
///
/// Durability of partition state is indirect: it is persisted through
/// emitted `StateUpdated` events and reconstructed by a backward scan of
/// the partition's state stream, never from this cache.
#[derive(Debug)]
pub struct PartitionStateCache {
    entries: HashMap<String, CachedState>,
}

impl PartitionStateCache {
    /// Create a cache with the root partition seeded empty and unlocked.
    pub fn new() -> Self {
        let mut cache = Self {
            entries: HashMap::new(),
        };
        cache.initialize();
        cache
    }

    /// Clear all entries and re-seed the root partition.
    pub fn initialize(&mut self) {
        self.entries.clear();
        self.entries.insert(
            ROOT_PARTITION.to_string(),
            CachedState {
                state: String::new(),
                locked_at: None,
                owner: None,
            },
        );
    }

    /// Upsert a partition's state, locking it at `at`.
    ///
    /// `at = None` marks the entry unlockable only by re-initialization
    /// (used for the root partition and checkpoint-loaded state). Fails
    /// when the key is already locked at a later-or-equal tag under a
    /// different owner.
    pub fn cache_and_lock(
        &mut self,
        key: &str,
        state: String,
        at: Option<CheckpointTag>,
        owner: Option<u64>,
    ) -> Result<()> {
        if let (Some(existing), Some(at)) = (self.entries.get(key), at)
            && let Some(locked_at) = existing.locked_at
            && locked_at >= at
            && existing.owner != owner
        {
            return Err(ProjectionError::CacheLockConflict {
                key: key.to_string(),
                locked_at,
                attempted: at,
            });
        }

        self.entries
            .insert(key.to_string(), CachedState { state, locked_at: at, owner });
        Ok(())
    }

    /// Return the cached state for `key`, advancing its lock to `at`.
    ///
    /// Returns `None` when the partition is not cached (the caller must
    /// recover it from the state stream). Fails when the entry is locked
    /// at a later tag by a different owner.
    pub fn try_get_and_lock(
        &mut self,
        key: &str,
        at: CheckpointTag,
        owner: Option<u64>,
    ) -> Result<Option<String>> {
        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(None);
        };

        if let Some(locked_at) = entry.locked_at
            && locked_at > at
            && entry.owner != owner
        {
            return Err(ProjectionError::CacheLockConflict {
                key: key.to_string(),
                locked_at,
                attempted: at,
            });
        }

        // The root keeps its permanent lock-free entry
        if key != ROOT_PARTITION {
            entry.locked_at = Some(at);
            entry.owner = owner;
        }

        Ok(Some(entry.state.clone()))
    }

    /// Read the state of a partition that must already be cached.
    pub fn get_locked(&self, key: &str) -> Result<&str> {
        self.entries
            .get(key)
            .map(|entry| entry.state.as_str())
            .ok_or_else(|| ProjectionError::PartitionStateMissing(key.to_string()))
    }

    /// Read a partition's state without touching its lock, if cached.
    pub fn peek(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|entry| entry.state.as_str())
    }

    /// Purge every non-root entry locked strictly before `upto`.
    ///
    /// Entries with no lock position survive until re-initialization.
    pub fn unlock(&mut self, upto: CheckpointTag) {
        self.entries.retain(|key, entry| {
            key == ROOT_PARTITION || entry.locked_at.is_none_or(|at| at >= upto)
        });
    }

    /// Number of cached partitions, root included.
    pub fn cached_item_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for PartitionStateCache {
    fn default() -> Self {
        Self::new()
    }
}
