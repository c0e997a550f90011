// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Path lookup cache.
//!
//! Caches the filesystem-style full path of instance nodes in both
//! directions (node id -> path, path -> node id) for tree browsing.
//! Every instance-node mutation invalidates the affected entries before
//! the index-level lock is released, so a cached path can never outlive
//! the node shape it was computed from.
//!
//! Bounded by max entries with oldest-first eviction.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::storage::InstanceNodeId;

/// Cache statistics snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: usize,
}

/// Bidirectional node-id/path cache with bounded size.
pub struct PathCache {
    by_node: DashMap<InstanceNodeId, String>,
    by_path: DashMap<String, InstanceNodeId>,
    /// Insertion order for eviction (oldest first)
    order: Mutex<VecDeque<InstanceNodeId>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl PathCache {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            by_node: DashMap::new(),
            by_path: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Cached path for a node.
    #[must_use]
    pub fn get(&self, id: InstanceNodeId) -> Option<String> {
        match self.by_node.get(&id) {
            Some(path) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(path.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Reverse lookup: node id for a full path string.
    #[must_use]
    pub fn lookup_path(&self, path: &str) -> Option<InstanceNodeId> {
        match self.by_path.get(path) {
            Some(id) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(*id)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert both directions, evicting the oldest entries at capacity.
    pub fn insert(&self, id: InstanceNodeId, path: String) {
        let mut order = self.order.lock();
        while self.by_node.len() >= self.max_entries {
            let Some(oldest) = order.pop_front() else {
                break;
            };
            if let Some((_, old_path)) = self.by_node.remove(&oldest) {
                self.by_path.remove(&old_path);
            }
        }

        self.by_path.insert(path.clone(), id);
        match self.by_node.insert(id, path.clone()) {
            None => order.push_back(id),
            // Queue position is kept on re-insert; only the stale
            // reverse entry goes
            Some(old_path) if old_path != path => {
                self.by_path.remove(&old_path);
            }
            Some(_) => {}
        }
    }

    /// Drop both directions for one node.
    pub fn invalidate(&self, id: InstanceNodeId) {
        if let Some((_, path)) = self.by_node.remove(&id) {
            self.by_path.remove(&path);
            self.order.lock().retain(|queued| *queued != id);
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop entries for many nodes (one mutation batch).
    pub fn invalidate_many<'a>(&self, ids: impl IntoIterator<Item = &'a InstanceNodeId>) {
        for id in ids {
            self.invalidate(*id);
        }
    }

    /// Drop everything (index rebuild/reset).
    pub fn clear(&self) {
        let dropped = self.by_node.len() as u64;
        self.by_node.clear();
        self.by_path.clear();
        self.order.lock().clear();
        self.invalidations.fetch_add(dropped, Ordering::Relaxed);
    }

    #[must_use]
    pub fn stats(&self) -> PathCacheStats {
        PathCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.by_node.len(),
        }
    }
}
