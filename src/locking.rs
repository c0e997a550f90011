// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Advisory named locks.
//!
//! All mutation of one index's instance tree happens under that index's
//! lock; concurrent add/remove for the same document additionally holds
//! the document's lock. Acquisition order is always index first, then
//! document, so the two scopes can never deadlock against each other.
//!
//! The [`LockManager`] trait keeps the backend swappable (in-process map,
//! database row locks, a distributed mutex service); correctness depends
//! only on mutual exclusion semantics. [`LockError::Held`] is a retryable
//! condition, not a failure: queue-style callers requeue with backoff
//! (see [`crate::retry`]).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::document::DocumentId;
use crate::storage::IndexTemplateId;

#[derive(Error, Debug)]
pub enum LockError {
    /// The lock is currently held elsewhere. Retryable.
    #[error("lock '{0}' is held elsewhere")]
    Held(String),
    /// Backend failure (connection loss, etc.). Not retryable here.
    #[error("lock backend error: {0}")]
    Backend(String),
}

impl LockError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Held(_))
    }
}

/// Lock name for one index's instance tree.
#[must_use]
pub fn index_lock_name(index_template: IndexTemplateId) -> String {
    format!("indexing:index_instance_{index_template}")
}

/// Lock name for one document's index membership.
#[must_use]
pub fn document_lock_name(document: DocumentId) -> String {
    format!("indexing:document_{document}")
}

/// A held lock. Released on drop, unconditionally - including on error
/// paths that unwind out of a tree walk.
pub struct LockGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LockGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Release explicitly. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").finish_non_exhaustive()
    }
}

/// Named mutual-exclusion lock backend.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Try to acquire the named lock. Fails fast with [`LockError::Held`]
    /// when unavailable; never blocks waiting for the holder.
    async fn acquire(&self, name: &str) -> Result<LockGuard, LockError>;
}

/// In-process lock manager backed by a concurrent set of held names.
///
/// Suitable for single-process deployments and tests. Multi-process
/// deployments need a shared backend behind the same trait.
#[derive(Default)]
pub struct InProcessLockManager {
    held: Arc<DashMap<String, ()>>,
}

impl InProcessLockManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            held: Arc::new(DashMap::new()),
        }
    }

    /// Number of locks currently held (diagnostics).
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}

#[async_trait]
impl LockManager for InProcessLockManager {
    async fn acquire(&self, name: &str) -> Result<LockGuard, LockError> {
        match self.held.entry(name.to_string()) {
            Entry::Occupied(_) => Err(LockError::Held(name.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(());
                let held = Arc::clone(&self.held);
                let name = name.to_string();
                Ok(LockGuard::new(move || {
                    held.remove(&name);
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_names() {
        assert_eq!(
            index_lock_name(IndexTemplateId(3)),
            "indexing:index_instance_3"
        );
        assert_eq!(document_lock_name(DocumentId(17)), "indexing:document_17");
    }

    #[tokio::test]
    async fn test_acquire_and_conflict() {
        let manager = InProcessLockManager::new();
        let guard = manager.acquire("a").await.unwrap();

        let err = manager.acquire("a").await.unwrap_err();
        assert!(err.is_retryable());

        // Different name is independent
        let _other = manager.acquire("b").await.unwrap();
        assert_eq!(manager.held_count(), 2);
        drop(guard);
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let manager = InProcessLockManager::new();
        {
            let _guard = manager.acquire("a").await.unwrap();
            assert_eq!(manager.held_count(), 1);
        }
        assert_eq!(manager.held_count(), 0);
        // Reacquirable after drop
        let _guard = manager.acquire("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_explicit_release() {
        let manager = InProcessLockManager::new();
        let guard = manager.acquire("a").await.unwrap();
        guard.release();
        assert_eq!(manager.held_count(), 0);
    }
}
