//! Index engine coordinator.
//!
//! The [`IndexEngine`] is the main orchestrator that ties together all
//! components:
//! - Template configuration trees (what to derive, per index)
//! - Materialized instance trees (the derived values, shared per value)
//! - Expression evaluation through the injected pure renderer
//! - Advisory named locks serializing tree mutation
//! - Path cache invalidation for browse lookups
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use index_engine::{
//!     DocumentId, DocumentSnapshot, IndexEngine, IndexEngineConfig,
//!     InMemoryDocumentProvider,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), index_engine::IndexError> {
//! let documents = Arc::new(InMemoryDocumentProvider::new());
//! documents.upsert(
//!     DocumentSnapshot::new(DocumentId(1), "report", "Report 1")
//!         .with_metadata("year", json!("2024")),
//! );
//!
//! let engine = IndexEngine::in_process(IndexEngineConfig::default(), documents);
//! let index = engine.create_index_template("By year", "by-year", ["report".into()].into())?;
//! let root = engine.get_index_template(index)?.root_node;
//! engine.add_child_template_node(root, "{{ document.metadata.year }}", true, true)?;
//!
//! let warnings = engine.document_add(DocumentId(1), index).await?;
//! assert!(warnings.is_empty());
//! # Ok(())
//! # }
//! ```

mod document_ops;
mod maintenance;
mod read_api;
mod template_api;
mod types;

pub use types::{EngineStats, IndexError, IndexingWarning, RebuildOutcome};

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::PathCache;
use crate::config::IndexEngineConfig;
use crate::document::DocumentProvider;
use crate::evaluator::{ExpressionEvaluator, PlaceholderEvaluator};
use crate::locking::{InProcessLockManager, LockManager};
use crate::storage::{InstanceStore, TemplateStore};

/// Main index engine coordinator.
///
/// # Thread Safety
///
/// The engine is `Send + Sync` and designed for concurrent access from
/// many queue workers; every public operation takes `&self`. Mutual
/// exclusion across workers comes from the [`LockManager`], not from the
/// engine's internal locks, which only protect map consistency.
pub struct IndexEngine {
    /// Configuration (interior mutability for runtime updates)
    pub(super) config: RwLock<IndexEngineConfig>,

    /// Template configuration trees
    pub(super) templates: TemplateStore,

    /// Materialized instance trees
    pub(super) instances: InstanceStore,

    /// Document snapshot source
    pub(super) documents: Arc<dyn DocumentProvider>,

    /// Pure expression renderer
    pub(super) evaluator: Arc<dyn ExpressionEvaluator>,

    /// Advisory named locks
    pub(super) locks: Arc<dyn LockManager>,

    /// Node-id/path reverse lookup cache
    pub(super) path_cache: PathCache,

    /// Lifetime counters
    pub(super) documents_indexed: AtomicU64,
    pub(super) nodes_created: AtomicU64,
    pub(super) nodes_pruned: AtomicU64,
}

impl IndexEngine {
    /// Create an engine with explicit collaborators.
    pub fn new(
        config: IndexEngineConfig,
        documents: Arc<dyn DocumentProvider>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        locks: Arc<dyn LockManager>,
    ) -> Self {
        let path_cache = PathCache::new(config.path_cache_max_entries);
        Self {
            config: RwLock::new(config),
            templates: TemplateStore::new(),
            instances: InstanceStore::new(),
            documents,
            evaluator,
            locks,
            path_cache,
            documents_indexed: AtomicU64::new(0),
            nodes_created: AtomicU64::new(0),
            nodes_pruned: AtomicU64::new(0),
        }
    }

    /// Convenience constructor: in-process locks and the placeholder
    /// evaluator. What tests and single-process hosts want.
    pub fn in_process(config: IndexEngineConfig, documents: Arc<dyn DocumentProvider>) -> Self {
        Self::new(
            config,
            documents,
            Arc::new(PlaceholderEvaluator),
            Arc::new(InProcessLockManager::new()),
        )
    }

    /// Current configuration snapshot.
    #[must_use]
    pub fn config(&self) -> IndexEngineConfig {
        self.config.read().clone()
    }

    /// Replace the configuration at runtime.
    pub fn update_config(&self, config: IndexEngineConfig) {
        *self.config.write() = config;
    }

    /// Engine counters and cache statistics.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        use std::sync::atomic::Ordering;
        EngineStats {
            index_templates: self.templates.template_count(),
            template_nodes: self.templates.node_count(),
            instance_nodes: self.instances.node_count(),
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            nodes_created: self.nodes_created.load(Ordering::Relaxed),
            nodes_pruned: self.nodes_pruned.load(Ordering::Relaxed),
            cache: self.path_cache.stats(),
        }
    }
}
