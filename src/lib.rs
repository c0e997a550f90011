//! # Index Engine
//!
//! An incrementally-maintained document index materialization engine.
//!
//! Each index is defined declaratively as a tree of template nodes, where
//! every node holds an expression. Evaluating an expression against a
//! document yields a string value; documents sharing a value at the same
//! tree position are grouped under one instance node. The result is a
//! materialized N-ary tree kept in sync with an evolving document
//! collection through per-document "affects-one-path" updates.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Template Tree (config)                  │
//! │  • One IndexTemplate per index: label, slug, type filter    │
//! │  • TemplateNodes hold expressions + link_documents flags    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!             (evaluate expressions per document)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        IndexEngine                          │
//! │  • document_add: walk, get-or-create, selective detach     │
//! │  • document_remove: detach everywhere, prune bottom-up     │
//! │  • rebuild / reset / delete_empty_nodes                     │
//! │  • index-level + document-level advisory locks              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Instance Tree (materialized)               │
//! │  • One InstanceNode per (template_node, parent, value)     │
//! │  • Documents attach at link_documents levels                │
//! │  • Empty nodes pruned bottom-up, roots never deleted        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use index_engine::{
//!     DocumentId, DocumentSnapshot, IndexEngine, IndexEngineConfig,
//!     InMemoryDocumentProvider,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), index_engine::IndexError> {
//!     let documents = Arc::new(InMemoryDocumentProvider::new());
//!     documents.upsert(
//!         DocumentSnapshot::new(DocumentId(1), "report", "Report 1")
//!             .with_metadata("year", json!("2024")),
//!     );
//!
//!     let engine = IndexEngine::in_process(IndexEngineConfig::default(), documents);
//!
//!     let index = engine.create_index_template(
//!         "By year", "by-year", ["report".into()].into(),
//!     )?;
//!     let root = engine.get_index_template(index)?.root_node;
//!     engine.add_child_template_node(
//!         root, "{{ document.metadata.year }}", true, true,
//!     )?;
//!
//!     engine.document_add(DocumentId(1), index).await?;
//!
//!     let instance_root = engine.index_root(index).unwrap();
//!     for child in engine.get_children(instance_root) {
//!         println!("{}", engine.get_full_path(child.id).unwrap());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Collaborator seams
//!
//! The engine is a library, not a service. Hosts plug in:
//! - [`DocumentProvider`] - fresh document snapshots
//! - [`ExpressionEvaluator`] - any Turing-incomplete template renderer
//! - [`LockManager`] - named advisory locks (in-process, database, or
//!   distributed)
//! - [`OperationDispatcher`] - the at-least-once work queue fed by
//!   [`operations_for_event`]

pub mod cache;
pub mod config;
pub mod document;
pub mod engine;
pub mod evaluator;
pub mod events;
pub mod locking;
pub mod metrics;
pub mod retry;
pub mod storage;

// Re-export main public API at crate root

pub use cache::{PathCache, PathCacheStats};
pub use config::IndexEngineConfig;
pub use document::{
    DocumentId, DocumentProvider, DocumentSnapshot, DocumentTypeId, InMemoryDocumentProvider,
};
pub use engine::{EngineStats, IndexEngine, IndexError, IndexingWarning, RebuildOutcome};
pub use evaluator::{EvaluationError, ExpressionEvaluator, PlaceholderEvaluator};
pub use events::{
    operations_for_event, DocumentEvent, IndexOperation, InlineDispatcher, OperationDispatcher,
};
pub use locking::{
    document_lock_name, index_lock_name, InProcessLockManager, LockError, LockGuard, LockManager,
};
pub use metrics::LatencyTimer;
pub use retry::{acquire_with_retry, RetryConfig};
pub use storage::{
    ConfigurationError, IndexTemplate, IndexTemplateId, InstanceNode, InstanceNodeId,
    StorageError, TemplateNode, TemplateNodeId,
};
