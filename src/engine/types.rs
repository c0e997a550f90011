//! Public types for the index engine.

use std::fmt;

use thiserror::Error;

use crate::document::DocumentId;
use crate::evaluator::EvaluationError;
use crate::locking::LockError;
use crate::storage::{ConfigurationError, StorageError, TemplateNodeId};

/// Engine-level operation failure.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IndexError {
    /// Lock contention is retryable; everything else is not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Lock(err) if err.is_retryable())
    }
}

/// Non-fatal diagnostic produced during a tree walk.
///
/// Warnings accumulate and are returned to the caller; they never abort
/// the remainder of a walk or a rebuild batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingWarning {
    pub document: DocumentId,
    pub template_node: TemplateNodeId,
    pub expression: String,
    pub message: String,
}

impl IndexingWarning {
    pub(crate) fn evaluation(
        document: DocumentId,
        template_node: TemplateNodeId,
        expression: &str,
        error: &EvaluationError,
    ) -> Self {
        Self {
            document,
            template_node,
            expression: expression.to_string(),
            message: format!(
                "Error indexing document: {document}; expression: {expression}; {error}"
            ),
        }
    }

    pub(crate) fn value_too_long(
        document: DocumentId,
        template_node: TemplateNodeId,
        expression: &str,
        length: usize,
        limit: usize,
    ) -> Self {
        Self {
            document,
            template_node,
            expression: expression.to_string(),
            message: format!(
                "Error indexing document: {document}; expression: {expression}; \
                 result length {length} exceeds limit {limit}"
            ),
        }
    }

    pub(crate) fn document_skipped(
        document: DocumentId,
        template_node: TemplateNodeId,
        reason: impl fmt::Display,
    ) -> Self {
        Self {
            document,
            template_node,
            expression: String::new(),
            message: format!("Document {document} skipped: {reason}"),
        }
    }
}

impl fmt::Display for IndexingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Result of a rebuild batch.
#[derive(Debug, Clone, Default)]
pub struct RebuildOutcome {
    /// Documents actually walked (eligible and present)
    pub documents_processed: usize,
    /// Documents skipped (trashed, missing, or lock-contended)
    pub documents_skipped: usize,
    /// Accumulated per-branch warnings
    pub warnings: Vec<IndexingWarning>,
}

/// Engine counters snapshot.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub index_templates: usize,
    pub template_nodes: usize,
    pub instance_nodes: usize,
    pub documents_indexed: u64,
    pub nodes_created: u64,
    pub nodes_pruned: u64,
    pub cache: crate::cache::PathCacheStats,
}
