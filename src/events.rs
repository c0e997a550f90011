//! Domain-event to index-operation mapping.
//!
//! Upstream signals ("document saved", "metadata changed", "tag changed",
//! "workflow transitioned") are translated through an explicit table into
//! the add/remove operations each matching index needs. The engine only
//! ever sees the resulting operations; the host's event bus invokes
//! [`operations_for_event`] and hands the work items to a dispatcher.
//!
//! Dispatch is assumed at-least-once; the engine's idempotent add makes
//! duplicate delivery harmless.

use async_trait::async_trait;

use crate::document::{DocumentId, DocumentTypeId};
use crate::engine::{IndexEngine, IndexError};
use crate::retry::RetryConfig;
use crate::storage::{IndexTemplate, IndexTemplateId};

/// A document lifecycle event, as seen by the indexing subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    Created(DocumentId),
    MetadataChanged(DocumentId),
    TagsChanged(DocumentId),
    WorkflowTransitioned(DocumentId),
    TypeChanged {
        document: DocumentId,
        previous: DocumentTypeId,
        current: DocumentTypeId,
    },
    Trashed(DocumentId),
    Restored(DocumentId),
    Deleted(DocumentId),
}

/// One unit of index work, dispatched through a task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexOperation {
    Add {
        document: DocumentId,
        index_template: IndexTemplateId,
    },
    Remove {
        document: DocumentId,
        index_template: IndexTemplateId,
    },
}

/// Compute the index operations a document event requires.
///
/// `templates` is the full template list; only enabled templates whose
/// filter matches produce `Add` operations. Removals target every
/// template (detaching from an index the document never joined is a
/// no-op, and the document's type may no longer be known at removal
/// time).
#[must_use]
pub fn operations_for_event(
    event: &DocumentEvent,
    document_type: &DocumentTypeId,
    templates: &[IndexTemplate],
) -> Vec<IndexOperation> {
    let adds = |document: DocumentId, doc_type: &DocumentTypeId| {
        templates
            .iter()
            .filter(|t| t.enabled && t.document_types.contains(doc_type))
            .map(|t| IndexOperation::Add {
                document,
                index_template: t.id,
            })
            .collect::<Vec<_>>()
    };
    let removes = |document: DocumentId| {
        templates
            .iter()
            .map(|t| IndexOperation::Remove {
                document,
                index_template: t.id,
            })
            .collect::<Vec<_>>()
    };

    match event {
        DocumentEvent::Created(document)
        | DocumentEvent::MetadataChanged(document)
        | DocumentEvent::TagsChanged(document)
        | DocumentEvent::WorkflowTransitioned(document)
        | DocumentEvent::Restored(document) => adds(*document, document_type),

        DocumentEvent::TypeChanged {
            document,
            previous,
            current,
        } => {
            // Leave indexes that only matched the old type, join the new ones
            let mut operations: Vec<IndexOperation> = templates
                .iter()
                .filter(|t| {
                    t.document_types.contains(previous) && !t.document_types.contains(current)
                })
                .map(|t| IndexOperation::Remove {
                    document: *document,
                    index_template: t.id,
                })
                .collect();
            operations.extend(adds(*document, current));
            operations
        }

        DocumentEvent::Trashed(document) | DocumentEvent::Deleted(document) => {
            removes(*document)
        }
    }
}

/// Hands index operations to an at-least-once work queue.
#[async_trait]
pub trait OperationDispatcher: Send + Sync {
    async fn enqueue(&self, operation: IndexOperation) -> Result<(), IndexError>;
}

/// Dispatcher that executes operations inline against an engine,
/// retrying lock contention with backoff. Suitable for tests and
/// embedded hosts without a real queue.
pub struct InlineDispatcher {
    engine: std::sync::Arc<IndexEngine>,
    retry: RetryConfig,
}

impl InlineDispatcher {
    #[must_use]
    pub fn new(engine: std::sync::Arc<IndexEngine>) -> Self {
        let retry = engine.config().lock_retry();
        Self { engine, retry }
    }
}

#[async_trait]
impl OperationDispatcher for InlineDispatcher {
    async fn enqueue(&self, operation: IndexOperation) -> Result<(), IndexError> {
        let mut delay = self.retry.initial_delay;
        let mut attempt = 0usize;
        loop {
            let result = match operation {
                IndexOperation::Add {
                    document,
                    index_template,
                } => self
                    .engine
                    .document_add(document, index_template)
                    .await
                    .map(|_warnings| ()),
                IndexOperation::Remove {
                    document,
                    index_template,
                } => self.engine.document_remove(document, index_template).await,
            };

            match result {
                Ok(()) => return Ok(()),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    attempt += 1;
                    if let Some(max) = self.retry.max_retries {
                        if attempt > max {
                            return Err(err);
                        }
                    }
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(self.retry.factor).min(self.retry.max_delay);
                }
            }
        }
    }
}
