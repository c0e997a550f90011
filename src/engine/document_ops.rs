// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Incremental per-document materialization.
//!
//! `document_add` is add-then-selective-remove: the walk get-or-creates
//! the nodes the document's current values lead to, collects them in an
//! accepted set, and afterwards detaches the document from every node of
//! the index *not* in that set. Concurrent readers never observe the
//! document fully detached mid-update.
//!
//! Locking: index lock first, then document lock, both held for the whole
//! call and released on drop. Lock contention surfaces as a retryable
//! error for the dispatcher to requeue.

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use tracing::{debug, instrument};

use super::{IndexEngine, IndexError, IndexingWarning};
use crate::document::{DocumentId, DocumentSnapshot};
use crate::locking::{document_lock_name, index_lock_name};
use crate::metrics;
use crate::storage::{IndexTemplate, InstanceNodeId, TemplateNodeId};

impl IndexEngine {
    /// Materialize one document into one index.
    ///
    /// No-op success when the document is missing or trashed, the index
    /// is unknown or disabled, or the document's type is not in the
    /// index's filter. Eligibility is re-validated against a snapshot
    /// fetched *after* both locks are held.
    ///
    /// Returns the per-branch warnings (evaluation failures, over-long
    /// values); re-running with unchanged attributes is idempotent.
    #[instrument(skip(self), fields(document = %document, index = %index_template))]
    pub async fn document_add(
        &self,
        document: DocumentId,
        index_template: crate::storage::IndexTemplateId,
    ) -> Result<Vec<IndexingWarning>, IndexError> {
        let _timer = metrics::LatencyTimer::new("document_add");

        if self.templates.get_template(index_template).is_none() {
            metrics::record_operation("document_add", "noop");
            return Ok(Vec::new());
        }

        let _index_guard = match self.locks.acquire(&index_lock_name(index_template)).await {
            Ok(guard) => guard,
            Err(err) => {
                metrics::record_lock_contention("index");
                return Err(err.into());
            }
        };
        let _document_guard = match self.locks.acquire(&document_lock_name(document)).await {
            Ok(guard) => guard,
            Err(err) => {
                metrics::record_lock_contention("document");
                return Err(err.into());
            }
        };

        // Fresh snapshot and template state, read under the locks
        let Some(snapshot) = self.documents.get(document).await? else {
            metrics::record_operation("document_add", "noop");
            return Ok(Vec::new());
        };
        let Some(template) = self.templates.get_template(index_template) else {
            metrics::record_operation("document_add", "noop");
            return Ok(Vec::new());
        };
        if !Self::eligible(&template, &snapshot) {
            debug!("Document not eligible, skipping");
            metrics::record_operation("document_add", "noop");
            return Ok(Vec::new());
        }

        let warnings = self.add_locked(&template, &snapshot);
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        metrics::record_operation("document_add", "success");
        Ok(warnings)
    }

    /// Fully detach a document from an index and prune what empties.
    ///
    /// Unlike add, removal does not gate on eligibility: the goal state
    /// is "not attached", which also covers trashed documents and
    /// documents whose type no longer matches. Unknown index or
    /// already-detached document is a no-op success.
    #[instrument(skip(self), fields(document = %document, index = %index_template))]
    pub async fn document_remove(
        &self,
        document: DocumentId,
        index_template: crate::storage::IndexTemplateId,
    ) -> Result<(), IndexError> {
        let _timer = metrics::LatencyTimer::new("document_remove");

        if self.templates.get_template(index_template).is_none() {
            metrics::record_operation("document_remove", "noop");
            return Ok(());
        }

        let _index_guard = self.locks.acquire(&index_lock_name(index_template)).await?;
        let _document_guard = self.locks.acquire(&document_lock_name(document)).await?;

        self.remove_locked(index_template, document, &HashSet::new());
        metrics::record_operation("document_remove", "success");
        Ok(())
    }

    /// Eligibility: valid document, enabled index, matching type.
    pub(super) fn eligible(template: &IndexTemplate, snapshot: &DocumentSnapshot) -> bool {
        snapshot.is_valid()
            && template.enabled
            && template.document_types.contains(&snapshot.document_type)
    }

    /// One document's full walk plus selective removal. Both locks must
    /// be held by the caller.
    pub(super) fn add_locked(
        &self,
        template: &IndexTemplate,
        snapshot: &DocumentSnapshot,
    ) -> Vec<IndexingWarning> {
        let root = self
            .instances
            .initialize_root(template.id, template.root_node);

        let mut accepted = HashSet::new();
        let mut warnings = Vec::new();
        self.walk(template, snapshot, template.root_node, root, &mut accepted, &mut warnings);

        debug!(accepted = accepted.len(), warnings = warnings.len(), "Walk complete");
        self.remove_locked(template.id, snapshot.id, &accepted);

        for warning in &warnings {
            metrics::record_warning();
            debug!(%warning, "Indexing warning");
        }
        warnings
    }

    /// Recursive top-down walk of one template level.
    fn walk(
        &self,
        template: &IndexTemplate,
        snapshot: &DocumentSnapshot,
        template_node: TemplateNodeId,
        parent_instance: InstanceNodeId,
        accepted: &mut HashSet<InstanceNodeId>,
        warnings: &mut Vec<IndexingWarning>,
    ) {
        let max_value_length = self.config.read().max_value_length;

        for child in self.templates.children_of(template_node) {
            if !child.enabled {
                continue;
            }
            let value = match self.evaluator.render(&child.expression, snapshot) {
                Ok(value) => value,
                Err(error) => {
                    warnings.push(IndexingWarning::evaluation(
                        snapshot.id,
                        child.id,
                        &child.expression,
                        &error,
                    ));
                    continue; // branch skipped, no descent
                }
            };
            debug!(node = %child.id, %value, "Evaluation result");

            // An empty result skips the whole subtree for this document:
            // indexing never skips a level
            if value.is_empty() {
                continue;
            }
            if value.len() > max_value_length {
                warnings.push(IndexingWarning::value_too_long(
                    snapshot.id,
                    child.id,
                    &child.expression,
                    value.len(),
                    max_value_length,
                ));
                continue;
            }

            let (instance, created) =
                self.instances
                    .get_or_create(child.id, template.id, parent_instance, &value);
            accepted.insert(instance);
            if created {
                self.nodes_created.fetch_add(1, Ordering::Relaxed);
                metrics::record_nodes_created(1);
                self.path_cache.invalidate(instance);
            }
            if child.link_documents {
                self.instances.attach(instance, snapshot.id);
                self.path_cache.invalidate(instance);
            }

            self.walk(template, snapshot, child.id, instance, accepted, warnings);
        }
    }

    /// Detach a document from every node of the index except `excluded`,
    /// pruning each touched node bottom-up. Index lock must be held.
    pub(super) fn remove_locked(
        &self,
        index_template: crate::storage::IndexTemplateId,
        document: DocumentId,
        excluded: &HashSet<InstanceNodeId>,
    ) {
        let holding = self.instances.nodes_with_document(index_template, document);
        let mut touched = Vec::new();
        for node in holding {
            if excluded.contains(&node) {
                continue;
            }
            if self.instances.detach(node, document) {
                touched.push(node);
            }
        }

        let mut pruned = Vec::new();
        for node in &touched {
            pruned.extend(self.instances.prune_upwards(*node));
        }
        if !pruned.is_empty() {
            self.nodes_pruned
                .fetch_add(pruned.len() as u64, Ordering::Relaxed);
            metrics::record_nodes_pruned(pruned.len());
        }
        self.path_cache
            .invalidate_many(touched.iter().chain(&pruned));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexEngineConfig;
    use crate::document::InMemoryDocumentProvider;
    use std::sync::Arc;
    use serde_json::json;

    async fn engine_with_year_index() -> (
        IndexEngine,
        Arc<InMemoryDocumentProvider>,
        crate::storage::IndexTemplateId,
    ) {
        let documents = Arc::new(InMemoryDocumentProvider::new());
        let engine = IndexEngine::in_process(IndexEngineConfig::default(), documents.clone());
        let index = engine
            .create_index_template("By year", "by-year", ["report".into()].into())
            .unwrap();
        let root = engine.get_index_template(index).unwrap().root_node;
        engine
            .add_child_template_node(root, "{{ document.metadata.year }}", true, true)
            .unwrap();
        (engine, documents, index)
    }

    fn report(id: u64, year: &str) -> DocumentSnapshot {
        DocumentSnapshot::new(DocumentId(id), "report", format!("Report {id}"))
            .with_metadata("year", json!(year))
    }

    #[tokio::test]
    async fn test_add_attaches_under_value_node() {
        let (engine, documents, index) = engine_with_year_index().await;
        documents.upsert(report(1, "2023"));

        let warnings = engine.document_add(DocumentId(1), index).await.unwrap();
        assert!(warnings.is_empty());

        let root = engine.index_root(index).unwrap();
        let children = engine.get_children(root);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].value, "2023");
        assert_eq!(engine.get_documents(children[0].id), vec![DocumentId(1)]);
    }

    #[tokio::test]
    async fn test_add_missing_document_is_noop() {
        let (engine, _documents, index) = engine_with_year_index().await;
        let warnings = engine.document_add(DocumentId(404), index).await.unwrap();
        assert!(warnings.is_empty());

        let root = engine.index_root(index).unwrap();
        assert!(engine.get_children(root).is_empty());
    }

    #[tokio::test]
    async fn test_add_unknown_index_is_noop() {
        let (engine, documents, _index) = engine_with_year_index().await;
        documents.upsert(report(1, "2023"));
        let warnings = engine
            .document_add(DocumentId(1), crate::storage::IndexTemplateId(99))
            .await
            .unwrap();
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_add_trashed_document_is_noop() {
        let (engine, documents, index) = engine_with_year_index().await;
        documents.upsert(report(1, "2023"));
        documents.trash(DocumentId(1));

        engine.document_add(DocumentId(1), index).await.unwrap();
        let root = engine.index_root(index).unwrap();
        assert!(engine.get_children(root).is_empty());
    }

    #[tokio::test]
    async fn test_evaluation_failure_becomes_warning() {
        let (engine, documents, index) = engine_with_year_index().await;
        // No year metadata: attribute path resolves to nothing
        documents.upsert(DocumentSnapshot::new(DocumentId(1), "report", "Report 1"));

        let warnings = engine.document_add(DocumentId(1), index).await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("metadata.year"));

        let root = engine.index_root(index).unwrap();
        assert!(engine.get_children(root).is_empty());
    }

    #[tokio::test]
    async fn test_over_long_value_skips_branch() {
        let (engine, documents, index) = engine_with_year_index().await;
        documents.upsert(report(1, &"x".repeat(200)));

        let warnings = engine.document_add(DocumentId(1), index).await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("exceeds limit"));

        let root = engine.index_root(index).unwrap();
        assert!(engine.get_children(root).is_empty());
    }

    #[tokio::test]
    async fn test_remove_detaches_and_prunes() {
        let (engine, documents, index) = engine_with_year_index().await;
        documents.upsert(report(1, "2023"));
        engine.document_add(DocumentId(1), index).await.unwrap();

        engine.document_remove(DocumentId(1), index).await.unwrap();
        let root = engine.index_root(index).unwrap();
        assert!(engine.get_children(root).is_empty());
        // Root survives
        assert!(engine.get_instance_node(root).is_some());
    }

    #[tokio::test]
    async fn test_remove_is_noop_when_not_attached() {
        let (engine, _documents, index) = engine_with_year_index().await;
        engine.document_remove(DocumentId(1), index).await.unwrap();
        engine
            .document_remove(DocumentId(1), crate::storage::IndexTemplateId(99))
            .await
            .unwrap();
    }
}
