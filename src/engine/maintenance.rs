// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bulk maintenance: rebuild, reset, empty-node sweep.
//!
//! A rebuild holds the index lock for its whole duration and takes the
//! per-document lock inside the loop; per-document failures (snapshot
//! gone, document lock contended) skip that document and never abort the
//! batch. No cross-document ordering is guaranteed.

use tracing::{info, instrument, warn};

use super::{IndexEngine, IndexError, IndexingWarning, RebuildOutcome};
use crate::locking::{document_lock_name, index_lock_name};
use crate::metrics;
use crate::storage::{ConfigurationError, IndexTemplateId};

impl IndexEngine {
    /// Discard and fully regenerate one index's instance tree from the
    /// current document set. No-op for disabled indexes.
    #[instrument(skip(self), fields(index = %index_template))]
    pub async fn rebuild(
        &self,
        index_template: IndexTemplateId,
    ) -> Result<RebuildOutcome, IndexError> {
        let _timer = metrics::LatencyTimer::new("rebuild");
        let template = self
            .templates
            .get_template(index_template)
            .ok_or(ConfigurationError::TemplateNotFound(index_template))?;
        if !template.enabled {
            metrics::record_operation("rebuild", "noop");
            return Ok(RebuildOutcome::default());
        }

        let _index_guard = self.locks.acquire(&index_lock_name(index_template)).await?;

        let cleared = self.instances.clear_index(index_template);
        self.path_cache.invalidate_many(&cleared);
        self.instances
            .initialize_root(index_template, template.root_node);

        let document_ids = self.documents.ids_for_types(&template.document_types).await?;
        info!(documents = document_ids.len(), "Rebuilding index");

        let mut outcome = RebuildOutcome::default();
        for document in document_ids {
            let _document_guard = match self.locks.acquire(&document_lock_name(document)).await {
                Ok(guard) => guard,
                Err(err) => {
                    // Abandons this document only, not the batch
                    warn!(%document, error = %err, "Skipping contended document");
                    metrics::record_lock_contention("document");
                    outcome.documents_skipped += 1;
                    outcome.warnings.push(IndexingWarning::document_skipped(
                        document,
                        template.root_node,
                        err,
                    ));
                    continue;
                }
            };
            let Some(snapshot) = self.documents.get(document).await? else {
                outcome.documents_skipped += 1;
                continue;
            };
            if !Self::eligible(&template, &snapshot) {
                outcome.documents_skipped += 1;
                continue;
            }
            outcome.warnings.extend(self.add_locked(&template, &snapshot));
            outcome.documents_processed += 1;
        }

        metrics::record_operation("rebuild", "success");
        info!(
            processed = outcome.documents_processed,
            skipped = outcome.documents_skipped,
            warnings = outcome.warnings.len(),
            "Rebuild complete"
        );
        Ok(outcome)
    }

    /// Clear one index's instance tree to an empty root without
    /// re-populating. The cheap "clear without immediate cost" path.
    #[instrument(skip(self), fields(index = %index_template))]
    pub async fn reset(&self, index_template: IndexTemplateId) -> Result<(), IndexError> {
        let _timer = metrics::LatencyTimer::new("reset");
        let template = self
            .templates
            .get_template(index_template)
            .ok_or(ConfigurationError::TemplateNotFound(index_template))?;

        let _index_guard = self.locks.acquire(&index_lock_name(index_template)).await?;
        let cleared = self.instances.clear_index(index_template);
        self.path_cache.invalidate_many(&cleared);
        self.instances
            .initialize_root(index_template, template.root_node);

        metrics::record_operation("reset", "success");
        info!(cleared = cleared.len(), "Index reset");
        Ok(())
    }

    /// Global sweep deleting every empty non-root node of one index.
    /// The per-document incremental path prunes as it goes; this is for
    /// bulk/maintenance paths.
    #[instrument(skip(self), fields(index = %index_template))]
    pub async fn delete_empty_nodes(
        &self,
        index_template: IndexTemplateId,
    ) -> Result<(), IndexError> {
        let _timer = metrics::LatencyTimer::new("delete_empty_nodes");
        if self.templates.get_template(index_template).is_none() {
            return Err(ConfigurationError::TemplateNotFound(index_template).into());
        }

        let _index_guard = self.locks.acquire(&index_lock_name(index_template)).await?;
        let deleted = self.instances.sweep_empty(index_template);
        self.path_cache.invalidate_many(&deleted);
        if !deleted.is_empty() {
            self.nodes_pruned
                .fetch_add(deleted.len() as u64, std::sync::atomic::Ordering::Relaxed);
            metrics::record_nodes_pruned(deleted.len());
        }

        metrics::record_operation("delete_empty_nodes", "success");
        info!(deleted = deleted.len(), "Empty-node sweep complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::IndexEngineConfig;
    use crate::document::{DocumentId, DocumentSnapshot, InMemoryDocumentProvider};
    use crate::engine::IndexEngine;
    use crate::storage::ConfigurationError;
    use serde_json::json;
    use std::sync::Arc;

    fn report(id: u64, year: &str) -> DocumentSnapshot {
        DocumentSnapshot::new(DocumentId(id), "report", format!("Report {id}"))
            .with_metadata("year", json!(year))
    }

    fn engine() -> (IndexEngine, Arc<InMemoryDocumentProvider>) {
        let documents = Arc::new(InMemoryDocumentProvider::new());
        let engine = IndexEngine::in_process(IndexEngineConfig::default(), documents.clone());
        (engine, documents)
    }

    #[tokio::test]
    async fn test_rebuild_unknown_index_is_configuration_error() {
        let (engine, _documents) = engine();
        let err = engine
            .rebuild(crate::storage::IndexTemplateId(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::engine::IndexError::Configuration(ConfigurationError::TemplateNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rebuild_populates_from_provider() {
        let (engine, documents) = engine();
        let index = engine
            .create_index_template("By year", "by-year", ["report".into()].into())
            .unwrap();
        let root = engine.get_index_template(index).unwrap().root_node;
        engine
            .add_child_template_node(root, "{{ document.metadata.year }}", true, true)
            .unwrap();

        documents.upsert(report(1, "2023"));
        documents.upsert(report(2, "2023"));
        documents.upsert(report(3, "2024"));

        let outcome = engine.rebuild(index).await.unwrap();
        assert_eq!(outcome.documents_processed, 3);
        assert_eq!(outcome.documents_skipped, 0);

        let instance_root = engine.index_root(index).unwrap();
        let values: Vec<String> = engine
            .get_children(instance_root)
            .iter()
            .map(|n| n.value.clone())
            .collect();
        assert_eq!(values, vec!["2023", "2024"]);
    }

    #[tokio::test]
    async fn test_rebuild_disabled_index_is_noop() {
        let (engine, documents) = engine();
        let index = engine
            .create_index_template("By year", "by-year", ["report".into()].into())
            .unwrap();
        documents.upsert(report(1, "2023"));
        engine.set_template_enabled(index, false).unwrap();

        let outcome = engine.rebuild(index).await.unwrap();
        assert_eq!(outcome.documents_processed, 0);
    }

    #[tokio::test]
    async fn test_reset_leaves_empty_root() {
        let (engine, documents) = engine();
        let index = engine
            .create_index_template("By year", "by-year", ["report".into()].into())
            .unwrap();
        let root = engine.get_index_template(index).unwrap().root_node;
        engine
            .add_child_template_node(root, "{{ document.metadata.year }}", true, true)
            .unwrap();
        documents.upsert(report(1, "2023"));
        engine.document_add(DocumentId(1), index).await.unwrap();

        engine.reset(index).await.unwrap();
        let instance_root = engine.index_root(index).unwrap();
        assert!(engine.get_children(instance_root).is_empty());
    }
}
