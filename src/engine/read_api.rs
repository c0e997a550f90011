//! Tree read operations: browse children, descendants, paths, counts.
//!
//! Reads take no locks; they see whatever the last committed mutation
//! left behind. Full paths are cached bidirectionally and invalidated by
//! every mutation, so a cached hit is always current.

use super::IndexEngine;
use crate::document::DocumentId;
use crate::storage::{IndexTemplateId, InstanceNode, InstanceNodeId};

impl IndexEngine {
    /// The per-index root instance node, if materialized.
    #[must_use]
    pub fn index_root(&self, index_template: IndexTemplateId) -> Option<InstanceNodeId> {
        self.instances.root_of(index_template)
    }

    #[must_use]
    pub fn get_instance_node(&self, id: InstanceNodeId) -> Option<InstanceNode> {
        self.instances.get(id)
    }

    /// Children of an instance node, ordered by value. Empty for unknown
    /// nodes.
    #[must_use]
    pub fn get_children(&self, id: InstanceNodeId) -> Vec<InstanceNode> {
        self.instances.children_of(id)
    }

    /// All descendants of an instance node, self excluded.
    #[must_use]
    pub fn get_descendants(&self, id: InstanceNodeId) -> Vec<InstanceNode> {
        self.instances.descendants_of(id)
    }

    /// Total number of value nodes below this one.
    #[must_use]
    pub fn get_descendants_count(&self, id: InstanceNodeId) -> usize {
        self.instances.descendants_of(id).len()
    }

    /// Documents attached at an instance node, in id order.
    #[must_use]
    pub fn get_documents(&self, id: InstanceNodeId) -> Vec<DocumentId> {
        self.instances.documents_of(id)
    }

    /// Unique documents attached anywhere at or below a node.
    #[must_use]
    pub fn get_descendants_document_count(&self, id: InstanceNodeId) -> usize {
        let mut documents: Vec<DocumentId> = self.instances.documents_of(id);
        for descendant in self.instances.descendants_of(id) {
            documents.extend(descendant.documents.iter().copied());
        }
        documents.sort();
        documents.dedup();
        documents.len()
    }

    /// Number of distinct levels below a node.
    #[must_use]
    pub fn get_level_count(&self, id: InstanceNodeId) -> usize {
        let base_depth = self.instances.ancestors_of(id).len();
        self.instances
            .descendants_of(id)
            .iter()
            .map(|node| self.instances.ancestors_of(node.id).len() - base_depth)
            .max()
            .unwrap_or(0)
    }

    /// Full path of an instance node: ancestor chain joined by the
    /// configured separator, root rendered as the index's own label.
    #[must_use]
    pub fn get_full_path(&self, id: InstanceNodeId) -> Option<String> {
        if let Some(cached) = self.path_cache.get(id) {
            return Some(cached);
        }

        let chain = self.instances.ancestors_of(id);
        let root = chain.first()?;
        let label = self.templates.get_template(root.index_template)?.label;

        let separator = self.config.read().path_separator.clone();
        let segments: Vec<&str> = std::iter::once(label.as_str())
            .chain(chain.iter().skip(1).map(|node| node.value.as_str()))
            .collect();
        let path = segments.join(&separator);

        self.path_cache.insert(id, path.clone());
        Some(path)
    }

    /// Reverse lookup: the instance node at a full path, if any.
    ///
    /// Uncached lookups split the path on the configured separator, so a
    /// node whose value itself contains the separator is not addressable
    /// by descent (its rendered path is ambiguous); only an exact cached
    /// path still resolves. Such nodes stay reachable through
    /// [`Self::get_children`].
    #[must_use]
    pub fn find_by_path(&self, index_template: IndexTemplateId, path: &str) -> Option<InstanceNodeId> {
        if let Some(cached) = self.path_cache.lookup_path(path) {
            return Some(cached);
        }

        let separator = self.config.read().path_separator.clone();
        let mut segments = path.split(separator.as_str());

        let label = self.templates.get_template(index_template)?.label;
        if segments.next()? != label {
            return None;
        }

        let mut current = self.instances.root_of(index_template)?;
        for segment in segments {
            current = self
                .instances
                .children_of(current)
                .into_iter()
                .find(|child| child.value == segment)?
                .id;
        }

        if let Some(full) = self.path_cache.get(current) {
            debug_assert_eq!(full, path);
        } else {
            self.path_cache.insert(current, path.to_string());
        }
        Some(current)
    }

    /// All instance nodes of one index (unspecified order). Diagnostic
    /// and verification use.
    #[must_use]
    pub fn instance_nodes(&self, index_template: IndexTemplateId) -> Vec<InstanceNode> {
        self.instances.nodes_for_index(index_template)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::IndexEngineConfig;
    use crate::document::{DocumentId, DocumentSnapshot, InMemoryDocumentProvider};
    use crate::engine::IndexEngine;
    use serde_json::json;
    use std::sync::Arc;

    async fn two_level_engine() -> (IndexEngine, crate::storage::IndexTemplateId) {
        let documents = Arc::new(InMemoryDocumentProvider::new());
        documents.upsert(
            DocumentSnapshot::new(DocumentId(1), "report", "Report 1")
                .with_metadata("year", json!("2023"))
                .with_metadata("quarter", json!("Q1")),
        );
        let engine = IndexEngine::in_process(IndexEngineConfig::default(), documents);
        let index = engine
            .create_index_template("Archive", "archive", ["report".into()].into())
            .unwrap();
        let root = engine.get_index_template(index).unwrap().root_node;
        let year = engine
            .add_child_template_node(root, "{{ document.metadata.year }}", false, true)
            .unwrap();
        engine
            .add_child_template_node(year, "{{ document.metadata.quarter }}", true, true)
            .unwrap();
        engine.document_add(DocumentId(1), index).await.unwrap();
        (engine, index)
    }

    #[tokio::test]
    async fn test_full_path_renders_label_and_values() {
        let (engine, index) = two_level_engine().await;
        let root = engine.index_root(index).unwrap();
        let year = &engine.get_children(root)[0];
        let quarter = &engine.get_children(year.id)[0];

        assert_eq!(
            engine.get_full_path(quarter.id).as_deref(),
            Some("Archive / 2023 / Q1")
        );
        // Second call hits the cache
        assert_eq!(
            engine.get_full_path(quarter.id).as_deref(),
            Some("Archive / 2023 / Q1")
        );
        assert!(engine.stats().cache.hits >= 1);
    }

    #[tokio::test]
    async fn test_find_by_path_descends_values() {
        let (engine, index) = two_level_engine().await;
        let root = engine.index_root(index).unwrap();
        let year = &engine.get_children(root)[0];
        let quarter = &engine.get_children(year.id)[0];

        assert_eq!(
            engine.find_by_path(index, "Archive / 2023 / Q1"),
            Some(quarter.id)
        );
        assert_eq!(engine.find_by_path(index, "Archive / 2023"), Some(year.id));
        assert_eq!(engine.find_by_path(index, "Archive / 2024"), None);
        assert_eq!(engine.find_by_path(index, "Wrong / 2023"), None);
    }

    #[tokio::test]
    async fn test_separator_in_value_renders_but_is_not_addressable() {
        let documents = Arc::new(InMemoryDocumentProvider::new());
        documents.upsert(
            DocumentSnapshot::new(DocumentId(1), "report", "A / B")
                .with_metadata("year", json!("2023")),
        );
        let engine = IndexEngine::in_process(IndexEngineConfig::default(), documents);
        let index = engine
            .create_index_template("Labels", "labels", ["report".into()].into())
            .unwrap();
        let root = engine.get_index_template(index).unwrap().root_node;
        engine
            .add_child_template_node(root, "{{ document.label }}", true, true)
            .unwrap();
        engine.document_add(DocumentId(1), index).await.unwrap();

        let instance_root = engine.index_root(index).unwrap();
        let node = &engine.get_children(instance_root)[0];
        assert_eq!(node.value, "A / B");

        // The rendered path is ambiguous, so descent-based lookup
        // declines
        assert_eq!(engine.find_by_path(index, "Labels / A / B"), None);

        // Rendering caches the exact path, which then resolves
        assert_eq!(
            engine.get_full_path(node.id).as_deref(),
            Some("Labels / A / B")
        );
        assert_eq!(
            engine.find_by_path(index, "Labels / A / B"),
            Some(node.id)
        );
    }

    #[tokio::test]
    async fn test_counts() {
        let (engine, index) = two_level_engine().await;
        let root = engine.index_root(index).unwrap();

        assert_eq!(engine.get_descendants_count(root), 2);
        assert_eq!(engine.get_descendants_document_count(root), 1);
        assert_eq!(engine.get_level_count(root), 2);
    }
}
