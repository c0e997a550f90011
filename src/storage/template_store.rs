// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Index template configuration tree.
//!
//! An [`IndexTemplate`] is the declarative definition of one index: a
//! label, a slug, an enabled flag, a document-type filter and a tree of
//! [`TemplateNode`]s rooted at one implicit root node. Creating a
//! template creates its root node atomically; deleting a non-root node
//! cascades to its descendants.

use std::collections::{HashMap, HashSet};
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::DocumentTypeId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct IndexTemplateId(pub u64);

impl fmt::Display for IndexTemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TemplateNodeId(pub u64);

impl fmt::Display for TemplateNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declarative definition of one index.
#[derive(Debug, Clone)]
pub struct IndexTemplate {
    pub id: IndexTemplateId,
    /// Unique display name
    pub label: String,
    /// Unique stable key used for external addressing
    pub slug: String,
    /// Disabled templates keep their (stale) instance tree but stop
    /// materializing until rebuilt
    pub enabled: bool,
    /// Document types this index applies to
    pub document_types: HashSet<DocumentTypeId>,
    /// Root of the template tree, created with the template
    pub root_node: TemplateNodeId,
}

/// One level of a template tree.
#[derive(Debug, Clone)]
pub struct TemplateNode {
    pub id: TemplateNodeId,
    /// `None` only for the root
    pub parent: Option<TemplateNodeId>,
    pub index_template: IndexTemplateId,
    /// Rendering expression; unused on the root node
    pub expression: String,
    pub enabled: bool,
    /// Whether matching documents attach to the resulting instance node,
    /// as opposed to this being a pure grouping level
    pub link_documents: bool,
}

impl TemplateNode {
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Configuration-surface rejection. Never retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("an index template with label '{label}' or slug '{slug}' already exists")]
    DuplicateLabelOrSlug { label: String, slug: String },
    #[error("index template {0} does not exist")]
    TemplateNotFound(IndexTemplateId),
    #[error("template node {0} does not exist")]
    NodeNotFound(TemplateNodeId),
    #[error("the root template node cannot be deleted")]
    CannotDeleteRoot,
}

#[derive(Default)]
struct TemplateStoreInner {
    templates: HashMap<IndexTemplateId, IndexTemplate>,
    nodes: HashMap<TemplateNodeId, TemplateNode>,
    children: HashMap<TemplateNodeId, Vec<TemplateNodeId>>,
    labels: HashSet<String>,
    slugs: HashSet<String>,
    next_template_id: u64,
    next_node_id: u64,
}

/// Flat store for index templates and their node trees.
#[derive(Default)]
pub struct TemplateStore {
    inner: RwLock<TemplateStoreInner>,
}

impl TemplateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index template together with its root node.
    pub fn create_template(
        &self,
        label: &str,
        slug: &str,
        document_types: HashSet<DocumentTypeId>,
    ) -> Result<IndexTemplateId, ConfigurationError> {
        let mut inner = self.inner.write();
        if inner.labels.contains(label) || inner.slugs.contains(slug) {
            return Err(ConfigurationError::DuplicateLabelOrSlug {
                label: label.to_string(),
                slug: slug.to_string(),
            });
        }

        inner.next_template_id += 1;
        let template_id = IndexTemplateId(inner.next_template_id);
        inner.next_node_id += 1;
        let root_id = TemplateNodeId(inner.next_node_id);

        inner.nodes.insert(
            root_id,
            TemplateNode {
                id: root_id,
                parent: None,
                index_template: template_id,
                expression: String::new(),
                enabled: true,
                link_documents: false,
            },
        );
        inner.children.insert(root_id, Vec::new());
        inner.templates.insert(
            template_id,
            IndexTemplate {
                id: template_id,
                label: label.to_string(),
                slug: slug.to_string(),
                enabled: true,
                document_types,
                root_node: root_id,
            },
        );
        inner.labels.insert(label.to_string());
        inner.slugs.insert(slug.to_string());

        Ok(template_id)
    }

    /// Delete a template and its whole node tree. Returns the deleted
    /// node ids so the caller can cascade the instance tree.
    pub fn delete_template(
        &self,
        id: IndexTemplateId,
    ) -> Result<Vec<TemplateNodeId>, ConfigurationError> {
        let mut inner = self.inner.write();
        let template = inner
            .templates
            .remove(&id)
            .ok_or(ConfigurationError::TemplateNotFound(id))?;
        inner.labels.remove(&template.label);
        inner.slugs.remove(&template.slug);

        let deleted = collect_subtree(&inner.children, template.root_node);
        for node_id in &deleted {
            inner.nodes.remove(node_id);
            inner.children.remove(node_id);
        }
        Ok(deleted)
    }

    /// Add a child node below `parent`.
    pub fn add_child(
        &self,
        parent: TemplateNodeId,
        expression: &str,
        link_documents: bool,
        enabled: bool,
    ) -> Result<TemplateNodeId, ConfigurationError> {
        let mut inner = self.inner.write();
        let index_template = inner
            .nodes
            .get(&parent)
            .map(|node| node.index_template)
            .ok_or(ConfigurationError::NodeNotFound(parent))?;

        inner.next_node_id += 1;
        let node_id = TemplateNodeId(inner.next_node_id);
        inner.nodes.insert(
            node_id,
            TemplateNode {
                id: node_id,
                parent: Some(parent),
                index_template,
                expression: expression.to_string(),
                enabled,
                link_documents,
            },
        );
        inner.children.insert(node_id, Vec::new());
        inner.children.entry(parent).or_default().push(node_id);
        Ok(node_id)
    }

    /// Update a node's expression and flags. Accepted for the root too,
    /// though its expression and flags are never consulted.
    pub fn update_node(
        &self,
        id: TemplateNodeId,
        expression: &str,
        link_documents: bool,
        enabled: bool,
    ) -> Result<(), ConfigurationError> {
        let mut inner = self.inner.write();
        let node = inner
            .nodes
            .get_mut(&id)
            .ok_or(ConfigurationError::NodeNotFound(id))?;
        node.expression = expression.to_string();
        node.link_documents = link_documents;
        node.enabled = enabled;
        Ok(())
    }

    /// Delete a non-root node and its descendants. Returns the deleted
    /// node ids (self included) for instance-tree cascading.
    pub fn delete_node(
        &self,
        id: TemplateNodeId,
    ) -> Result<Vec<TemplateNodeId>, ConfigurationError> {
        let mut inner = self.inner.write();
        let parent = match inner.nodes.get(&id) {
            None => return Err(ConfigurationError::NodeNotFound(id)),
            Some(node) if node.is_root() => return Err(ConfigurationError::CannotDeleteRoot),
            Some(node) => node.parent,
        };

        let deleted = collect_subtree(&inner.children, id);
        for node_id in &deleted {
            inner.nodes.remove(node_id);
            inner.children.remove(node_id);
        }
        if let Some(parent) = parent {
            if let Some(siblings) = inner.children.get_mut(&parent) {
                siblings.retain(|sibling| *sibling != id);
            }
        }
        Ok(deleted)
    }

    pub fn set_enabled(
        &self,
        id: IndexTemplateId,
        enabled: bool,
    ) -> Result<(), ConfigurationError> {
        let mut inner = self.inner.write();
        let template = inner
            .templates
            .get_mut(&id)
            .ok_or(ConfigurationError::TemplateNotFound(id))?;
        template.enabled = enabled;
        Ok(())
    }

    pub fn document_types_add(
        &self,
        id: IndexTemplateId,
        types: impl IntoIterator<Item = DocumentTypeId>,
    ) -> Result<(), ConfigurationError> {
        let mut inner = self.inner.write();
        let template = inner
            .templates
            .get_mut(&id)
            .ok_or(ConfigurationError::TemplateNotFound(id))?;
        template.document_types.extend(types);
        Ok(())
    }

    pub fn document_types_remove(
        &self,
        id: IndexTemplateId,
        types: &HashSet<DocumentTypeId>,
    ) -> Result<(), ConfigurationError> {
        let mut inner = self.inner.write();
        let template = inner
            .templates
            .get_mut(&id)
            .ok_or(ConfigurationError::TemplateNotFound(id))?;
        template.document_types.retain(|t| !types.contains(t));
        Ok(())
    }

    #[must_use]
    pub fn get_template(&self, id: IndexTemplateId) -> Option<IndexTemplate> {
        self.inner.read().templates.get(&id).cloned()
    }

    #[must_use]
    pub fn template_for_slug(&self, slug: &str) -> Option<IndexTemplate> {
        let inner = self.inner.read();
        inner.templates.values().find(|t| t.slug == slug).cloned()
    }

    /// All templates, ordered by label (stable listing order).
    #[must_use]
    pub fn list_templates(&self) -> Vec<IndexTemplate> {
        let mut templates: Vec<IndexTemplate> =
            self.inner.read().templates.values().cloned().collect();
        templates.sort_by(|a, b| a.label.cmp(&b.label));
        templates
    }

    /// Enabled templates whose filter matches `document_type`.
    #[must_use]
    pub fn templates_for_type(&self, document_type: &DocumentTypeId) -> Vec<IndexTemplate> {
        let mut templates: Vec<IndexTemplate> = self
            .inner
            .read()
            .templates
            .values()
            .filter(|t| t.enabled && t.document_types.contains(document_type))
            .cloned()
            .collect();
        templates.sort_by(|a, b| a.label.cmp(&b.label));
        templates
    }

    #[must_use]
    pub fn get_node(&self, id: TemplateNodeId) -> Option<TemplateNode> {
        self.inner.read().nodes.get(&id).cloned()
    }

    /// Children of a node in creation order.
    #[must_use]
    pub fn children_of(&self, id: TemplateNodeId) -> Vec<TemplateNode> {
        let inner = self.inner.read();
        inner
            .children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| inner.nodes.get(child).cloned())
            .collect()
    }

    #[must_use]
    pub fn template_count(&self) -> usize {
        self.inner.read().templates.len()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }
}

/// Depth-first collection of a subtree, root included.
fn collect_subtree(
    children: &HashMap<TemplateNodeId, Vec<TemplateNodeId>>,
    root: TemplateNodeId,
) -> Vec<TemplateNodeId> {
    let mut collected = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        collected.push(node);
        if let Some(kids) = children.get(&node) {
            stack.extend(kids.iter().copied());
        }
    }
    collected
}
