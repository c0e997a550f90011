// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Materialized index instance tree.
//!
//! An [`InstanceNode`] is one template node evaluated against documents:
//! the evaluation result is the node's `value`, and documents sharing a
//! value at the same tree position share the node. Uniqueness is enforced
//! by a `(template_node, parent, value)` index map, which is what gives
//! get-or-create its merge semantics.
//!
//! Nodes are pruned bottom-up once they hold no documents and no
//! children; per-index roots are never pruned. Callers serialize all
//! mutation of one index's tree under that index's lock, so check-then-
//! delete during pruning is atomic.

use std::collections::{HashMap, HashSet};
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::template_store::{IndexTemplateId, TemplateNodeId};
use crate::document::DocumentId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct InstanceNodeId(pub u64);

impl fmt::Display for InstanceNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One materialized node of an index instance tree.
#[derive(Debug, Clone)]
pub struct InstanceNode {
    pub id: InstanceNodeId,
    /// `None` only for the per-index root
    pub parent: Option<InstanceNodeId>,
    /// The template node this node was materialized from
    pub template_node: TemplateNodeId,
    pub index_template: IndexTemplateId,
    /// Evaluation result; empty on the root
    pub value: String,
    /// Documents attached at this node (only on `link_documents` levels)
    pub documents: HashSet<DocumentId>,
}

impl InstanceNode {
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

type TripleKey = (TemplateNodeId, Option<InstanceNodeId>, String);

#[derive(Default)]
struct InstanceStoreInner {
    nodes: HashMap<InstanceNodeId, InstanceNode>,
    children: HashMap<InstanceNodeId, Vec<InstanceNodeId>>,
    /// Uniqueness index: at most one node per (template_node, parent, value)
    by_triple: HashMap<TripleKey, InstanceNodeId>,
    /// Reverse index: which nodes hold a given document
    by_document: HashMap<DocumentId, HashSet<InstanceNodeId>>,
    roots: HashMap<IndexTemplateId, InstanceNodeId>,
    next_id: u64,
}

impl InstanceStoreInner {
    fn remove_node(&mut self, id: InstanceNodeId) -> Option<InstanceNode> {
        let node = self.nodes.remove(&id)?;
        self.children.remove(&id);
        self.by_triple
            .remove(&(node.template_node, node.parent, node.value.clone()));
        for document in &node.documents {
            if let Some(holders) = self.by_document.get_mut(document) {
                holders.remove(&id);
                if holders.is_empty() {
                    self.by_document.remove(document);
                }
            }
        }
        if let Some(parent) = node.parent {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.retain(|sibling| *sibling != id);
            }
        } else {
            self.roots.remove(&node.index_template);
        }
        Some(node)
    }

    fn is_prunable(&self, id: InstanceNodeId) -> bool {
        match self.nodes.get(&id) {
            Some(node) => {
                !node.is_root()
                    && node.documents.is_empty()
                    && self.children.get(&id).is_none_or(Vec::is_empty)
            }
            None => false,
        }
    }

    /// Collect a subtree depth-first, root included.
    fn collect_subtree(&self, root: InstanceNodeId) -> Vec<InstanceNodeId> {
        let mut collected = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            collected.push(node);
            if let Some(kids) = self.children.get(&node) {
                stack.extend(kids.iter().copied());
            }
        }
        collected
    }
}

/// Flat store for materialized instance trees, one tree per index.
#[derive(Default)]
pub struct InstanceStore {
    inner: RwLock<InstanceStoreInner>,
}

impl InstanceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the per-index root node.
    pub fn initialize_root(
        &self,
        index_template: IndexTemplateId,
        root_template_node: TemplateNodeId,
    ) -> InstanceNodeId {
        let mut inner = self.inner.write();
        if let Some(root) = inner.roots.get(&index_template) {
            return *root;
        }
        inner.next_id += 1;
        let id = InstanceNodeId(inner.next_id);
        inner.nodes.insert(
            id,
            InstanceNode {
                id,
                parent: None,
                template_node: root_template_node,
                index_template,
                value: String::new(),
                documents: HashSet::new(),
            },
        );
        inner.children.insert(id, Vec::new());
        inner
            .by_triple
            .insert((root_template_node, None, String::new()), id);
        inner.roots.insert(index_template, id);
        id
    }

    #[must_use]
    pub fn root_of(&self, index_template: IndexTemplateId) -> Option<InstanceNodeId> {
        self.inner.read().roots.get(&index_template).copied()
    }

    /// Get or create the node for `(template_node, parent, value)`.
    /// Returns the node id and whether it was created by this call.
    pub fn get_or_create(
        &self,
        template_node: TemplateNodeId,
        index_template: IndexTemplateId,
        parent: InstanceNodeId,
        value: &str,
    ) -> (InstanceNodeId, bool) {
        let mut inner = self.inner.write();
        let key = (template_node, Some(parent), value.to_string());
        if let Some(existing) = inner.by_triple.get(&key) {
            return (*existing, false);
        }
        inner.next_id += 1;
        let id = InstanceNodeId(inner.next_id);
        inner.nodes.insert(
            id,
            InstanceNode {
                id,
                parent: Some(parent),
                template_node,
                index_template,
                value: value.to_string(),
                documents: HashSet::new(),
            },
        );
        inner.children.insert(id, Vec::new());
        inner.children.entry(parent).or_default().push(id);
        inner.by_triple.insert(key, id);
        (id, true)
    }

    /// Attach a document (idempotent set-add). Returns whether it was new.
    pub fn attach(&self, id: InstanceNodeId, document: DocumentId) -> bool {
        let mut inner = self.inner.write();
        match inner.nodes.get_mut(&id) {
            Some(node) => {
                let added = node.documents.insert(document);
                if added {
                    inner.by_document.entry(document).or_default().insert(id);
                }
                added
            }
            None => false,
        }
    }

    /// Detach a document. Returns whether it was attached.
    pub fn detach(&self, id: InstanceNodeId, document: DocumentId) -> bool {
        let mut inner = self.inner.write();
        match inner.nodes.get_mut(&id) {
            Some(node) => {
                let removed = node.documents.remove(&document);
                if removed {
                    if let Some(holders) = inner.by_document.get_mut(&document) {
                        holders.remove(&id);
                        if holders.is_empty() {
                            inner.by_document.remove(&document);
                        }
                    }
                }
                removed
            }
            None => false,
        }
    }

    /// Nodes of one index currently holding a document.
    #[must_use]
    pub fn nodes_with_document(
        &self,
        index_template: IndexTemplateId,
        document: DocumentId,
    ) -> Vec<InstanceNodeId> {
        let inner = self.inner.read();
        inner
            .by_document
            .get(&document)
            .into_iter()
            .flatten()
            .filter(|id| {
                inner
                    .nodes
                    .get(id)
                    .is_some_and(|node| node.index_template == index_template)
            })
            .copied()
            .collect()
    }

    /// Prune upward from a candidate: delete while the node is not the
    /// root, has no documents and no children, then re-examine its former
    /// parent. Returns the deleted node ids.
    pub fn prune_upwards(&self, start: InstanceNodeId) -> Vec<InstanceNodeId> {
        let mut inner = self.inner.write();
        let mut deleted = Vec::new();
        let mut candidate = Some(start);
        while let Some(id) = candidate {
            if !inner.is_prunable(id) {
                break;
            }
            // remove_node() is infallible here: is_prunable() saw the node
            let parent = inner.remove_node(id).and_then(|node| node.parent);
            deleted.push(id);
            candidate = parent;
        }
        deleted
    }

    /// Global sweep: delete every prunable node under one index,
    /// iterating until a fixpoint so emptied parents go too.
    pub fn sweep_empty(&self, index_template: IndexTemplateId) -> Vec<InstanceNodeId> {
        let mut inner = self.inner.write();
        let mut deleted = Vec::new();
        loop {
            let prunable: Vec<InstanceNodeId> = inner
                .nodes
                .values()
                .filter(|node| node.index_template == index_template)
                .map(|node| node.id)
                .filter(|id| inner.is_prunable(*id))
                .collect();
            if prunable.is_empty() {
                break;
            }
            for id in prunable {
                inner.remove_node(id);
                deleted.push(id);
            }
        }
        deleted
    }

    /// Delete one index's entire tree, root included. Returns deleted ids.
    pub fn clear_index(&self, index_template: IndexTemplateId) -> Vec<InstanceNodeId> {
        let mut inner = self.inner.write();
        let Some(root) = inner.roots.get(&index_template).copied() else {
            return Vec::new();
        };
        let subtree = inner.collect_subtree(root);
        for id in &subtree {
            inner.remove_node(*id);
        }
        subtree
    }

    /// Delete every node materialized from the given template nodes,
    /// together with their subtrees. Used when template nodes are deleted.
    pub fn delete_for_template_nodes(
        &self,
        template_nodes: &HashSet<TemplateNodeId>,
    ) -> Vec<InstanceNodeId> {
        let mut inner = self.inner.write();
        let targets: Vec<InstanceNodeId> = inner
            .nodes
            .values()
            .filter(|node| template_nodes.contains(&node.template_node))
            .map(|node| node.id)
            .collect();

        let mut deleted = Vec::new();
        for target in targets {
            if !inner.nodes.contains_key(&target) {
                continue; // already gone as part of an earlier subtree
            }
            for id in inner.collect_subtree(target) {
                inner.remove_node(id);
                deleted.push(id);
            }
        }
        deleted
    }

    #[must_use]
    pub fn get(&self, id: InstanceNodeId) -> Option<InstanceNode> {
        self.inner.read().nodes.get(&id).cloned()
    }

    /// Children ordered by value.
    #[must_use]
    pub fn children_of(&self, id: InstanceNodeId) -> Vec<InstanceNode> {
        let inner = self.inner.read();
        let mut children: Vec<InstanceNode> = inner
            .children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| inner.nodes.get(child).cloned())
            .collect();
        children.sort_by(|a, b| a.value.cmp(&b.value));
        children
    }

    /// All descendants (self excluded), depth-first.
    #[must_use]
    pub fn descendants_of(&self, id: InstanceNodeId) -> Vec<InstanceNode> {
        let inner = self.inner.read();
        inner
            .collect_subtree(id)
            .into_iter()
            .skip(1)
            .filter_map(|node| inner.nodes.get(&node).cloned())
            .collect()
    }

    /// Ancestor chain, root first, self included.
    #[must_use]
    pub fn ancestors_of(&self, id: InstanceNodeId) -> Vec<InstanceNode> {
        let inner = self.inner.read();
        let mut chain = Vec::new();
        let mut current = inner.nodes.get(&id);
        while let Some(node) = current {
            chain.push(node.clone());
            current = node.parent.and_then(|parent| inner.nodes.get(&parent));
        }
        chain.reverse();
        chain
    }

    /// Documents attached at a node, in id order.
    #[must_use]
    pub fn documents_of(&self, id: InstanceNodeId) -> Vec<DocumentId> {
        let inner = self.inner.read();
        let mut documents: Vec<DocumentId> = inner
            .nodes
            .get(&id)
            .map(|node| node.documents.iter().copied().collect())
            .unwrap_or_default();
        documents.sort();
        documents
    }

    /// All nodes of one index (unspecified order).
    #[must_use]
    pub fn nodes_for_index(&self, index_template: IndexTemplateId) -> Vec<InstanceNode> {
        self.inner
            .read()
            .nodes
            .values()
            .filter(|node| node.index_template == index_template)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }
}
