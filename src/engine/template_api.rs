//! Configuration surface: index templates and their node trees.
//!
//! Template edits never materialize anything by themselves; instance
//! trees only change on the next `document_add`/`rebuild`. The exception
//! is deletion, which must cascade immediately so no instance node
//! outlives the template node that produced it.

use std::collections::HashSet;

use tracing::{debug, info};

use super::{IndexEngine, IndexError};
use crate::document::DocumentTypeId;
use crate::locking::index_lock_name;
use crate::storage::{
    ConfigurationError, IndexTemplate, IndexTemplateId, TemplateNode, TemplateNodeId,
};

impl IndexEngine {
    /// Create an index template. The root template node and the root
    /// instance node are created with it.
    pub fn create_index_template(
        &self,
        label: &str,
        slug: &str,
        document_types: HashSet<DocumentTypeId>,
    ) -> Result<IndexTemplateId, IndexError> {
        let id = self.templates.create_template(label, slug, document_types)?;
        let template = self
            .templates
            .get_template(id)
            .ok_or(ConfigurationError::TemplateNotFound(id))?;
        self.instances.initialize_root(id, template.root_node);
        info!(index = %id, label, slug, "Index template created");
        Ok(id)
    }

    /// Delete an index template, its template tree and its instance tree.
    pub async fn delete_index_template(&self, id: IndexTemplateId) -> Result<(), IndexError> {
        let _guard = self.locks.acquire(&index_lock_name(id)).await?;
        self.templates.delete_template(id)?;
        let deleted = self.instances.clear_index(id);
        self.path_cache.invalidate_many(&deleted);
        info!(index = %id, instance_nodes = deleted.len(), "Index template deleted");
        Ok(())
    }

    /// Add a child template node. No materialization side effect.
    pub fn add_child_template_node(
        &self,
        parent: TemplateNodeId,
        expression: &str,
        link_documents: bool,
        enabled: bool,
    ) -> Result<TemplateNodeId, IndexError> {
        let id = self
            .templates
            .add_child(parent, expression, link_documents, enabled)?;
        debug!(node = %id, %parent, expression, "Template node added");
        Ok(id)
    }

    /// Update a template node's expression and flags. Takes effect on the
    /// next add/rebuild; already-materialized nodes keep their old values
    /// until then. Updating the root is accepted but has no effect, since
    /// the root's expression is never evaluated.
    pub fn update_template_node(
        &self,
        node: TemplateNodeId,
        expression: &str,
        link_documents: bool,
        enabled: bool,
    ) -> Result<(), IndexError> {
        self.templates
            .update_node(node, expression, link_documents, enabled)?;
        Ok(())
    }

    /// Delete a non-root template node. Cascades to descendant template
    /// nodes and every instance node materialized from the deleted
    /// subtree, then prunes newly empty ancestors.
    pub async fn delete_template_node(&self, node: TemplateNodeId) -> Result<(), IndexError> {
        let index = self
            .templates
            .get_node(node)
            .ok_or(ConfigurationError::NodeNotFound(node))?
            .index_template;

        let _guard = self.locks.acquire(&index_lock_name(index)).await?;
        let deleted_template_nodes: HashSet<TemplateNodeId> =
            self.templates.delete_node(node)?.into_iter().collect();
        let deleted = self
            .instances
            .delete_for_template_nodes(&deleted_template_nodes);
        // Grouping levels above the deleted subtree may now be empty
        let swept = self.instances.sweep_empty(index);
        self.path_cache.invalidate_many(deleted.iter().chain(&swept));
        info!(
            node = %node, index = %index,
            instance_nodes = deleted.len() + swept.len(),
            "Template node deleted"
        );
        Ok(())
    }

    /// Enable or disable an index. Disabling leaves the instance tree
    /// stale rather than deleting it.
    pub fn set_template_enabled(
        &self,
        id: IndexTemplateId,
        enabled: bool,
    ) -> Result<(), IndexError> {
        self.templates.set_enabled(id, enabled)?;
        Ok(())
    }

    /// Extend the document-type filter.
    pub fn document_types_add(
        &self,
        id: IndexTemplateId,
        types: impl IntoIterator<Item = DocumentTypeId>,
    ) -> Result<(), IndexError> {
        self.templates.document_types_add(id, types)?;
        Ok(())
    }

    /// Shrink the document-type filter. Already-indexed documents of the
    /// removed types stay until removed or rebuilt.
    pub fn document_types_remove(
        &self,
        id: IndexTemplateId,
        types: &HashSet<DocumentTypeId>,
    ) -> Result<(), IndexError> {
        self.templates.document_types_remove(id, types)?;
        Ok(())
    }

    pub fn get_index_template(&self, id: IndexTemplateId) -> Result<IndexTemplate, IndexError> {
        self.templates
            .get_template(id)
            .ok_or_else(|| ConfigurationError::TemplateNotFound(id).into())
    }

    #[must_use]
    pub fn index_template_for_slug(&self, slug: &str) -> Option<IndexTemplate> {
        self.templates.template_for_slug(slug)
    }

    #[must_use]
    pub fn list_index_templates(&self) -> Vec<IndexTemplate> {
        self.templates.list_templates()
    }

    /// Enabled templates whose filter matches a document type.
    #[must_use]
    pub fn index_templates_for_type(&self, document_type: &DocumentTypeId) -> Vec<IndexTemplate> {
        self.templates.templates_for_type(document_type)
    }

    #[must_use]
    pub fn get_template_node(&self, id: TemplateNodeId) -> Option<TemplateNode> {
        self.templates.get_node(id)
    }

    /// Children of a template node in creation order.
    #[must_use]
    pub fn template_node_children(&self, id: TemplateNodeId) -> Vec<TemplateNode> {
        self.templates.children_of(id)
    }
}
