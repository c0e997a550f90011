//! Document snapshot data structure and provider seam.
//!
//! The [`DocumentSnapshot`] is the read-only view of a document that index
//! expressions are evaluated against. Snapshots are supplied by the host
//! through the [`DocumentProvider`] trait and must be fetched fresh after
//! lock acquisition, never queued stale.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::storage::StorageError;

/// Opaque document identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Document type identifier (host-defined vocabulary, e.g. `"invoice"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentTypeId(pub String);

impl DocumentTypeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for DocumentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentTypeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Read-only view of a document at a point in time.
///
/// # Example
///
/// ```
/// use index_engine::{DocumentId, DocumentSnapshot};
/// use serde_json::json;
///
/// let doc = DocumentSnapshot::new(DocumentId(1), "invoice", "Invoice 0001")
///     .with_metadata("year", json!("2024"))
///     .with_tag("finance");
///
/// assert!(doc.is_valid());
/// assert_eq!(doc.attribute("metadata.year").as_deref(), Some("2024"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub id: DocumentId,
    pub document_type: DocumentTypeId,
    /// Display label
    pub label: String,
    /// Arbitrary metadata key/value pairs
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Attached tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Current workflow state label, if the document is in a workflow
    #[serde(default)]
    pub workflow_state: Option<String>,
    /// Creation timestamp (epoch millis)
    #[serde(default)]
    pub created_at: i64,
    /// Last update timestamp (epoch millis)
    #[serde(default)]
    pub updated_at: i64,
    /// Trashed documents are excluded from materialization
    #[serde(default)]
    pub in_trash: bool,
}

impl DocumentSnapshot {
    pub fn new(
        id: DocumentId,
        document_type: impl Into<DocumentTypeId>,
        label: impl Into<String>,
    ) -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        Self {
            id,
            document_type: document_type.into(),
            label: label.into(),
            metadata: Map::new(),
            tags: Vec::new(),
            workflow_state: None,
            created_at: now,
            updated_at: now,
            in_trash: false,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn with_workflow_state(mut self, state: impl Into<String>) -> Self {
        self.workflow_state = Some(state.into());
        self
    }

    /// A valid document participates in indexing; a trashed one does not.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.in_trash
    }

    /// Resolve a dotted attribute path to its string rendering.
    ///
    /// Supported roots: `id`, `type`, `label`, `workflow_state`, `tags`
    /// (comma-joined), `created_at`, `updated_at`, and `metadata.<key>`
    /// with further dotted descent into nested objects.
    ///
    /// Returns `None` when the path names nothing. An attribute that
    /// exists but is empty renders as `Some("")`.
    #[must_use]
    pub fn attribute(&self, path: &str) -> Option<String> {
        let mut segments = path.split('.');
        let root = segments.next()?;
        match root {
            "id" => Some(self.id.to_string()),
            "type" | "document_type" => Some(self.document_type.to_string()),
            "label" => Some(self.label.clone()),
            "workflow_state" => Some(self.workflow_state.clone().unwrap_or_default()),
            "tags" => Some(self.tags.join(",")),
            "created_at" => Some(self.created_at.to_string()),
            "updated_at" => Some(self.updated_at.to_string()),
            "metadata" => {
                let key = segments.next()?;
                let mut value = self.metadata.get(key)?;
                for segment in segments {
                    value = value.as_object()?.get(segment)?;
                }
                Some(render_value(value))
            }
            _ => None,
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Source of document snapshots.
///
/// Implementations must return the *current* state of a document: the
/// engine fetches snapshots after it has acquired its locks, so a stale
/// provider would defeat the same-document ordering guarantee.
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    /// Fetch the current snapshot, or `None` if the document no longer exists.
    async fn get(&self, id: DocumentId) -> Result<Option<DocumentSnapshot>, StorageError>;

    /// All document ids whose type is in `types` (used by rebuild).
    async fn ids_for_types(
        &self,
        types: &HashSet<DocumentTypeId>,
    ) -> Result<Vec<DocumentId>, StorageError>;
}

/// In-memory document provider backed by a concurrent map.
///
/// Suitable for tests and embedded hosts that already hold their document
/// corpus in memory.
#[derive(Default)]
pub struct InMemoryDocumentProvider {
    data: DashMap<DocumentId, DocumentSnapshot>,
}

impl InMemoryDocumentProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Insert or replace a snapshot.
    pub fn upsert(&self, snapshot: DocumentSnapshot) {
        self.data.insert(snapshot.id, snapshot);
    }

    /// Remove a document entirely.
    pub fn remove(&self, id: DocumentId) {
        self.data.remove(&id);
    }

    /// Mark a document as trashed without removing it.
    pub fn trash(&self, id: DocumentId) {
        if let Some(mut entry) = self.data.get_mut(&id) {
            entry.in_trash = true;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl DocumentProvider for InMemoryDocumentProvider {
    async fn get(&self, id: DocumentId) -> Result<Option<DocumentSnapshot>, StorageError> {
        Ok(self.data.get(&id).map(|r| r.value().clone()))
    }

    async fn ids_for_types(
        &self,
        types: &HashSet<DocumentTypeId>,
    ) -> Result<Vec<DocumentId>, StorageError> {
        let mut ids: Vec<DocumentId> = self
            .data
            .iter()
            .filter(|entry| types.contains(&entry.document_type))
            .map(|entry| entry.id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_doc(id: u64) -> DocumentSnapshot {
        DocumentSnapshot::new(DocumentId(id), "report", format!("Report {id}"))
            .with_metadata("year", json!("2024"))
            .with_metadata("client", json!({"name": "ACME", "tier": 1}))
            .with_tag("internal")
    }

    #[test]
    fn test_attribute_basic_fields() {
        let doc = test_doc(7);
        assert_eq!(doc.attribute("id").as_deref(), Some("7"));
        assert_eq!(doc.attribute("type").as_deref(), Some("report"));
        assert_eq!(doc.attribute("label").as_deref(), Some("Report 7"));
        assert_eq!(doc.attribute("tags").as_deref(), Some("internal"));
    }

    #[test]
    fn test_attribute_metadata_descent() {
        let doc = test_doc(1);
        assert_eq!(doc.attribute("metadata.year").as_deref(), Some("2024"));
        assert_eq!(
            doc.attribute("metadata.client.name").as_deref(),
            Some("ACME")
        );
        assert_eq!(doc.attribute("metadata.client.tier").as_deref(), Some("1"));
        assert_eq!(doc.attribute("metadata.missing"), None);
    }

    #[test]
    fn test_attribute_absent_workflow_state_is_empty() {
        let doc = test_doc(1);
        assert_eq!(doc.attribute("workflow_state").as_deref(), Some(""));
        assert_eq!(doc.attribute("nonsense"), None);
    }

    #[tokio::test]
    async fn test_provider_roundtrip() {
        let provider = InMemoryDocumentProvider::new();
        provider.upsert(test_doc(1));
        provider.upsert(test_doc(2));

        let fetched = provider.get(DocumentId(1)).await.unwrap().unwrap();
        assert_eq!(fetched.label, "Report 1");
        assert!(provider.get(DocumentId(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_provider_ids_for_types() {
        let provider = InMemoryDocumentProvider::new();
        provider.upsert(test_doc(1));
        provider.upsert(DocumentSnapshot::new(DocumentId(2), "memo", "Memo"));

        let types: HashSet<DocumentTypeId> = [DocumentTypeId::from("report")].into();
        let ids = provider.ids_for_types(&types).await.unwrap();
        assert_eq!(ids, vec![DocumentId(1)]);
    }

    #[tokio::test]
    async fn test_provider_trash_keeps_snapshot() {
        let provider = InMemoryDocumentProvider::new();
        provider.upsert(test_doc(1));
        provider.trash(DocumentId(1));

        let fetched = provider.get(DocumentId(1)).await.unwrap().unwrap();
        assert!(!fetched.is_valid());
    }
}
