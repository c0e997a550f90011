// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Flat arena stores for the template and instance trees.
//!
//! Both trees are stored as id -> node maps with an explicit
//! `children_by_parent` secondary index instead of recursive object
//! graphs. Cascade deletion and get-or-create stay explicit, and there
//! are no cyclic-reference lifetimes to manage.

mod instance_store;
mod template_store;

pub use instance_store::{InstanceNode, InstanceNodeId, InstanceStore};
pub use template_store::{
    ConfigurationError, IndexTemplate, IndexTemplateId, TemplateNode, TemplateNodeId,
    TemplateStore,
};

use thiserror::Error;

/// Storage-layer failure. Fatal for the current operation.
///
/// The in-process stores never fail; this is the error surface for
/// external [`DocumentProvider`](crate::document::DocumentProvider)
/// backends. A provider reports a document that is definitively gone as
/// `Ok(None)`, and `NotFound` covers referenced records its backend
/// cannot produce (a dangling foreign key, a missing blob).
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("not found")]
    NotFound,
    #[error("storage backend error: {0}")]
    Backend(String),
}
