// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Expression evaluation seam.
//!
//! Template node expressions are rendered against a document snapshot by a
//! pure function. The engine only depends on the [`ExpressionEvaluator`]
//! trait, so hosts can plug in any Turing-incomplete templating engine.
//! A small placeholder-substitution implementation is provided for tests
//! and embedded use.

use thiserror::Error;

use crate::document::DocumentSnapshot;

/// Expression evaluation failure.
///
/// Never fatal to a tree walk: the engine records the failure as a warning
/// and skips that branch for the document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),
    #[error("malformed expression: {0}")]
    Malformed(String),
}

/// Pure function mapping (expression, document snapshot) to a string value.
///
/// Implementations must be side-effect free and deterministic for a given
/// snapshot; the engine may re-evaluate the same expression at any time.
pub trait ExpressionEvaluator: Send + Sync {
    fn render(
        &self,
        expression: &str,
        document: &DocumentSnapshot,
    ) -> Result<String, EvaluationError>;
}

/// Placeholder-substitution evaluator.
///
/// Replaces `{{ document.<path> }}` placeholders with the document
/// attribute at `<path>` (see [`DocumentSnapshot::attribute`]); text
/// outside placeholders passes through verbatim. The rendered result is
/// trimmed, so an expression whose placeholders all resolve to nothing
/// collapses to the empty string and the branch is skipped.
///
/// # Example
///
/// ```
/// use index_engine::{DocumentId, DocumentSnapshot, ExpressionEvaluator, PlaceholderEvaluator};
/// use serde_json::json;
///
/// let doc = DocumentSnapshot::new(DocumentId(1), "invoice", "Invoice 0001")
///     .with_metadata("year", json!("2024"));
/// let evaluator = PlaceholderEvaluator;
///
/// let value = evaluator.render("FY {{ document.metadata.year }}", &doc).unwrap();
/// assert_eq!(value, "FY 2024");
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderEvaluator;

impl ExpressionEvaluator for PlaceholderEvaluator {
    fn render(
        &self,
        expression: &str,
        document: &DocumentSnapshot,
    ) -> Result<String, EvaluationError> {
        let mut output = String::with_capacity(expression.len());
        let mut rest = expression;

        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| EvaluationError::Malformed("unclosed '{{'".into()))?;
            let placeholder = after[..end].trim();

            let path = placeholder.strip_prefix("document.").ok_or_else(|| {
                EvaluationError::Malformed(format!(
                    "placeholder '{placeholder}' must start with 'document.'"
                ))
            })?;
            let value = document
                .attribute(path)
                .ok_or_else(|| EvaluationError::UnknownAttribute(path.to_string()))?;
            output.push_str(&value);

            rest = &after[end + 2..];
        }
        output.push_str(rest);

        Ok(output.trim().to_string())
    }
}
