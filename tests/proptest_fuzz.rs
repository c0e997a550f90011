//! Property-based tests (fuzzing) for index engine robustness.
//!
//! Uses proptest to generate random expressions, documents, and operation
//! sequences, and verifies the engine never panics and its structural
//! invariants hold.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use index_engine::{
    DocumentId, DocumentSnapshot, IndexEngine, IndexEngineConfig, InMemoryDocumentProvider,
    PlaceholderEvaluator,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate a document with a small metadata vocabulary so that values
/// collide often, exercising the merge path
fn document_strategy() -> impl Strategy<Value = DocumentSnapshot> {
    (
        1u64..50,
        "[a-z]{1,8}",
        prop::option::of("(2023|2024|2025)"),
    )
        .prop_map(|(id, label, year)| {
            let mut doc = DocumentSnapshot::new(DocumentId(id), "report", label);
            if let Some(year) = year {
                doc = doc.with_metadata("year", json!(year));
            }
            doc
        })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn year_engine() -> (Arc<IndexEngine>, Arc<InMemoryDocumentProvider>, index_engine::IndexTemplateId) {
    let documents = Arc::new(InMemoryDocumentProvider::new());
    let engine = Arc::new(IndexEngine::in_process(
        IndexEngineConfig::default(),
        documents.clone(),
    ));
    let index = engine
        .create_index_template("By year", "by-year", ["report".into()].into())
        .unwrap();
    let root = engine.get_index_template(index).unwrap().root_node;
    engine
        .add_child_template_node(root, "{{ document.metadata.year }}", true, true)
        .unwrap();
    (engine, documents, index)
}

// =============================================================================
// Evaluator Fuzz Tests
// =============================================================================

proptest! {
    /// Rendering arbitrary expression text must never panic, only
    /// return Ok or a clean error
    #[test]
    fn fuzz_evaluator_arbitrary_expression(expression in ".{0,200}") {
        use index_engine::ExpressionEvaluator;

        let doc = DocumentSnapshot::new(DocumentId(1), "report", "Report")
            .with_metadata("year", json!("2024"));
        let _ = PlaceholderEvaluator.render(&expression, &doc);
    }

    /// Attribute path resolution must never panic on arbitrary paths
    #[test]
    fn fuzz_attribute_arbitrary_path(path in ".{0,100}", doc in document_strategy()) {
        let _ = doc.attribute(&path);
    }

    /// Snapshot deserialization from arbitrary bytes must fail cleanly
    #[test]
    fn fuzz_snapshot_from_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..2000)) {
        let result: Result<DocumentSnapshot, _> = serde_json::from_slice(&bytes);
        let _ = result;
    }
}

// =============================================================================
// Structural Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Adding the same document twice leaves the tree unchanged the
    /// second time
    #[test]
    fn prop_document_add_idempotent(doc in document_strategy()) {
        let rt = runtime();
        rt.block_on(async {
            let (engine, documents, index) = year_engine();
            documents.upsert(doc.clone());

            engine.document_add(doc.id, index).await.unwrap();
            let first: Vec<_> = engine.instance_nodes(index);

            engine.document_add(doc.id, index).await.unwrap();
            let second: Vec<_> = engine.instance_nodes(index);

            let shape = |nodes: &[index_engine::InstanceNode]| {
                let mut pairs: Vec<(String, Vec<u64>)> = nodes
                    .iter()
                    .map(|n| {
                        let mut docs: Vec<u64> = n.documents.iter().map(|d| d.0).collect();
                        docs.sort_unstable();
                        (n.value.clone(), docs)
                    })
                    .collect();
                pairs.sort();
                pairs
            };
            prop_assert_eq!(shape(&first), shape(&second));
            Ok(())
        })?;
    }

    /// No two instance nodes ever share (template node, parent, value)
    #[test]
    fn prop_triple_uniqueness(docs in prop::collection::vec(document_strategy(), 1..30)) {
        let rt = runtime();
        rt.block_on(async {
            let (engine, documents, index) = year_engine();
            for doc in &docs {
                documents.upsert(doc.clone());
                engine.document_add(doc.id, index).await.unwrap();
            }

            let mut seen = HashSet::new();
            for node in engine.instance_nodes(index) {
                let triple = (node.template_node, node.parent, node.value.clone());
                prop_assert!(
                    seen.insert(triple),
                    "duplicate (template node, parent, value) triple"
                );
            }
            Ok(())
        })?;
    }

    /// Detaching every document prunes the tree back to a lone root
    #[test]
    fn prop_full_removal_leaves_only_root(docs in prop::collection::vec(document_strategy(), 1..30)) {
        let rt = runtime();
        rt.block_on(async {
            let (engine, documents, index) = year_engine();
            let mut ids = HashSet::new();
            for doc in &docs {
                documents.upsert(doc.clone());
                engine.document_add(doc.id, index).await.unwrap();
                ids.insert(doc.id);
            }
            for id in ids {
                engine.document_remove(id, index).await.unwrap();
            }

            let remaining = engine.instance_nodes(index);
            prop_assert_eq!(remaining.len(), 1);
            prop_assert!(remaining[0].is_root());
            prop_assert!(remaining[0].documents.is_empty());
            Ok(())
        })?;
    }

    /// Parent pointers in the materialized tree always resolve, and
    /// every non-root node is reachable from the root
    #[test]
    fn prop_tree_is_connected(docs in prop::collection::vec(document_strategy(), 1..30)) {
        let rt = runtime();
        rt.block_on(async {
            let (engine, documents, index) = year_engine();
            for doc in &docs {
                documents.upsert(doc.clone());
                engine.document_add(doc.id, index).await.unwrap();
            }

            let nodes: HashMap<_, _> = engine
                .instance_nodes(index)
                .into_iter()
                .map(|n| (n.id, n))
                .collect();
            for node in nodes.values() {
                match node.parent {
                    Some(parent) => prop_assert!(nodes.contains_key(&parent)),
                    None => prop_assert!(node.is_root()),
                }
            }

            let root = engine.index_root(index).unwrap();
            let reachable = 1 + engine.get_descendants_count(root);
            prop_assert_eq!(reachable, nodes.len());
            Ok(())
        })?;
    }

    /// Rebuilding from scratch produces the same paths as the
    /// incremental adds that got us here
    #[test]
    fn prop_rebuild_deterministic(docs in prop::collection::vec(document_strategy(), 1..20)) {
        let rt = runtime();
        rt.block_on(async {
            let (engine, documents, index) = year_engine();
            for doc in &docs {
                documents.upsert(doc.clone());
                engine.document_add(doc.id, index).await.unwrap();
            }

            let paths = |engine: &IndexEngine| {
                let mut paths: Vec<String> = engine
                    .instance_nodes(index)
                    .iter()
                    .map(|n| engine.get_full_path(n.id).unwrap())
                    .collect();
                paths.sort();
                paths
            };
            let incremental = paths(&engine);

            engine.rebuild(index).await.unwrap();
            prop_assert_eq!(paths(&engine), incremental);
            Ok(())
        })?;
    }
}
