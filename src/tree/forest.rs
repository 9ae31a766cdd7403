//! One namespace tree per value type

use super::namespace::{NamespaceTree, Node, Separators};
use crate::types::{KeyRecord, ValueType};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Forest shared between the aggregation stage and readers
pub type SharedForest = Arc<RwLock<KeyspaceForest>>;

/// Presentation row for one child of an expanded node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildSummary {
    /// Segment text of the child
    pub segment: String,
    /// Full key path of the child
    pub prefix: String,
    pub key_count: u64,
    pub size: i64,
    pub child_count: usize,
    /// Whether the child's full path is itself a key
    pub terminal: bool,
}

impl ChildSummary {
    fn from_node(parent_path: &str, node: &Node) -> Self {
        Self {
            segment: node.segment().to_string(),
            prefix: format!("{parent_path}{}", node.segment()),
            key_count: node.key_count(),
            size: node.size(),
            child_count: node.child_count(),
            terminal: node.is_terminal(),
        }
    }
}

/// Per-type totals for reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeTotals {
    pub value_type: ValueType,
    pub key_count: u64,
    pub size: i64,
    pub nodes: usize,
}

/// Five namespace trees, one per [`ValueType`]
#[derive(Debug, Clone)]
pub struct KeyspaceForest {
    trees: BTreeMap<ValueType, NamespaceTree>,
}

impl KeyspaceForest {
    pub fn new(separators: Separators) -> Self {
        let trees = ValueType::ALL
            .iter()
            .map(|&t| (t, NamespaceTree::new(t.as_str(), separators.clone())))
            .collect();
        Self { trees }
    }

    pub fn shared(separators: Separators) -> SharedForest {
        Arc::new(RwLock::new(Self::new(separators)))
    }

    /// Route a sized record into the tree for its type
    pub fn insert(&mut self, record: &KeyRecord) {
        if let Some(tree) = self.trees.get_mut(&record.value_type) {
            tree.add_key(&record.key, record.size);
        }
    }

    pub fn tree(&self, value_type: ValueType) -> Option<&NamespaceTree> {
        self.trees.get(&value_type)
    }

    /// Types holding at least one key
    pub fn types_present(&self) -> Vec<ValueType> {
        self.trees
            .iter()
            .filter(|(_, tree)| tree.key_count() > 0)
            .map(|(&t, _)| t)
            .collect()
    }

    pub fn aggregate_size(&self, prefix: &str, value_type: ValueType) -> i64 {
        self.tree(value_type)
            .map(|tree| tree.size_of(prefix))
            .unwrap_or(0)
    }

    /// Children of the node `prefix` resolves to, keyed by segment
    pub fn children(
        &self,
        prefix: &str,
        value_type: ValueType,
    ) -> Option<BTreeMap<String, ChildSummary>> {
        let resolved = self.tree(value_type)?.resolve(prefix)?;
        let path = resolved.path();
        Some(
            resolved
                .node
                .children()
                .iter()
                .map(|(segment, child)| (segment.clone(), ChildSummary::from_node(&path, child)))
                .collect(),
        )
    }

    /// Compress every tree
    pub fn merge_single_child_nodes(&mut self) {
        for tree in self.trees.values_mut() {
            tree.merge_single_child_nodes();
        }
    }

    pub fn totals(&self) -> Vec<TypeTotals> {
        self.trees
            .iter()
            .map(|(&value_type, tree)| TypeTotals {
                value_type,
                key_count: tree.key_count(),
                size: tree.total_size(),
                nodes: tree.node_count(),
            })
            .collect()
    }

    pub fn key_count(&self) -> u64 {
        self.trees.values().map(NamespaceTree::key_count).sum()
    }

    pub fn total_size(&self) -> i64 {
        self.trees.values().map(NamespaceTree::total_size).sum()
    }
}
