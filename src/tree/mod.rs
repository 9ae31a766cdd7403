//! Namespace aggregation
//!
//! - `namespace`: the separator-delimited prefix tree for one value type
//! - `forest`: one tree per value type behind a shared lock
//! - `top`: bounded top-K selection for drill-down views

mod forest;
mod namespace;
mod top;

pub use forest::{ChildSummary, KeyspaceForest, SharedForest, TypeTotals};
pub use namespace::{NamespaceTree, Node, Resolved, Separators};
pub use top::{top_children, SortBy};
