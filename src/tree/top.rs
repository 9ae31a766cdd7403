//! Bounded top-K selection over one drill-down layer

use super::forest::ChildSummary;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Ranking metric for [`top_children`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Size,
    KeyCount,
    ChildCount,
}

struct Ranked {
    metric: i128,
    summary: ChildSummary,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    // Equal metrics rank the lexicographically smaller segment higher
    fn cmp(&self, other: &Self) -> Ordering {
        self.metric
            .cmp(&other.metric)
            .then_with(|| other.summary.segment.cmp(&self.summary.segment))
    }
}

/// Keep the `limit` highest-ranked children, highest first.
///
/// Uses a min-heap of at most `limit + 1` entries, so memory stays bounded
/// by the limit rather than by the layer's width.
pub fn top_children<I>(children: I, limit: usize, sort: SortBy) -> Vec<ChildSummary>
where
    I: IntoIterator<Item = ChildSummary>,
{
    if limit == 0 {
        return Vec::new();
    }

    let mut heap = BinaryHeap::with_capacity(limit + 1);
    for summary in children {
        let metric = match sort {
            SortBy::Size => i128::from(summary.size),
            SortBy::KeyCount => i128::from(summary.key_count),
            SortBy::ChildCount => summary.child_count as i128,
        };
        heap.push(Reverse(Ranked { metric, summary }));
        if heap.len() > limit {
            heap.pop();
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse(ranked)| ranked.summary)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(segment: &str, size: i64, key_count: u64, child_count: usize) -> ChildSummary {
        ChildSummary {
            segment: segment.into(),
            prefix: segment.into(),
            key_count,
            size,
            child_count,
            terminal: child_count == 0,
        }
    }

    fn layer() -> Vec<ChildSummary> {
        vec![
            child("a:", 10, 5, 1),
            child("b:", 30, 1, 4),
            child("c:", 20, 9, 2),
            child("d", 5, 1, 0),
        ]
    }

    fn segments(v: &[ChildSummary]) -> Vec<&str> {
        v.iter().map(|c| c.segment.as_str()).collect()
    }

    #[test]
    fn test_top_by_size() {
        let top = top_children(layer(), 2, SortBy::Size);
        assert_eq!(segments(&top), vec!["b:", "c:"]);
    }

    #[test]
    fn test_top_by_key_count() {
        let top = top_children(layer(), 3, SortBy::KeyCount);
        assert_eq!(segments(&top), vec!["c:", "a:", "b:"]);
    }

    #[test]
    fn test_top_by_child_count() {
        let top = top_children(layer(), 10, SortBy::ChildCount);
        assert_eq!(segments(&top), vec!["b:", "c:", "a:", "d"]);
    }

    #[test]
    fn test_zero_limit() {
        assert!(top_children(layer(), 0, SortBy::Size).is_empty());
    }

    #[test]
    fn test_ties_break_on_segment() {
        let ties = vec![child("z", 1, 1, 0), child("m", 1, 1, 0), child("a", 1, 1, 0)];
        let top = top_children(ties, 2, SortBy::Size);
        assert_eq!(segments(&top), vec!["a", "m"]);
    }

    #[test]
    fn test_sort_by_serde_names() {
        let sort: SortBy = serde_json::from_str("\"key_count\"").unwrap();
        assert_eq!(sort, SortBy::KeyCount);
    }
}
