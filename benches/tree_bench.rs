//! Benchmarks for keyspace-analyzer
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use keyspace_analyzer::tree::{top_children, KeyspaceForest, NamespaceTree, Separators, SortBy};
use keyspace_analyzer::types::{KeyRecord, ValueType};

fn sample_keys(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("app:{}:user:{}:session", i % 7, i))
        .collect()
}

fn benchmark_tree_insert(c: &mut Criterion) {
    let keys = sample_keys(10_000);

    c.bench_function("tree_insert_10k", |b| {
        b.iter(|| {
            let mut tree = NamespaceTree::new("hash", Separators::new(b":"));
            for (i, key) in keys.iter().enumerate() {
                tree.add_key(key, i as i64);
            }
            black_box(tree.total_size());
        })
    });
}

fn benchmark_prefix_lookup(c: &mut Criterion) {
    let mut forest = KeyspaceForest::new(Separators::new(b":"));
    for (i, key) in sample_keys(10_000).into_iter().enumerate() {
        let mut record = KeyRecord::new(key, ValueType::Hash);
        record.size = i as i64;
        forest.insert(&record);
    }
    forest.merge_single_child_nodes();

    c.bench_function("aggregate_size_compressed", |b| {
        b.iter(|| black_box(forest.aggregate_size(black_box("app:3:user:"), ValueType::Hash)))
    });

    c.bench_function("expand_top_10", |b| {
        b.iter(|| {
            let children = forest
                .children(black_box("app:3:user:"), ValueType::Hash)
                .unwrap_or_default();
            black_box(top_children(children.into_values(), 10, SortBy::Size))
        })
    });
}

criterion_group!(benches, benchmark_tree_insert, benchmark_prefix_lookup);
criterion_main!(benches);
