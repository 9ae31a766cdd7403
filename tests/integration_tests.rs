//! Integration tests for keyspace-analyzer
//!
//! These run the full pipeline against the in-memory store; no Redis server
//! is needed.

use keyspace_analyzer::config::{AnalysisConfig, RedisTarget};
use keyspace_analyzer::error::{AnalyzerError, PipelineError};
use keyspace_analyzer::pipeline::Analyzer;
use keyspace_analyzer::session::{SessionManager, SessionState};
use keyspace_analyzer::store::{MemoryStore, StoredValue};
use keyspace_analyzer::tree::{top_children, SortBy};
use keyspace_analyzer::types::{SizingMode, TypeFilter, ValueType};
use std::time::Duration;

fn config() -> AnalysisConfig {
    let mut config = AnalysisConfig::new(RedisTarget::new("mem", 6379));
    config.pause = Duration::ZERO;
    config.batch_size = 100;
    config
}

fn mixed_store() -> MemoryStore {
    let store = MemoryStore::new("mem");
    for i in 0..40 {
        store.insert(format!("user:{i}:profile"), StoredValue::hash([("name", "n"), ("age", "42")]));
        store.insert(format!("user:{i}:token"), StoredValue::string("abcdef"));
    }
    for i in 0..10 {
        store.insert(format!("queue:jobs:{i}"), StoredValue::list(["job-a", "job-b", "job-c"]));
    }
    store.insert("leaderboard", StoredValue::zset([("alice", 10.0), ("bob", 7.5)]));
    store.insert("tags:all", StoredValue::set(["red", "green", "blue"]));
    store.insert("events", StoredValue::Other("stream".into()));
    store
}

#[tokio::test]
async fn test_reference_scenario_end_to_end() {
    let store = MemoryStore::new("mem");
    store.insert("foo:bar", StoredValue::string("x"));
    store.insert("foo:bar:baz", StoredValue::string("x"));
    store.insert("foo:qux", StoredValue::string("x"));
    store.set_memory_usage("foo:bar", 1);
    store.set_memory_usage("foo:bar:baz", 2);
    store.set_memory_usage("foo:qux", 3);

    let report = Analyzer::new(config(), store).run().await.unwrap();
    let forest = &report.forest;

    assert_eq!(forest.aggregate_size("foo:", ValueType::String), 6);
    assert_eq!(forest.aggregate_size("foo:bar:", ValueType::String), 2);

    let children = forest.children("foo:", ValueType::String).unwrap();
    let sizes: Vec<(&str, i64)> = children
        .values()
        .map(|c| (c.segment.as_str(), c.size))
        .collect();
    assert_eq!(sizes, vec![("bar", 1), ("bar:baz", 2), ("qux", 3)]);
    assert_eq!(children["bar:baz"].prefix, "foo:bar:baz");
}

#[tokio::test]
async fn test_mixed_keyspace() {
    let report = Analyzer::new(config(), mixed_store()).run().await.unwrap();
    let summary = &report.summary;

    assert!(summary.completed);
    assert_eq!(summary.keys_scanned, 93);
    assert_eq!(summary.keys_dropped, 1);
    assert_eq!(summary.keys_aggregated, 92);
    assert_eq!(
        report.forest.types_present(),
        vec![
            ValueType::String,
            ValueType::List,
            ValueType::Set,
            ValueType::Hash,
            ValueType::Zset
        ]
    );

    let user_hashes = report.forest.aggregate_size("user:", ValueType::Hash);
    let user_strings = report.forest.aggregate_size("user:", ValueType::String);
    assert!(user_hashes > 0);
    assert!(user_strings > 0);
    assert_eq!(
        report.forest.tree(ValueType::Hash).unwrap().total_size(),
        user_hashes
    );
}

#[tokio::test]
async fn test_cap_enforced_at_batch_boundary() {
    let store = MemoryStore::new("mem");
    for i in 0..1000 {
        store.insert(format!("k:{i:04}"), StoredValue::string("v"));
    }

    let mut config = config();
    config.key_limit = 50;
    config.batch_size = 100;
    let report = Analyzer::new(config, store.clone()).run().await.unwrap();

    assert_eq!(store.call_count("SCAN"), 1);
    assert_eq!(report.summary.keys_scanned, 100);
    assert!(report.summary.limit_reached);
    assert!(report.summary.completed);
}

#[tokio::test]
async fn test_type_filter_and_isolation() {
    let mut config = config();
    config.types = TypeFilter::only([ValueType::Hash]);
    let report = Analyzer::new(config, mixed_store()).run().await.unwrap();

    assert_eq!(report.forest.types_present(), vec![ValueType::Hash]);
    assert_eq!(report.forest.aggregate_size("user:", ValueType::String), 0);
    assert_eq!(report.forest.key_count(), 40);
}

#[tokio::test]
async fn test_sampled_mode() {
    let store = MemoryStore::new("mem");
    let members: Vec<String> = (0..100).map(|i| format!("{i:04}")).collect();
    store.insert("k", StoredValue::list(&members));

    let mut config = config();
    config.sizing = SizingMode::Sampled;
    let report = Analyzer::new(config, store.clone()).run().await.unwrap();

    assert_eq!(report.forest.aggregate_size("k", ValueType::List), 657);
    assert_eq!(store.call_count("MEMORY USAGE"), 0);
    assert_eq!(store.call_count("sample"), 1);
}

#[tokio::test]
async fn test_transport_failure_aborts_run() {
    let store = mixed_store();
    store.fail_after("SCAN", 0);

    let err = Analyzer::new(config(), store).run().await.unwrap_err();
    assert!(matches!(
        err,
        AnalyzerError::Pipeline(PipelineError::StageFailed { stage: "scan", .. })
    ));
}

#[tokio::test]
async fn test_top_children_over_forest() {
    let report = Analyzer::new(config(), mixed_store()).run().await.unwrap();
    let children = report.forest.children("user:", ValueType::Hash).unwrap();
    assert_eq!(children.len(), 40);

    let top = top_children(children.into_values(), 5, SortBy::Size);
    assert_eq!(top.len(), 5);
    assert!(top.windows(2).all(|w| w[0].size >= w[1].size));
}

#[tokio::test]
async fn test_session_manager_end_to_end() {
    let store = mixed_store();
    let factory_store = store.clone();
    let manager = SessionManager::new(move |_| Ok(factory_store.clone()));

    manager.start(config()).await.unwrap();

    let mut state = SessionState::Running;
    for _ in 0..400 {
        state = manager.status("mem:6379").unwrap().state;
        if state != SessionState::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(state, SessionState::Finished);

    let queue = manager
        .expand("mem:6379", "list", "", 10, SortBy::KeyCount)
        .unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].segment, "queue:jobs:");
    assert_eq!(queue[0].key_count, 10);

    let info = manager.inspect("mem:6379", "leaderboard", 10).await.unwrap();
    assert_eq!(info.key_type, "zset");
    assert_eq!(info.length, 2);
}
