//! keyspace-analyzer - Redis Keyspace Memory Analyzer
//!
//! Inventories a Redis keyspace without dumping it, estimates the memory
//! footprint of every key, and aggregates the estimates into a namespace
//! tree split on key separators, so an operator can drill down from the
//! total to the prefix responsible for it.
//!
//! # Features
//!
//! - **Incremental Enumeration**: Cursor-based `SCAN` with `MATCH`, a
//!   `COUNT` hint and a soft cap on keys sampled.
//!
//! - **Two Sizing Modes**: Exact `MEMORY USAGE` per key, or cardinality plus
//!   a five-element sample extrapolated per value type.
//!
//! - **Throttled**: A fixed pause after every sized batch keeps load on the
//!   target predictable.
//!
//! - **Prefix Tree**: One tree per value type with subtree rollups, path
//!   compression after ingestion and prefix-scoped queries.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Redis Server                             │
//! └──────┬──────────────────┬──────────────────┬────────────────────┘
//!        │ SCAN             │ TYPE (pipelined)  │ MEMORY USAGE / samples
//!        ▼                  ▼                   ▼
//! ┌────────────┐  keys  ┌────────────┐ records ┌────────────┐
//! │  Scanner   ├───────►│ Classifier ├────────►│   Sizer    │
//! └────────────┘ (mpsc) └────────────┘ (mpsc)  └─────┬──────┘
//!                                                    │ sized (mpsc)
//!                                                    ▼
//!                                           ┌──────────────────┐
//!                                           │    Aggregator    │
//!                                           │  write lock per  │
//!                                           │      batch       │
//!                                           └────────┬─────────┘
//!                                                    ▼
//!                                  ┌───────────────────────────────────┐
//!                                  │ KeyspaceForest                    │
//!                                  │ string │ list │ set │ hash │ zset │
//!                                  └───────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Exact sizing, first 100k keys
//! keyspace-analyzer 127.0.0.1:6379
//!
//! # Sampled sizing of session hashes only
//! keyspace-analyzer redis://:secret@cache:6380 --sampled -t hash -m 'session:*'
//!
//! # Browse analyses over HTTP
//! keyspace-analyzer serve --port 8090
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod sizing;
pub mod store;
pub mod tree;
pub mod types;

#[cfg(feature = "server")]
pub mod server;

pub use config::{AnalysisConfig, AnalyzeRequest, CliArgs, RedisTarget};
pub use error::{AnalyzerError, Result};
pub use pipeline::{AnalysisHandle, AnalysisReport, AnalysisSummary, Analyzer};
pub use session::{SessionManager, SessionState, SessionStatus};
pub use tree::{top_children, ChildSummary, KeyspaceForest, NamespaceTree, SharedForest, SortBy};
pub use types::{KeyRecord, SizingMode, TypeFilter, ValueType};
