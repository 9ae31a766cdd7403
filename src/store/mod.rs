//! Store boundary
//!
//! The pipeline talks to the key-value store only through these two traits.
//! [`RedisConnector`] speaks the Redis protocol; [`MemoryStore`] keeps a
//! keyspace in process for dry runs and tests.

mod memory;
mod redis_store;

pub use memory::{MemoryStore, StoredValue};
pub use redis_store::{RedisConnection, RedisConnector};

use crate::error::StoreResult;
use crate::types::{KeyRecord, ValueType};
use serde::Serialize;

/// One page of a cursor-based scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the next call; 0 means the scan is complete
    pub cursor: u64,
    /// Raw key bytes as returned by the store
    pub keys: Vec<Vec<u8>>,
}

/// Cardinality and a bounded sample of one value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueSample {
    /// Element count, or byte length for strings
    pub cardinality: i64,
    /// Sampled members (hash fields for hashes)
    pub members: Vec<Vec<u8>>,
    /// Sampled hash values, parallel to `members`; empty for other types
    pub values: Vec<Vec<u8>>,
}

/// Type, TTL and a bounded preview of one key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyInspection {
    pub key: String,
    /// Raw `TYPE` reply; `none` when the key does not exist
    pub key_type: String,
    /// Seconds to live; -1 without expiry, -2 when the key does not exist
    pub ttl: i64,
    /// Element count, or byte length for strings
    pub length: i64,
    /// Preview of at most `limit` elements
    pub value: serde_json::Value,
}

/// Dials connections to one store target
#[async_trait::async_trait]
pub trait StoreConnector: Clone + Send + Sync + 'static {
    type Connection: StoreConnection;

    /// Human-readable target, used for logs and session keys
    fn target(&self) -> String;

    /// Open a new connection
    async fn connect(&self) -> StoreResult<Self::Connection>;
}

/// Commands the analyzer issues against one connection
#[async_trait::async_trait]
pub trait StoreConnection: Send + 'static {
    /// `SCAN cursor MATCH pattern COUNT count`
    async fn scan(&mut self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage>;

    /// Pipelined `TYPE` per key, replies in request order
    async fn key_types(&mut self, keys: &[String]) -> StoreResult<Vec<String>>;

    /// Pipelined `MEMORY USAGE` per key; `None` when the key vanished
    async fn memory_usage(&mut self, keys: &[String]) -> StoreResult<Vec<Option<i64>>>;

    /// Pipelined cardinality and sample per record, replies in request order
    async fn sample(&mut self, records: &[KeyRecord], count: usize) -> StoreResult<Vec<ValueSample>>;

    /// Type, TTL and value preview of one key
    async fn inspect(&mut self, key: &str, limit: usize) -> StoreResult<KeyInspection>;
}

/// Build the JSON preview for a value of `value_type`.
///
/// Binary-safe: bytes that are not UTF-8 are rendered lossily.
pub(crate) fn preview_json(
    value_type: Option<ValueType>,
    members: &[Vec<u8>],
    values: &[Vec<u8>],
) -> serde_json::Value {
    use serde_json::{Map, Value};

    let text = |b: &Vec<u8>| Value::String(String::from_utf8_lossy(b).into_owned());
    match value_type {
        Some(ValueType::String) => members.first().map(text).unwrap_or(Value::Null),
        Some(ValueType::Hash) => Value::Object(
            members
                .iter()
                .zip(values)
                .map(|(f, v)| (String::from_utf8_lossy(f).into_owned(), text(v)))
                .collect::<Map<_, _>>(),
        ),
        Some(ValueType::Zset) => Value::Array(
            members
                .iter()
                .zip(values)
                .map(|(m, score)| {
                    serde_json::json!({
                        "member": String::from_utf8_lossy(m),
                        "score": String::from_utf8_lossy(score),
                    })
                })
                .collect(),
        ),
        Some(ValueType::List) | Some(ValueType::Set) => {
            Value::Array(members.iter().map(text).collect())
        }
        None => Value::Null,
    }
}
