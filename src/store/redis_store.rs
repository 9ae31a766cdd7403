//! Redis-backed store connections
//!
//! Each pipeline stage dials its own multiplexed connection. Per-batch
//! commands go out as one explicit pipeline so a batch costs a single round
//! trip; replies are matched to requests by position.

use super::{preview_json, KeyInspection, ScanPage, StoreConnection, StoreConnector, ValueSample};
use crate::config::RedisTarget;
use crate::error::{StoreError, StoreResult};
use crate::types::{KeyRecord, ValueType};

use redis::{aio::MultiplexedConnection, Client, FromRedisValue, IntoConnectionInfo, Value};

/// Dials [`RedisConnection`]s to one target
#[derive(Debug, Clone)]
pub struct RedisConnector {
    client: Client,
    target: RedisTarget,
}

impl RedisConnector {
    /// Build a client for `target`. No I/O happens until [`connect`].
    ///
    /// [`connect`]: StoreConnector::connect
    pub fn new(target: &RedisTarget) -> StoreResult<Self> {
        let failed = |e: redis::RedisError| StoreError::ConnectionFailed {
            target: target.to_string(),
            reason: e.to_string(),
        };

        let mut info = (target.host.as_str(), target.port)
            .into_connection_info()
            .map_err(failed)?;
        info.redis.db = target.db;
        info.redis.password = target.password.clone();

        let client = Client::open(info).map_err(failed)?;
        Ok(Self {
            client,
            target: target.clone(),
        })
    }
}

#[async_trait::async_trait]
impl StoreConnector for RedisConnector {
    type Connection = RedisConnection;

    fn target(&self) -> String {
        self.target.to_string()
    }

    async fn connect(&self) -> StoreResult<RedisConnection> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::ConnectionFailed {
                target: self.target.to_string(),
                reason: e.to_string(),
            })?;
        Ok(RedisConnection { conn })
    }
}

/// One multiplexed connection
pub struct RedisConnection {
    conn: MultiplexedConnection,
}

impl RedisConnection {
    async fn pipeline<T: FromRedisValue>(
        &mut self,
        command: &'static str,
        pipe: &redis::Pipeline,
    ) -> StoreResult<T> {
        pipe.query_async(&mut self.conn)
            .await
            .map_err(|e| StoreError::command(command, e))
    }
}

/// Positional reader over a heterogeneous pipeline reply
struct Replies<'a> {
    command: &'static str,
    values: std::slice::Iter<'a, Value>,
}

impl<'a> Replies<'a> {
    fn new(command: &'static str, values: &'a [Value]) -> Self {
        Self {
            command,
            values: values.iter(),
        }
    }

    fn next<T: FromRedisValue>(&mut self) -> StoreResult<T> {
        let value = self
            .values
            .next()
            .ok_or_else(|| StoreError::unexpected(self.command, "pipeline reply too short"))?;
        redis::from_redis_value(value).map_err(|e| StoreError::unexpected(self.command, e))
    }
}

/// Split a flat `[a1, b1, a2, b2, ...]` reply into its two columns
fn unzip_pairs(flat: Vec<Vec<u8>>) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
    let mut firsts = Vec::with_capacity(flat.len() / 2);
    let mut seconds = Vec::with_capacity(flat.len() / 2);
    let mut iter = flat.into_iter();
    while let (Some(a), Some(b)) = (iter.next(), iter.next()) {
        firsts.push(a);
        seconds.push(b);
    }
    (firsts, seconds)
}

fn queue_sample(pipe: &mut redis::Pipeline, record: &KeyRecord, count: usize) {
    let key = record.key.as_str();
    let last = count as i64 - 1;
    match record.value_type {
        ValueType::String => {
            pipe.cmd("STRLEN").arg(key);
        }
        ValueType::List => {
            pipe.cmd("LLEN").arg(key);
            pipe.cmd("LRANGE").arg(key).arg(0).arg(last);
        }
        ValueType::Set => {
            pipe.cmd("SCARD").arg(key);
            pipe.cmd("SRANDMEMBER").arg(key).arg(count);
        }
        ValueType::Hash => {
            pipe.cmd("HLEN").arg(key);
            pipe.cmd("HSCAN").arg(key).arg(0).arg("COUNT").arg(count);
        }
        ValueType::Zset => {
            pipe.cmd("ZCARD").arg(key);
            pipe.cmd("ZRANGE").arg(key).arg(0).arg(last);
        }
    }
}

/// `HSCAN`'s `COUNT` is only a hint: small hashes come back whole, so the
/// pairs are cut to `count` here.
fn read_sample(
    replies: &mut Replies<'_>,
    value_type: ValueType,
    count: usize,
) -> StoreResult<ValueSample> {
    let cardinality: i64 = replies.next()?;
    let sample = match value_type {
        ValueType::String => ValueSample {
            cardinality,
            ..Default::default()
        },
        ValueType::Hash => {
            let (_cursor, flat): (String, Vec<Vec<u8>>) = replies.next()?;
            let (mut members, mut values) = unzip_pairs(flat);
            members.truncate(count);
            values.truncate(count);
            ValueSample {
                cardinality,
                members,
                values,
            }
        }
        ValueType::List | ValueType::Set | ValueType::Zset => ValueSample {
            cardinality,
            members: replies.next()?,
            values: Vec::new(),
        },
    };
    Ok(sample)
}

#[async_trait::async_trait]
impl StoreConnection for RedisConnection {
    async fn scan(&mut self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        let (cursor, keys): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| StoreError::command("SCAN", e))?;
        Ok(ScanPage { cursor, keys })
    }

    async fn key_types(&mut self, keys: &[String]) -> StoreResult<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("TYPE").arg(key);
        }
        self.pipeline("TYPE", &pipe).await
    }

    async fn memory_usage(&mut self, keys: &[String]) -> StoreResult<Vec<Option<i64>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("MEMORY").arg("USAGE").arg(key);
        }
        self.pipeline("MEMORY USAGE", &pipe).await
    }

    async fn sample(&mut self, records: &[KeyRecord], count: usize) -> StoreResult<Vec<ValueSample>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for record in records {
            queue_sample(&mut pipe, record, count);
        }
        let values: Vec<Value> = self.pipeline("sample", &pipe).await?;

        let mut replies = Replies::new("sample", &values);
        records
            .iter()
            .map(|record| read_sample(&mut replies, record.value_type, count))
            .collect()
    }

    async fn inspect(&mut self, key: &str, limit: usize) -> StoreResult<KeyInspection> {
        let mut pipe = redis::pipe();
        pipe.cmd("TYPE").arg(key).cmd("TTL").arg(key);
        let (key_type, ttl): (String, i64) = self.pipeline("TYPE", &pipe).await?;

        let value_type = ValueType::from_type_reply(&key_type);
        let last = limit as i64 - 1;
        let mut pipe = redis::pipe();
        match value_type {
            Some(ValueType::String) => {
                pipe.cmd("STRLEN").arg(key).cmd("GET").arg(key);
            }
            Some(ValueType::List) => {
                pipe.cmd("LLEN").arg(key).cmd("LRANGE").arg(key).arg(0).arg(last);
            }
            Some(ValueType::Set) => {
                pipe.cmd("SCARD").arg(key);
                pipe.cmd("SSCAN").arg(key).arg(0).arg("COUNT").arg(limit);
            }
            Some(ValueType::Hash) => {
                pipe.cmd("HLEN").arg(key);
                pipe.cmd("HSCAN").arg(key).arg(0).arg("COUNT").arg(limit);
            }
            Some(ValueType::Zset) => {
                pipe.cmd("ZCARD").arg(key);
                pipe.cmd("ZRANGE").arg(key).arg(0).arg(last).arg("WITHSCORES");
            }
            None => {
                return Ok(KeyInspection {
                    key: key.to_string(),
                    key_type,
                    ttl,
                    length: 0,
                    value: serde_json::Value::Null,
                });
            }
        }

        let values: Vec<Value> = self.pipeline("inspect", &pipe).await?;
        let mut replies = Replies::new("inspect", &values);
        let length: i64 = replies.next()?;

        let (mut members, mut column) = match value_type {
            Some(ValueType::String) => {
                let body: Option<Vec<u8>> = replies.next()?;
                (body.into_iter().collect(), Vec::new())
            }
            Some(ValueType::List) => (replies.next()?, Vec::new()),
            Some(ValueType::Set) => {
                let (_cursor, members): (String, Vec<Vec<u8>>) = replies.next()?;
                (members, Vec::new())
            }
            Some(ValueType::Hash) => {
                let (_cursor, flat): (String, Vec<Vec<u8>>) = replies.next()?;
                unzip_pairs(flat)
            }
            Some(ValueType::Zset) => unzip_pairs(replies.next()?),
            None => (Vec::new(), Vec::new()),
        };
        // SSCAN/HSCAN treat COUNT as a hint
        members.truncate(limit);
        column.truncate(limit);

        Ok(KeyInspection {
            key: key.to_string(),
            key_type,
            ttl,
            length,
            value: preview_json(value_type, &members, &column),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unzip_pairs_drops_dangling_entry() {
        let flat = vec![b"f1".to_vec(), b"v1".to_vec(), b"f2".to_vec(), b"v2".to_vec(), b"x".to_vec()];
        let (fields, values) = unzip_pairs(flat);
        assert_eq!(fields, vec![b"f1".to_vec(), b"f2".to_vec()]);
        assert_eq!(values, vec![b"v1".to_vec(), b"v2".to_vec()]);
    }

    #[test]
    fn test_read_sample_positional() {
        let values = vec![
            Value::Int(3),
            Value::Array(vec![
                Value::BulkString(b"a".to_vec()),
                Value::BulkString(b"bb".to_vec()),
            ]),
            Value::Int(11),
        ];
        let mut replies = Replies::new("sample", &values);

        let list = read_sample(&mut replies, ValueType::List, 5).unwrap();
        assert_eq!(list.cardinality, 3);
        assert_eq!(list.members.len(), 2);

        let string = read_sample(&mut replies, ValueType::String, 5).unwrap();
        assert_eq!(string.cardinality, 11);
        assert!(string.members.is_empty());

        assert!(read_sample(&mut replies, ValueType::Set, 5).is_err());
    }

    #[test]
    fn test_hash_sample_capped_when_hscan_returns_everything() {
        let flat: Vec<Value> = (0..20)
            .flat_map(|i| {
                [
                    Value::BulkString(format!("field{i}").into_bytes()),
                    Value::BulkString(format!("value{i}").into_bytes()),
                ]
            })
            .collect();
        let values = vec![
            Value::Int(20),
            Value::Array(vec![Value::BulkString(b"0".to_vec()), Value::Array(flat)]),
        ];
        let mut replies = Replies::new("sample", &values);

        let hash = read_sample(&mut replies, ValueType::Hash, 5).unwrap();
        assert_eq!(hash.cardinality, 20);
        assert_eq!(hash.members.len(), 5);
        assert_eq!(hash.values.len(), 5);
        assert_eq!(hash.members[0], b"field0".to_vec());
        assert_eq!(hash.values[4], b"value4".to_vec());
    }

    #[test]
    fn test_connector_targets_without_io() {
        let target: RedisTarget = "redis://:secret@cache.local:6380/2".parse().unwrap();
        let connector = RedisConnector::new(&target).unwrap();
        assert_eq!(connector.target(), "cache.local:6380/2");
    }
}
