//! In-process keyspace implementing the store traits
//!
//! Cursor semantics follow Redis: the cursor is a position in the keyspace,
//! `COUNT` bounds how many slots one call visits, and `MATCH` filters after
//! the visit, so a page may come back short or empty before the scan ends.

use super::{preview_json, KeyInspection, ScanPage, StoreConnection, StoreConnector, ValueSample};
use crate::error::{StoreError, StoreResult};
use crate::types::{KeyRecord, ValueType};

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// A value held by [`MemoryStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    String(Vec<u8>),
    List(Vec<Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
    Hash(BTreeMap<Vec<u8>, Vec<u8>>),
    /// Members with scores, kept in score order
    Zset(Vec<(Vec<u8>, f64)>),
    /// Any other type, by its `TYPE` name (e.g. `stream`)
    Other(String),
}

impl StoredValue {
    pub fn string(value: impl AsRef<[u8]>) -> Self {
        StoredValue::String(value.as_ref().to_vec())
    }

    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        StoredValue::List(items.into_iter().map(|t| t.as_ref().to_vec()).collect())
    }

    pub fn set<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        StoredValue::Set(items.into_iter().map(|t| t.as_ref().to_vec()).collect())
    }

    pub fn hash<I, F, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (F, V)>,
        F: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        StoredValue::Hash(
            pairs
                .into_iter()
                .map(|(f, v)| (f.as_ref().to_vec(), v.as_ref().to_vec()))
                .collect(),
        )
    }

    pub fn zset<I, T>(members: I) -> Self
    where
        I: IntoIterator<Item = (T, f64)>,
        T: AsRef<[u8]>,
    {
        let unique: BTreeMap<Vec<u8>, f64> = members
            .into_iter()
            .map(|(m, s)| (m.as_ref().to_vec(), s))
            .collect();
        let mut members: Vec<(Vec<u8>, f64)> = unique.into_iter().collect();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        StoredValue::Zset(members)
    }

    /// `TYPE` reply for this value
    pub fn type_name(&self) -> &str {
        match self {
            StoredValue::String(_) => "string",
            StoredValue::List(_) => "list",
            StoredValue::Set(_) => "set",
            StoredValue::Hash(_) => "hash",
            StoredValue::Zset(_) => "zset",
            StoredValue::Other(name) => name,
        }
    }

    /// Element count, or byte length for strings
    fn cardinality(&self) -> i64 {
        let n = match self {
            StoredValue::String(v) => v.len(),
            StoredValue::List(v) => v.len(),
            StoredValue::Set(v) => v.len(),
            StoredValue::Hash(v) => v.len(),
            StoredValue::Zset(v) => v.len(),
            StoredValue::Other(_) => 0,
        };
        n as i64
    }

    /// Payload bytes: elements, hash fields and values, 8 per zset score
    fn payload_bytes(&self) -> i64 {
        let n = match self {
            StoredValue::String(v) => v.len(),
            StoredValue::List(v) => v.iter().map(Vec::len).sum(),
            StoredValue::Set(v) => v.iter().map(Vec::len).sum(),
            StoredValue::Hash(v) => v.iter().map(|(f, v)| f.len() + v.len()).sum(),
            StoredValue::Zset(v) => v.iter().map(|(m, _)| m.len() + 8).sum(),
            StoredValue::Other(_) => 0,
        };
        n as i64
    }

    /// First `count` members, plus parallel values for hashes and zsets
    fn head(&self, count: usize) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        match self {
            StoredValue::String(v) => (vec![v.clone()], Vec::new()),
            StoredValue::List(v) => (v.iter().take(count).cloned().collect(), Vec::new()),
            StoredValue::Set(v) => (v.iter().take(count).cloned().collect(), Vec::new()),
            StoredValue::Hash(v) => v
                .iter()
                .take(count)
                .map(|(f, v)| (f.clone(), v.clone()))
                .unzip(),
            StoredValue::Zset(v) => v
                .iter()
                .take(count)
                .map(|(m, s)| (m.clone(), s.to_string().into_bytes()))
                .unzip(),
            StoredValue::Other(_) => (Vec::new(), Vec::new()),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    ttl: Option<i64>,
    memory: Option<i64>,
}

#[derive(Debug, Default)]
struct Inner {
    keys: BTreeMap<Vec<u8>, Entry>,
    /// Successful calls left per command before injected failures begin
    fail_after: HashMap<&'static str, usize>,
    calls: HashMap<&'static str, usize>,
    connect_delay: Duration,
}

impl Inner {
    fn record_call(&mut self, command: &'static str) -> StoreResult<()> {
        *self.calls.entry(command).or_default() += 1;
        match self.fail_after.get_mut(command) {
            Some(0) => Err(StoreError::command(command, "injected failure")),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn lookup(&self, key: &str) -> Option<&Entry> {
        self.keys.get(key.as_bytes())
    }

    fn memory_usage(key: &[u8], entry: &Entry) -> i64 {
        entry
            .memory
            .unwrap_or_else(|| 56 + key.len() as i64 + entry.value.payload_bytes())
    }
}

/// In-memory keyspace shared by every connection dialled from it
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    name: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::default(),
        }
    }

    /// Set a key, replacing any previous value
    pub fn insert(&self, key: impl AsRef<[u8]>, value: StoredValue) {
        self.inner.lock().keys.insert(
            key.as_ref().to_vec(),
            Entry {
                value,
                ttl: None,
                memory: None,
            },
        );
    }

    pub fn remove(&self, key: impl AsRef<[u8]>) -> bool {
        self.inner.lock().keys.remove(key.as_ref()).is_some()
    }

    /// Set a TTL in seconds on an existing key
    pub fn expire(&self, key: impl AsRef<[u8]>, seconds: i64) -> bool {
        match self.inner.lock().keys.get_mut(key.as_ref()) {
            Some(entry) => {
                entry.ttl = Some(seconds);
                true
            }
            None => false,
        }
    }

    /// Fix the `MEMORY USAGE` reply for a key. Without an override the reply
    /// is 56 bytes plus the key length plus the payload bytes.
    pub fn set_memory_usage(&self, key: impl AsRef<[u8]>, bytes: i64) -> bool {
        match self.inner.lock().keys.get_mut(key.as_ref()) {
            Some(entry) => {
                entry.memory = Some(bytes);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Let `command` succeed `calls` more times, then fail every call.
    ///
    /// Command names are `connect`, `SCAN`, `TYPE`, `MEMORY USAGE`,
    /// `sample` and `inspect`.
    pub fn fail_after(&self, command: &'static str, calls: usize) {
        self.inner.lock().fail_after.insert(command, calls);
    }

    /// Delay every `connect` by `delay`
    pub fn set_connect_delay(&self, delay: Duration) {
        self.inner.lock().connect_delay = delay;
    }

    /// How many times `command` has been issued
    pub fn call_count(&self, command: &str) -> usize {
        self.inner.lock().calls.get(command).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl StoreConnector for MemoryStore {
    type Connection = MemoryConnection;

    fn target(&self) -> String {
        self.name.clone()
    }

    async fn connect(&self) -> StoreResult<MemoryConnection> {
        let delay = self.inner.lock().connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner
            .lock()
            .record_call("connect")
            .map_err(|e| StoreError::ConnectionFailed {
                target: self.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(MemoryConnection {
            inner: Arc::clone(&self.inner),
        })
    }
}

/// Connection to a [`MemoryStore`]
pub struct MemoryConnection {
    inner: Arc<Mutex<Inner>>,
}

#[async_trait::async_trait]
impl StoreConnection for MemoryConnection {
    async fn scan(&mut self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        let mut inner = self.inner.lock();
        inner.record_call("SCAN")?;

        let start = usize::try_from(cursor).unwrap_or(usize::MAX);
        let visit = count.max(1);
        let keys: Vec<Vec<u8>> = inner
            .keys
            .keys()
            .skip(start)
            .take(visit)
            .filter(|k| glob_match(pattern.as_bytes(), k))
            .cloned()
            .collect();

        let next = start.saturating_add(visit);
        let cursor = if next >= inner.keys.len() { 0 } else { next as u64 };
        Ok(ScanPage { cursor, keys })
    }

    async fn key_types(&mut self, keys: &[String]) -> StoreResult<Vec<String>> {
        let mut inner = self.inner.lock();
        inner.record_call("TYPE")?;
        Ok(keys
            .iter()
            .map(|k| {
                inner
                    .lookup(k)
                    .map(|e| e.value.type_name().to_string())
                    .unwrap_or_else(|| "none".to_string())
            })
            .collect())
    }

    async fn memory_usage(&mut self, keys: &[String]) -> StoreResult<Vec<Option<i64>>> {
        let mut inner = self.inner.lock();
        inner.record_call("MEMORY USAGE")?;
        Ok(keys
            .iter()
            .map(|k| inner.lookup(k).map(|e| Inner::memory_usage(k.as_bytes(), e)))
            .collect())
    }

    async fn sample(&mut self, records: &[KeyRecord], count: usize) -> StoreResult<Vec<ValueSample>> {
        let mut inner = self.inner.lock();
        inner.record_call("sample")?;
        Ok(records
            .iter()
            .map(|record| match inner.lookup(&record.key) {
                Some(entry) if record.value_type == ValueType::String => ValueSample {
                    cardinality: entry.value.cardinality(),
                    ..Default::default()
                },
                Some(entry) => {
                    let (members, values) = entry.value.head(count);
                    // HSCAN returns fields and values; the rest only members
                    let values = if record.value_type == ValueType::Hash {
                        values
                    } else {
                        Vec::new()
                    };
                    ValueSample {
                        cardinality: entry.value.cardinality(),
                        members,
                        values,
                    }
                }
                None => ValueSample::default(),
            })
            .collect())
    }

    async fn inspect(&mut self, key: &str, limit: usize) -> StoreResult<KeyInspection> {
        let mut inner = self.inner.lock();
        inner.record_call("inspect")?;

        let Some(entry) = inner.lookup(key) else {
            return Ok(KeyInspection {
                key: key.to_string(),
                key_type: "none".to_string(),
                ttl: -2,
                length: 0,
                value: serde_json::Value::Null,
            });
        };

        let key_type = entry.value.type_name().to_string();
        let (members, values) = entry.value.head(limit);
        Ok(KeyInspection {
            key: key.to_string(),
            ttl: entry.ttl.unwrap_or(-1),
            length: entry.value.cardinality(),
            value: preview_json(ValueType::from_type_reply(&key_type), &members, &values),
            key_type,
        })
    }
}

/// Redis-style glob match: `*`, `?`, `[abc]`, `[a-z]`, `[^x]` and `\` escapes
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                b'*' => {
                    while p < pattern.len() && pattern[p] == b'*' {
                        p += 1;
                    }
                    if p == pattern.len() {
                        return true;
                    }
                    backtrack = Some((p, t));
                    continue;
                }
                b'?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                b'[' => {
                    if let Some((matched, next)) = match_class(pattern, p, text[t]) {
                        if matched {
                            p = next;
                            t += 1;
                            continue;
                        }
                    }
                }
                b'\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == text[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                c => {
                    if c == text[t] {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
            }
        }
        match backtrack {
            Some((star_p, star_t)) => {
                p = star_p;
                t = star_t + 1;
                backtrack = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Match `byte` against the class opening at `pattern[open]`. Returns the
/// result and the index after the closing bracket, or `None` when the class
/// is unterminated.
fn match_class(pattern: &[u8], open: usize, byte: u8) -> Option<(bool, usize)> {
    let mut i = open + 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() && pattern[i] != b']' {
        if pattern[i] == b'\\' && i + 1 < pattern.len() {
            matched |= pattern[i + 1] == byte;
            i += 2;
        } else if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (lo, hi) = if pattern[i] <= pattern[i + 2] {
                (pattern[i], pattern[i + 2])
            } else {
                (pattern[i + 2], pattern[i])
            };
            matched |= (lo..=hi).contains(&byte);
            i += 3;
        } else {
            matched |= pattern[i] == byte;
            i += 1;
        }
    }

    if i >= pattern.len() {
        return None;
    }
    Some((matched != negate, i + 1))
}
