//! Memory footprint estimates from sampled values
//!
//! Every estimate starts from a fixed per-key overhead of 56 bytes plus the
//! key length. Collections add a per-element cost derived from the average
//! sampled element size, scaled by the cardinality. When there is nothing to
//! extrapolate from (empty cardinality or no samples) the estimate covers
//! only the sampled elements.

use crate::store::ValueSample;
use crate::types::ValueType;

/// Elements sampled per key
pub const SAMPLE_SIZE: usize = 5;

/// Fixed per-key overhead
const KEY_OVERHEAD: i64 = 56;

/// List and set per-element overhead
const LIST_ENTRY_OVERHEAD: i64 = 2;

/// Hash per-entry overhead, split around the field and value bytes
const HASH_FIELD_OVERHEAD: i64 = 4 + 1;
const HASH_VALUE_OVERHEAD: i64 = 1 + 1;

/// Zset per-entry overhead, split around the member bytes, plus an 8-byte score
const ZSET_MEMBER_OVERHEAD: i64 = 5;
const ZSET_SCORE_OVERHEAD: i64 = 11 + 8;

fn key_size(key: &str) -> i64 {
    KEY_OVERHEAD + key.len() as i64
}

fn total_len(items: &[Vec<u8>]) -> i64 {
    items.iter().map(|i| i.len() as i64).sum()
}

/// String of `strlen` bytes
pub fn string_size(key: &str, strlen: i64) -> i64 {
    key_size(key) + 8 + strlen + 1
}

/// List (and set) of `cardinality` elements
pub fn list_size(key: &str, members: &[Vec<u8>], cardinality: i64) -> i64 {
    let total = total_len(members);
    let samples = members.len() as i64;
    if cardinality > 0 && samples > 0 {
        key_size(key) + cardinality * (LIST_ENTRY_OVERHEAD + total / samples)
    } else {
        key_size(key) + total + LIST_ENTRY_OVERHEAD * samples
    }
}

pub fn set_size(key: &str, members: &[Vec<u8>], cardinality: i64) -> i64 {
    list_size(key, members, cardinality)
}

/// Hash of `cardinality` entries; `fields` and `values` are parallel
pub fn hash_size(key: &str, fields: &[Vec<u8>], values: &[Vec<u8>], cardinality: i64) -> i64 {
    let samples = fields.len().min(values.len());
    let total_fields = total_len(&fields[..samples]);
    let total_values = total_len(&values[..samples]);
    let samples = samples as i64;
    if cardinality > 0 && samples > 0 {
        key_size(key)
            + cardinality
                * (HASH_FIELD_OVERHEAD
                    + total_fields / samples
                    + HASH_VALUE_OVERHEAD
                    + total_values / samples)
    } else {
        key_size(key)
            + HASH_FIELD_OVERHEAD * samples
            + total_fields
            + HASH_VALUE_OVERHEAD * samples
            + total_values
    }
}

/// Sorted set of `cardinality` members
pub fn zset_size(key: &str, members: &[Vec<u8>], cardinality: i64) -> i64 {
    let total = total_len(members);
    let samples = members.len() as i64;
    if cardinality > 0 && samples > 0 {
        key_size(key)
            + cardinality * (ZSET_MEMBER_OVERHEAD + total / samples + ZSET_SCORE_OVERHEAD)
    } else {
        key_size(key) + total + ZSET_MEMBER_OVERHEAD * samples + ZSET_SCORE_OVERHEAD * samples
    }
}

/// Estimate a key's footprint from its sample
pub fn estimate(key: &str, value_type: ValueType, sample: &ValueSample) -> i64 {
    match value_type {
        ValueType::String => string_size(key, sample.cardinality),
        ValueType::List => list_size(key, &sample.members, sample.cardinality),
        ValueType::Set => set_size(key, &sample.members, sample.cardinality),
        ValueType::Hash => hash_size(key, &sample.members, &sample.values, sample.cardinality),
        ValueType::Zset => zset_size(key, &sample.members, sample.cardinality),
    }
}
