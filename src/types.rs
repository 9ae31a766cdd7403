//! Core data types shared by the pipeline stages and the namespace tree

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The five collection types the analyzer knows how to size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    List,
    Set,
    Hash,
    Zset,
}

impl ValueType {
    /// All classified types, in display order
    pub const ALL: [ValueType; 5] = [
        ValueType::String,
        ValueType::List,
        ValueType::Set,
        ValueType::Hash,
        ValueType::Zset,
    ];

    /// Name as reported by the store's `TYPE` command
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::List => "list",
            ValueType::Set => "set",
            ValueType::Hash => "hash",
            ValueType::Zset => "zset",
        }
    }

    /// Classify a `TYPE` reply. Anything else (`none`, `stream`, module
    /// types) is unclassified.
    pub fn from_type_reply(reply: &str) -> Option<Self> {
        match reply {
            "string" => Some(ValueType::String),
            "list" => Some(ValueType::List),
            "set" => Some(ValueType::Set),
            "hash" => Some(ValueType::Hash),
            "zset" => Some(ValueType::Zset),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValueType::from_type_reply(s.trim()).ok_or_else(|| ConfigError::InvalidValueType {
            name: s.trim().to_string(),
        })
    }
}

/// One observation flowing through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    /// Key name
    pub key: String,

    /// Classified value type
    pub value_type: ValueType,

    /// Estimated size in bytes (0 until the size stage runs)
    pub size: i64,
}

impl KeyRecord {
    /// Create an unsized record
    pub fn new(key: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            key: key.into(),
            value_type,
            size: 0,
        }
    }
}

/// Set of value types to keep; empty keeps all five
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeFilter {
    types: BTreeSet<ValueType>,
}

impl TypeFilter {
    /// Filter that keeps every classified type
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter built from explicit types
    pub fn only<I: IntoIterator<Item = ValueType>>(types: I) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }

    /// Parse a comma-separated list such as `"string,hash"`
    pub fn parse_list(list: &str) -> Result<Self, ConfigError> {
        let types = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ValueType::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { types })
    }

    /// Classify a `TYPE` reply and apply the filter
    pub fn admit(&self, reply: &str) -> Option<ValueType> {
        let value_type = ValueType::from_type_reply(reply)?;
        if self.types.is_empty() || self.types.contains(&value_type) {
            Some(value_type)
        } else {
            None
        }
    }

    /// True when no explicit types are configured
    pub fn is_all(&self) -> bool {
        self.types.is_empty()
    }

    /// The types this filter admits
    pub fn admitted(&self) -> Vec<ValueType> {
        if self.types.is_empty() {
            ValueType::ALL.to_vec()
        } else {
            self.types.iter().copied().collect()
        }
    }
}

/// How the size stage estimates a key's footprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingMode {
    /// One `MEMORY USAGE` per key
    #[default]
    Exact,
    /// Cardinality plus a fixed-size sample, extrapolated per type
    Sampled,
}

impl fmt::Display for SizingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizingMode::Exact => f.write_str("exact"),
            SizingMode::Sampled => f.write_str("sampled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_reply_classification() {
        assert_eq!(ValueType::from_type_reply("zset"), Some(ValueType::Zset));
        assert_eq!(ValueType::from_type_reply("stream"), None);
        assert_eq!(ValueType::from_type_reply("none"), None);
    }

    #[test]
    fn test_filter_empty_admits_all() {
        let filter = TypeFilter::all();
        for t in ValueType::ALL {
            assert_eq!(filter.admit(t.as_str()), Some(t));
        }
        assert_eq!(filter.admit("stream"), None);
    }

    #[test]
    fn test_filter_parse_list() {
        let filter = TypeFilter::parse_list("string, hash").unwrap();
        assert_eq!(filter.admit("hash"), Some(ValueType::Hash));
        assert_eq!(filter.admit("list"), None);
        assert_eq!(filter.admitted(), vec![ValueType::String, ValueType::Hash]);

        let err = TypeFilter::parse_list("string,bitmap").unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValueType {
                name: "bitmap".into()
            }
        );
    }

    #[test]
    fn test_filter_blank_list_is_all() {
        assert!(TypeFilter::parse_list("").unwrap().is_all());
        assert!(TypeFilter::parse_list(" , ").unwrap().is_all());
    }
}
