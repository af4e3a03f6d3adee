//! Row key scalar values and multi-dimensional keys.
//!
//! Keys order records within sorted files and bound partition regions.
//! Floats are intentionally excluded: their ordering is not total across
//! serialization formats, and partition boundaries must be deterministic.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single scalar key value.
///
/// The serialized form is untagged: integers, strings, and byte arrays are
/// unambiguous in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    /// 64-bit signed integer.
    Int64(i64),
    /// UTF-8 string, ordered lexicographically.
    String(String),
    /// Raw bytes, ordered lexicographically.
    Bytes(Vec<u8>),
}

impl KeyValue {
    /// Returns a short label for the value's type, for error messages.
    #[must_use]
    pub const fn type_label(&self) -> &'static str {
        match self {
            Self::Int64(_) => "int64",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }

    const fn type_rank(&self) -> u8 {
        match self {
            Self::Int64(_) => 0,
            Self::String(_) => 1,
            Self::Bytes(_) => 2,
        }
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            // Schema validation prevents mixed-type comparisons on the same
            // dimension; rank ordering keeps Ord total anyway.
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for KeyValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// A multi-dimensional key: one [`KeyValue`] per row-key dimension.
///
/// Keys compare lexicographically dimension by dimension, which gives the
/// strict total order the merge and the partition tree both rely on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(Vec<KeyValue>);

impl Key {
    /// Creates a key from its dimension values.
    #[must_use]
    pub fn new(values: Vec<KeyValue>) -> Self {
        Self(values)
    }

    /// Creates a single-dimension key.
    #[must_use]
    pub fn of(value: impl Into<KeyValue>) -> Self {
        Self(vec![value.into()])
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Returns the value for one dimension, if present.
    #[must_use]
    pub fn value(&self, dimension: usize) -> Option<&KeyValue> {
        self.0.get(dimension)
    }

    /// Returns the dimension values as a slice.
    #[must_use]
    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}
