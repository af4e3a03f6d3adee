//! Records: field-name to value maps.
//!
//! A record is schema-agnostic on its own; the [`crate::schema::Schema`]
//! decides which fields are keys and how records order. `BTreeMap` keeps the
//! serialized form deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::key::KeyValue;

/// A single record: named field values.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record(BTreeMap<String, KeyValue>);

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record from `(name, value)` entries.
    #[must_use]
    pub fn from_entries<N, I>(entries: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, KeyValue)>,
    {
        Self(
            entries
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    /// Sets a field value, replacing any existing value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<KeyValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Gets a field value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&KeyValue> {
        self.0.get(name)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(name, value)` pairs in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &KeyValue)> {
        self.0.iter()
    }
}
