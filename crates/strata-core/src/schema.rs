//! Table schemas: row keys, sort keys, and value fields.
//!
//! The schema is the single source of truth for how records are ordered.
//! Row-key fields define partition placement and the primary sort order;
//! sort-key fields act as tiebreakers within equal row keys; value fields
//! carry payload and never affect ordering.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::key::{Key, KeyValue};
use crate::record::Record;

/// The type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    /// 64-bit signed integer.
    Int64,
    /// UTF-8 string.
    String,
    /// Raw bytes.
    Bytes,
}

impl ColumnType {
    /// Returns true if the given value matches this column type.
    #[must_use]
    pub const fn matches(&self, value: &KeyValue) -> bool {
        matches!(
            (self, value),
            (Self::Int64, KeyValue::Int64(_))
                | (Self::String, KeyValue::String(_))
                | (Self::Bytes, KeyValue::Bytes(_))
        )
    }
}

/// A named, typed schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Field name, unique within the schema.
    pub name: String,
    /// Field type.
    pub column_type: ColumnType,
}

impl Field {
    /// Creates a new field.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A table schema.
///
/// Constructed through [`Schema::new`], which validates that at least one
/// row-key field exists and that field names are unique across all three
/// sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    row_key_fields: Vec<Field>,
    sort_key_fields: Vec<Field>,
    value_fields: Vec<Field>,
}

impl Schema {
    /// Creates a validated schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if there are no row-key fields or if
    /// any field name is duplicated.
    pub fn new(
        row_key_fields: Vec<Field>,
        sort_key_fields: Vec<Field>,
        value_fields: Vec<Field>,
    ) -> Result<Self> {
        if row_key_fields.is_empty() {
            return Err(Error::invalid_schema("at least one row-key field required"));
        }
        let mut seen = HashSet::new();
        for field in row_key_fields
            .iter()
            .chain(&sort_key_fields)
            .chain(&value_fields)
        {
            if !seen.insert(field.name.as_str()) {
                return Err(Error::invalid_schema(format!(
                    "duplicate field name: {}",
                    field.name
                )));
            }
        }
        Ok(Self {
            row_key_fields,
            sort_key_fields,
            value_fields,
        })
    }

    /// Convenience constructor for the common single-int-row-key case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if `value_fields` duplicates the key name.
    pub fn with_int64_key(
        key_name: impl Into<String>,
        value_fields: Vec<Field>,
    ) -> Result<Self> {
        Self::new(
            vec![Field::new(key_name, ColumnType::Int64)],
            Vec::new(),
            value_fields,
        )
    }

    /// Returns the row-key fields in order.
    #[must_use]
    pub fn row_key_fields(&self) -> &[Field] {
        &self.row_key_fields
    }

    /// Returns the sort-key fields in order.
    #[must_use]
    pub fn sort_key_fields(&self) -> &[Field] {
        &self.sort_key_fields
    }

    /// Returns the value fields in order.
    #[must_use]
    pub fn value_fields(&self) -> &[Field] {
        &self.value_fields
    }

    /// Returns the number of row-key dimensions.
    #[must_use]
    pub fn key_dimensions(&self) -> usize {
        self.row_key_fields.len()
    }

    /// Projects the row key out of a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordMismatch`] if a row-key field is absent or has
    /// the wrong type.
    pub fn row_key_of(&self, record: &Record) -> Result<Key> {
        self.project(record, &self.row_key_fields)
    }

    /// Projects the full ordering key (row keys then sort keys) out of a record.
    ///
    /// The merge orders records by this key, so sort-key fields act as
    /// tiebreakers exactly once, with no per-comparison field lookups.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordMismatch`] if any key field is absent or has
    /// the wrong type.
    pub fn ordering_key_of(&self, record: &Record) -> Result<Key> {
        let mut values = Vec::with_capacity(self.row_key_fields.len() + self.sort_key_fields.len());
        for field in self.row_key_fields.iter().chain(&self.sort_key_fields) {
            values.push(self.field_value(record, field)?);
        }
        Ok(Key::new(values))
    }

    /// Compares two records by row key, then sort keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordMismatch`] if either record is missing a key field.
    pub fn compare(&self, a: &Record, b: &Record) -> Result<Ordering> {
        Ok(self.ordering_key_of(a)?.cmp(&self.ordering_key_of(b)?))
    }

    fn project(&self, record: &Record, fields: &[Field]) -> Result<Key> {
        let mut values = Vec::with_capacity(fields.len());
        for field in fields {
            values.push(self.field_value(record, field)?);
        }
        Ok(Key::new(values))
    }

    fn field_value(&self, record: &Record, field: &Field) -> Result<KeyValue> {
        let value = record
            .get(&field.name)
            .ok_or_else(|| Error::record_mismatch(format!("missing key field '{}'", field.name)))?;
        if !field.column_type.matches(value) {
            return Err(Error::record_mismatch(format!(
                "field '{}' expected {:?}, got {}",
                field.name,
                field.column_type,
                value.type_label()
            )));
        }
        Ok(value.clone())
    }
}
