//! Remote records.

use chrono::{DateTime, Utc};
use goalsync_core::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a remote record, unique within its kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a record id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A typed field value as the remote store understands it.
///
/// Booleans travel as integers (`0`/`1`); nested structures travel as an
/// embedded text blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum FieldValue {
    /// UTF-8 string.
    String(String),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Double(f64),
    /// Point in time.
    Date(DateTime<Utc>),
    /// Embedded text document.
    Blob(String),
}

impl FieldValue {
    /// Encodes a boolean as an integer.
    pub fn bool(value: bool) -> Self {
        FieldValue::Int(i64::from(value))
    }

    /// Returns the string content of a `String` or `Blob`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) | FieldValue::Blob(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an integer, truncating finite doubles.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Double(d) if d.is_finite() => Some(*d as i64),
            _ => None,
        }
    }

    /// Returns the value as a double, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Double(d) => Some(*d),
            FieldValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the value as a boolean (non-zero integer).
    pub fn as_bool(&self) -> Option<bool> {
        self.as_int().map(|i| i != 0)
    }

    /// Returns the value as a date.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the name of the value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Int(_) => "int",
            FieldValue::Double(_) => "double",
            FieldValue::Date(_) => "date",
            FieldValue::Blob(_) => "blob",
        }
    }
}

/// A record in the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Record type.
    pub kind: EntityKind,
    /// Record name.
    pub id: RecordId,
    /// Field dictionary.
    pub fields: BTreeMap<String, FieldValue>,
    /// Server version tag; `None` for a record never saved.
    pub change_tag: Option<String>,
    /// Server-side modification time, set by the store on save.
    pub modified_at: Option<DateTime<Utc>>,
}

impl RemoteRecord {
    /// Field carrying the client's wall-clock modification time.
    pub const MODIFIED_AT_FIELD: &'static str = "modifiedAt";

    /// Creates an empty, never-saved record.
    pub fn new(kind: EntityKind, id: impl Into<RecordId>) -> Self {
        Self {
            kind,
            id: id.into(),
            fields: BTreeMap::new(),
            change_tag: None,
            modified_at: None,
        }
    }

    /// Sets a field.
    pub fn set(&mut self, name: &str, value: FieldValue) -> &mut Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Sets a field, builder style.
    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.set(name, value);
        self
    }

    /// Gets a field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// String field, or empty.
    pub fn string_or_default(&self, name: &str) -> String {
        self.get(name)
            .and_then(FieldValue::as_str)
            .map(str::to_string)
            .unwrap_or_default()
    }

    /// Integer field, or zero.
    pub fn int_or_default(&self, name: &str) -> i64 {
        self.get(name).and_then(FieldValue::as_int).unwrap_or(0)
    }

    /// Double field, or zero.
    pub fn double_or_default(&self, name: &str) -> f64 {
        self.get(name).and_then(FieldValue::as_f64).unwrap_or(0.0)
    }

    /// Boolean field, or false.
    pub fn bool_or_default(&self, name: &str) -> bool {
        self.get(name).and_then(FieldValue::as_bool).unwrap_or(false)
    }

    /// Date field, or the Unix epoch.
    pub fn date_or_default(&self, name: &str) -> DateTime<Utc> {
        self.get(name)
            .and_then(FieldValue::as_date)
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// The record's last modification time for conflict resolution.
    ///
    /// Prefers the client wall-clock time written with the record, then the
    /// server's modification time, then the epoch.
    pub fn modification_time(&self) -> DateTime<Utc> {
        self.get(Self::MODIFIED_AT_FIELD)
            .and_then(FieldValue::as_date)
            .or(self.modified_at)
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Copies every field of `other` over this record's fields.
    ///
    /// Fields only present here are kept, which is how a merge-then-save
    /// preserves remote fields this client does not know about.
    pub fn overlay(&mut self, other: &RemoteRecord) {
        for (name, value) in &other.fields {
            self.fields.insert(name.clone(), value.clone());
        }
    }
}
