//! Flat, ordered record model used at the export boundary
//!
//! Typed sub-records are flattened into a `ClusterRecord` right before they
//! leave the pipeline. This is the only place the `"?"` and `"n/a"` sentinels
//! exist.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// Sentinel for a value that could not be determined
pub const UNKNOWN: &str = "?";

/// Sentinel for a value that does not apply to this cluster
pub const NOT_APPLICABLE: &str = "n/a";

/// A single scalar cell in an output row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    Int(i64),
    Bool(bool),
    Unknown,
    NotApplicable,
}

impl Cell {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Cell::Unknown)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Int(n) => write!(f, "{}", n),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Unknown => write!(f, "{}", UNKNOWN),
            Cell::NotApplicable => write!(f, "{}", NOT_APPLICABLE),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Int(n) => serializer.serialize_i64(*n),
            Cell::Bool(b) => serializer.serialize_bool(*b),
            Cell::Unknown => serializer.serialize_str(UNKNOWN),
            Cell::NotApplicable => serializer.serialize_str(NOT_APPLICABLE),
        }
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Int(n)
    }
}

impl From<u64> for Cell {
    fn from(n: u64) -> Self {
        Cell::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<u32> for Cell {
    fn from(n: u32) -> Self {
        Cell::Int(i64::from(n))
    }
}

impl From<u16> for Cell {
    fn from(n: u16) -> Self {
        Cell::Int(i64::from(n))
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Bool(b)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Unknown)
    }
}

/// Ordered mapping from column name to cell
///
/// Insertion order is column order. Inserting a key that already exists
/// replaces its value without moving the column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterRecord {
    fields: Vec<(String, Cell)>,
}

impl ClusterRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Cell>) -> Option<Cell> {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    /// Insert a field only if the key is not present yet
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<Cell>) {
        let key = key.into();
        if !self.contains_key(&key) {
            self.fields.push((key, value.into()));
        }
    }

    /// Merge a later stage into this record. Identical keys are overwritten in
    /// place, new keys are appended.
    pub fn merge(&mut self, later: ClusterRecord) {
        for (key, value) in later.fields {
            self.insert(key, value);
        }
    }

    /// Record with every key set to `"?"`
    pub fn unknown(keys: &[&str]) -> Self {
        keys.iter().map(|key| (*key, Cell::Unknown)).collect()
    }

    /// Append every key of `defaults` that this record does not hold yet
    pub fn fill_missing(&mut self, defaults: ClusterRecord) {
        for (key, value) in defaults.fields {
            self.insert_if_absent(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

}

impl<K: Into<String>, V: Into<Cell>> FromIterator<(K, V)> for ClusterRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = ClusterRecord::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

impl Serialize for ClusterRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
