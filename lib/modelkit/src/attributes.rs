//! Ordered attribute bag.
//!
//! Holds the column values of a record: the payload of an insert or update,
//! or the columns of a fetched row. Columns keep the order in which they were
//! first set, which is also the order their values are bound in.

use serde::de::DeserializeOwned;

use crate::{ModelError, Value};

/// Ordered mapping from column name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: Vec<(String, Value)>,
}

/// A fetched row is an attribute bag in result-column order.
pub type Row = Attributes;

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column. An existing column keeps its position.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn get_str(&self, column: &str) -> Option<String> {
        match self.get(column)? {
            Value::Null => None,
            value => Some(value.to_string()),
        }
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(Value::as_bool)
    }

    pub fn columns(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Values in column order, ready for binding.
    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, value)| value.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.entries
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }

    /// Materialize into a typed record.
    ///
    /// Null columns are omitted so `Option` fields and `#[serde(default)]`
    /// behave the same as for a missing column.
    pub fn into_model<T: DeserializeOwned>(self) -> Result<T, ModelError> {
        let obj: serde_json::Map<String, serde_json::Value> = self
            .entries
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| (name, value.to_json()))
            .collect();
        Ok(serde_json::from_value(serde_json::Value::Object(obj))?)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        for (column, value) in iter {
            attributes.insert(column, value);
        }
        attributes
    }
}
