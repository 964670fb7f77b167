use std::collections::HashMap;

use crate::error::{BridgeError, Result};

/// Driver-agnostic raw result of a query.
/// All values are text as rendered by the driver; `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQueryResult {
    /// Column labels in order
    pub columns: Vec<String>,
    /// Rows, where each row is a vector of values in column order
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawQueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }
}

/// One result row keyed by column label.
///
/// Labels that occur more than once keep the value of the last column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedRow {
    values: HashMap<String, Option<String>>,
}

impl NamedRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            values: HashMap::with_capacity(capacity),
        }
    }

    /// Sets a column value, returning the previous value for the label.
    pub fn insert(
        &mut self,
        label: impl Into<String>,
        value: Option<String>,
    ) -> Option<Option<String>> {
        self.values.insert(label.into(), value)
    }

    /// Gets a value by column label. `Ok(None)` means the column is NULL.
    pub fn get(&self, label: &str) -> Result<Option<&str>> {
        self.values
            .get(label)
            .map(|v| v.as_deref())
            .ok_or_else(|| BridgeError::ColumnNotFound(label.to_string()))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.values.contains_key(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.values
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_map(self) -> HashMap<String, Option<String>> {
        self.values
    }
}

impl FromIterator<(String, Option<String>)> for NamedRow {
    fn from_iter<I: IntoIterator<Item = (String, Option<String>)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// One result row as values in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionalRow {
    values: Vec<Option<String>>,
}

impl PositionalRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: Option<String>) {
        self.values.push(value);
    }

    /// Gets a value by zero-based column position.
    pub fn get(&self, index: usize) -> Result<Option<&str>> {
        self.values
            .get(index)
            .map(|v| v.as_deref())
            .ok_or_else(|| BridgeError::ColumnNotFound(format!("#{}", index)))
    }

    /// Replaces the value at a zero-based position.
    pub fn set(&mut self, index: usize, value: Option<String>) -> Result<()> {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(BridgeError::ColumnNotFound(format!("#{}", index))),
        }
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Option<String>> {
        self.values
    }
}

impl From<Vec<Option<String>>> for PositionalRow {
    fn from(values: Vec<Option<String>>) -> Self {
        Self { values }
    }
}

/// A fully realized, independently owned row in either caller-facing shape.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterializedRow {
    Named(NamedRow),
    Positional(PositionalRow),
}

impl From<NamedRow> for MaterializedRow {
    fn from(row: NamedRow) -> Self {
        MaterializedRow::Named(row)
    }
}

impl From<PositionalRow> for MaterializedRow {
    fn from(row: PositionalRow) -> Self {
        MaterializedRow::Positional(row)
    }
}
