//! Rows, search rows and column descriptors.

mod value;

use serde::{Deserialize, Serialize};

pub use self::value::{DataType, Value, ValueError};

/// 64-bit key identifying a row inside a primary index.
pub type RowKey = i64;

/// Selectivity assumed for a column that has never been analyzed.
pub(crate) const SELECTIVITY_DEFAULT: u32 = 50;

/// An ordered list of column values plus the row key.
///
/// A freshly built row has no key; the primary index assigns (or derives) one
/// when the row is added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    key: Option<RowKey>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { key: None, values }
    }

    pub fn with_key(key: RowKey, values: Vec<Value>) -> Self {
        Self {
            key: Some(key),
            values,
        }
    }

    pub fn key(&self) -> Option<RowKey> {
        self.key
    }

    pub fn set_key(&mut self, key: RowKey) {
        self.key = Some(key);
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of column `index`; columns past the end read as `Null`.
    pub fn value(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&Value::Null)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn values_mut(&mut self) -> &mut Vec<Value> {
        &mut self.values
    }
}

/// Bound row for range lookups.
///
/// Each column is either unconstrained (`None`) or constrained to a value,
/// where `Some(Value::Null)` constrains the column to SQL NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRow {
    key: Option<RowKey>,
    values: Vec<Option<Value>>,
}

impl SearchRow {
    /// A search row with every column unconstrained.
    pub fn new(column_count: usize) -> Self {
        Self {
            key: None,
            values: vec![None; column_count],
        }
    }

    pub fn with_value(mut self, column: usize, value: impl Into<Value>) -> Self {
        self.set_value(column, value);
        self
    }

    pub fn with_key(mut self, key: RowKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn set_value(&mut self, column: usize, value: impl Into<Value>) {
        if self.values.len() <= column {
            self.values.resize(column + 1, None);
        }
        self.values[column] = Some(value.into());
    }

    pub fn key(&self) -> Option<RowKey> {
        self.key
    }

    /// The constraint on `column`, if any.
    pub fn value(&self, column: usize) -> Option<&Value> {
        self.values.get(column).and_then(Option::as_ref)
    }
}

impl From<&Row> for SearchRow {
    fn from(row: &Row) -> Self {
        Self {
            key: row.key(),
            values: row.values().iter().cloned().map(Some).collect(),
        }
    }
}

/// Persisted column descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub precision: u32,
    pub scale: u32,
    pub display_size: u32,
    pub nullable: bool,
    pub primary_key: bool,
    /// Percentage of distinct values (1..=100) as last measured by analyze.
    pub selectivity: u32,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into().to_uppercase(),
            data_type,
            precision: data_type.default_precision(),
            scale: 0,
            display_size: data_type.default_display_size(),
            nullable: true,
            primary_key: false,
            selectivity: SELECTIVITY_DEFAULT,
        }
    }

    pub fn precision(self, precision: u32) -> Self {
        Column { precision, ..self }
    }

    pub fn scale(self, scale: u32) -> Self {
        Column { scale, ..self }
    }

    pub fn display_size(self, display_size: u32) -> Self {
        Column {
            display_size,
            ..self
        }
    }

    pub fn nullable(self, nullable: bool) -> Self {
        Column { nullable, ..self }
    }

    /// Mark the column as part of the primary key; implies NOT NULL.
    pub fn primary_key(self, primary_key: bool) -> Self {
        Column {
            primary_key,
            nullable: self.nullable && !primary_key,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, DataType, Row, SearchRow, Value};

    #[test]
    fn search_row_from_row_constrains_every_column() {
        let row = Row::with_key(9, vec![Value::Int(1), Value::Null]);
        let search = SearchRow::from(&row);

        assert_eq!(search.key(), Some(9));
        assert_eq!(search.value(0), Some(&Value::Int(1)));
        assert_eq!(search.value(1), Some(&Value::Null));
        assert_eq!(search.value(2), None);
    }

    #[test]
    fn search_row_grows_on_demand() {
        let search = SearchRow::default().with_value(3, 10);
        assert_eq!(search.value(0), None);
        assert_eq!(search.value(3), Some(&Value::Int(10)));
    }

    #[test]
    fn primary_key_column_is_not_null() {
        let column = Column::new("id", DataType::Long).primary_key(true);
        assert_eq!(column.name, "ID");
        assert!(!column.nullable);
        assert!(column.primary_key);
    }
}
