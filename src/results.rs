use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::types::RowValues;

/// A row from a query result.
///
/// Column names are shared with every other row of the same [`ResultSet`].
#[derive(Debug, Clone)]
pub struct Row {
    pub column_names: Arc<Vec<String>>,
    pub values: Vec<RowValues>,
    column_index: Arc<HashMap<String, usize>>,
}

impl Row {
    /// Get a value by column name.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.column_index
            .get(column_name)
            .and_then(|&idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Render the row as a JSON object keyed by column name.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let map: Map<String, JsonValue> = self
            .column_names
            .iter()
            .zip(&self.values)
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        JsonValue::Object(map)
    }
}

/// Rows returned by a query, sharing one column list.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub results: Vec<Row>,
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
}

impl ResultSet {
    #[must_use]
    pub fn new(column_names: Vec<String>) -> Self {
        let column_index = column_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            results: Vec::new(),
            column_names: Arc::new(column_names),
            column_index: Arc::new(column_index),
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Append a row; `values` is expected in column order.
    pub fn add_row_values(&mut self, values: Vec<RowValues>) {
        self.results.push(Row {
            column_names: Arc::clone(&self.column_names),
            values,
            column_index: Arc::clone(&self.column_index),
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Take the first row, dropping the rest.
    #[must_use]
    pub fn into_first(self) -> Option<Row> {
        self.results.into_iter().next()
    }
}
