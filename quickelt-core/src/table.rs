//! In-memory tabular representation shared by sources, the quality gate, the
//! codecs and the cleaning passes.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// A table of JSON cells, row-major.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl DataTable {
    /// Build a table, checking that every row has one cell per column.
    /// Repeated column names get `_2`, `_3`, ... suffixes.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns.len())
        {
            return Err(PipelineError::invalid_input(format!(
                "row {i} has {} cells, expected {}",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self {
            columns: unique_column_names(columns),
            rows,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from JSON records. Object keys become columns in the order
    /// they are first seen; scalar records land in a single `value` column.
    pub fn from_records(records: &[Value]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut has_scalar = false;
        for record in records {
            match record {
                Value::Object(map) => {
                    for key in map.keys() {
                        if seen.insert(key.clone()) {
                            columns.push(key.clone());
                        }
                    }
                }
                _ => has_scalar = true,
            }
        }
        if has_scalar && seen.insert("value".to_string()) {
            columns.push("value".to_string());
        }

        let rows = records
            .iter()
            .map(|record| match record {
                Value::Object(map) => columns
                    .iter()
                    .map(|col| map.get(col).cloned().unwrap_or(Value::Null))
                    .collect(),
                scalar => columns
                    .iter()
                    .map(|col| {
                        if col == "value" {
                            scalar.clone()
                        } else {
                            Value::Null
                        }
                    })
                    .collect(),
            })
            .collect();

        Self { columns, rows }
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                Value::Object(
                    self.columns
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect(),
                )
            })
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().filter_map(move |row| row.get(index))
    }

    pub fn column_values(&self, index: usize) -> Vec<Value> {
        self.column(index).cloned().collect()
    }

    pub fn null_count(&self, index: usize) -> usize {
        self.column(index).filter(|v| v.is_null()).count()
    }

    pub fn null_counts(&self) -> Vec<usize> {
        (0..self.column_count()).map(|i| self.null_count(i)).collect()
    }

    /// Share of null cells in one column, in percent.
    pub fn column_null_percentage(&self, index: usize) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.null_count(index) as f64 / self.rows.len() as f64 * 100.0
    }

    /// Share of null cells across the whole table, in percent.
    pub fn null_percentage(&self) -> f64 {
        let cells = self.row_count() * self.column_count();
        if cells == 0 {
            return 0.0;
        }
        let nulls: usize = self.null_counts().iter().sum();
        nulls as f64 / cells as f64 * 100.0
    }

    /// Number of rows identical to an earlier row.
    pub fn duplicate_row_count(&self) -> usize {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|row| !seen.insert(row_key(row)))
            .count()
    }

    pub fn truncate(&mut self, limit: usize) {
        self.rows.truncate(limit);
    }

    /// Remove a column by index.
    pub fn drop_column(&mut self, index: usize) {
        if index >= self.columns.len() {
            return;
        }
        self.columns.remove(index);
        for row in &mut self.rows {
            if index < row.len() {
                row.remove(index);
            }
        }
    }
}

/// Make column names unique so records keyed by name keep every cell. The
/// first occurrence keeps its name; later ones get the lowest free `_N`
/// suffix starting at 2.
pub fn unique_column_names(columns: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::with_capacity(columns.len());
    let mut out = Vec::with_capacity(columns.len());
    for column in columns {
        let mut name = column.clone();
        let mut suffix = 2;
        while taken.contains(&name) {
            name = format!("{column}_{suffix}");
            suffix += 1;
        }
        taken.insert(name.clone());
        out.push(name);
    }
    out
}

/// Stable identity of a row, used for duplicate detection.
pub(crate) fn row_key(row: &[Value]) -> String {
    serde_json::to_string(row).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> DataTable {
        DataTable::new(
            vec!["id".into(), "name".into()],
            vec![
                vec![json!(1), json!("Ana")],
                vec![json!(2), Value::Null],
                vec![json!(1), json!("Ana")],
                vec![json!(4), json!("Bia")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_rows() {
        let err = DataTable::new(vec!["a".into()], vec![vec![json!(1), json!(2)]]);
        assert!(err.is_err());
    }

    #[test]
    fn test_new_disambiguates_repeated_columns() {
        let table = DataTable::new(
            vec!["id".into(), "id".into(), "id_2".into(), "name".into()],
            vec![vec![json!(1), json!(2), json!(3), json!("Ana")]],
        )
        .unwrap();
        assert_eq!(table.columns, vec!["id", "id_2", "id_2_2", "name"]);
        assert_eq!(
            table.to_records(),
            vec![json!({"id": 1, "id_2": 2, "id_2_2": 3, "name": "Ana"})]
        );
    }

    #[test]
    fn test_counts_and_nulls() {
        let table = sample();
        assert_eq!(table.row_count(), 4);
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.null_counts(), vec![0, 1]);
        assert_eq!(table.column_null_percentage(1), 25.0);
        assert_eq!(table.null_percentage(), 12.5);
        assert_eq!(table.duplicate_row_count(), 1);
    }

    #[test]
    fn test_empty_table_has_zero_null_percentage() {
        assert_eq!(DataTable::empty().null_percentage(), 0.0);
    }

    #[test]
    fn test_from_records_unions_keys() {
        let table = DataTable::from_records(&[
            json!({"id": 1, "name": "a"}),
            json!({"id": 2, "price": 9.5}),
        ]);
        assert_eq!(table.columns, vec!["id", "name", "price"]);
        assert_eq!(table.rows[1], vec![json!(2), Value::Null, json!(9.5)]);
        assert_eq!(table.to_records()[0], json!({"id": 1, "name": "a", "price": null}));
    }

    #[test]
    fn test_from_scalar_records() {
        let table = DataTable::from_records(&[json!(1), json!(2)]);
        assert_eq!(table.columns, vec!["value"]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_drop_column_and_truncate() {
        let mut table = sample();
        table.drop_column(0);
        assert_eq!(table.columns, vec!["name"]);
        assert_eq!(table.rows[0], vec![json!("Ana")]);
        table.truncate(2);
        assert_eq!(table.row_count(), 2);
    }
}
