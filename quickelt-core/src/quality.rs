//! Quality gate applied to every fetched table before anything is written.

use crate::config::QualityConfig;
use crate::error::{PipelineError, Result};
use crate::table::DataTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Quality facts about a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub row_count: usize,
    pub column_count: usize,
    /// Null share per column, in percent.
    pub null_percentage: BTreeMap<String, f64>,
    pub overall_null_percentage: f64,
    pub duplicate_rows: usize,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
}

/// Row-count and null thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityGate {
    pub min_rows: usize,
    pub max_null_percentage: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::from(&QualityConfig::default())
    }
}

impl From<&QualityConfig> for QualityGate {
    fn from(config: &QualityConfig) -> Self {
        Self {
            min_rows: config.min_rows,
            max_null_percentage: config.max_null_percentage,
        }
    }
}

impl QualityGate {
    /// Measure the table against the thresholds without failing.
    pub fn assess(&self, table: &DataTable) -> QualityReport {
        let row_count = table.row_count();
        let null_percentage = table
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| (col.clone(), table.column_null_percentage(i)))
            .collect();
        let overall_null_percentage = table.null_percentage();

        let mut violations = Vec::new();
        if row_count == 0 {
            violations.push("table is empty".to_string());
        } else if row_count < self.min_rows {
            violations.push(format!(
                "{row_count} rows is below the minimum of {}",
                self.min_rows
            ));
        }
        if overall_null_percentage > self.max_null_percentage {
            violations.push(format!(
                "null percentage {overall_null_percentage:.2}% exceeds the maximum of {:.2}%",
                self.max_null_percentage
            ));
        }

        QualityReport {
            row_count,
            column_count: table.column_count(),
            null_percentage,
            overall_null_percentage,
            duplicate_rows: table.duplicate_row_count(),
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Assess the table and turn any violation into a quality-rejected error.
    pub fn enforce(&self, table: &DataTable) -> Result<QualityReport> {
        let report = self.assess(table);
        if report.passed {
            Ok(report)
        } else {
            Err(PipelineError::quality(report.violations.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::{Value, json};

    fn table(rows: Vec<Vec<Value>>) -> DataTable {
        DataTable::new(vec!["id".into(), "name".into()], rows).unwrap()
    }

    #[test]
    fn test_passing_table() {
        let report = QualityGate::default()
            .enforce(&table(vec![
                vec![json!(1), json!("a")],
                vec![json!(1), json!("a")],
            ]))
            .unwrap();
        assert!(report.passed);
        assert_eq!(report.duplicate_rows, 1);
        assert_eq!(report.null_percentage["name"], 0.0);
    }

    #[test]
    fn test_empty_table_always_rejected() {
        let gate = QualityGate {
            min_rows: 0,
            max_null_percentage: 100.0,
        };
        let err = gate.enforce(&table(vec![])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QualityRejected);
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_min_rows() {
        let gate = QualityGate {
            min_rows: 3,
            max_null_percentage: 100.0,
        };
        let report = gate.assess(&table(vec![vec![json!(1), json!("a")]]));
        assert!(!report.passed);
        assert!(report.violations[0].contains("below the minimum of 3"));
    }

    #[test]
    fn test_null_percentage_threshold() {
        let gate = QualityGate {
            min_rows: 1,
            max_null_percentage: 40.0,
        };
        let rows = vec![
            vec![json!(1), Value::Null],
            vec![Value::Null, Value::Null],
        ];
        let report = gate.assess(&table(rows));
        assert_eq!(report.overall_null_percentage, 75.0);
        assert_eq!(report.null_percentage["id"], 50.0);
        assert!(!report.passed);

        let lenient = QualityGate {
            min_rows: 1,
            max_null_percentage: 75.0,
        };
        assert!(lenient.assess(&table(vec![
            vec![json!(1), Value::Null],
            vec![Value::Null, Value::Null],
        ])).passed);
    }
}
