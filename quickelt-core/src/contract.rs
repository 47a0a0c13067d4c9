//! Data contracts: declared columns and types a fetched table must satisfy.

use crate::error::{PipelineError, Result};
use crate::schema::{ColumnType, coerce_value};
use crate::table::DataTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Most violations listed in a single error.
const MAX_REPORTED_VIOLATIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractField {
    pub name: String,
    pub dtype: ColumnType,
    #[serde(default)]
    pub nullable: bool,
}

impl ContractField {
    pub fn required(name: &str, dtype: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            nullable: false,
        }
    }

    pub fn optional(name: &str, dtype: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            nullable: true,
        }
    }
}

/// Declared shape of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataContract {
    pub name: String,
    /// Reject columns the contract does not declare.
    #[serde(default)]
    pub strict: bool,
    pub fields: Vec<ContractField>,
}

impl DataContract {
    /// Load a contract from a `.toml` or `.json` file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("cannot read contract {}: {e}", path.display()))
        })?;
        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&raw).map_err(|e| e.to_string()),
            _ => toml::from_str(&raw).map_err(|e| e.to_string()),
        };
        parsed.map_err(|e| {
            PipelineError::config(format!("invalid contract {}: {e}", path.display()))
        })
    }

    /// Resolve a contract argument: a built-in name or a file path.
    pub fn resolve(spec: &str) -> Result<Self> {
        match builtin(spec) {
            Some(contract) => Ok(contract),
            None => Self::from_path(Path::new(spec)),
        }
    }

    /// Check the table against the contract and coerce every declared column.
    ///
    /// Declared columns come first, in contract order; undeclared columns follow
    /// unchanged when the contract is not strict.
    pub fn validate(&self, table: &DataTable) -> Result<DataTable> {
        let mut violations = Vec::new();

        let positions: Vec<Option<usize>> = self
            .fields
            .iter()
            .map(|f| table.column_index(&f.name))
            .collect();
        for (field, pos) in self.fields.iter().zip(&positions) {
            if pos.is_none() {
                violations.push(format!("missing column '{}'", field.name));
            }
        }

        let extras: Vec<usize> = table
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !self.fields.iter().any(|f| &f.name == *c))
            .map(|(i, _)| i)
            .collect();
        if self.strict {
            for &i in &extras {
                violations.push(format!("unexpected column '{}'", table.columns[i]));
            }
        }

        let mut rows = Vec::with_capacity(table.row_count());
        for (row_index, row) in table.rows.iter().enumerate() {
            let mut out = Vec::with_capacity(self.fields.len() + extras.len());
            for (field, pos) in self.fields.iter().zip(&positions) {
                let Some(pos) = pos else {
                    out.push(Value::Null);
                    continue;
                };
                let cell = &row[*pos];
                match coerce_value(cell, field.dtype) {
                    Some(Value::Null) if !field.nullable => {
                        violations.push(format!(
                            "row {row_index}: '{}' must not be null",
                            field.name
                        ));
                        out.push(Value::Null);
                    }
                    Some(value) => out.push(value),
                    None => {
                        violations.push(format!(
                            "row {row_index}: '{}' value {cell} is not a valid {}",
                            field.name, field.dtype
                        ));
                        out.push(Value::Null);
                    }
                }
            }
            if !self.strict {
                out.extend(extras.iter().map(|&i| row[i].clone()));
            }
            rows.push(out);
        }

        if !violations.is_empty() {
            let total = violations.len();
            violations.truncate(MAX_REPORTED_VIOLATIONS);
            if total > MAX_REPORTED_VIOLATIONS {
                violations.push(format!("... and {} more", total - MAX_REPORTED_VIOLATIONS));
            }
            return Err(PipelineError::ContractViolation {
                contract: self.name.clone(),
                violations,
            });
        }

        let mut columns: Vec<String> = self.fields.iter().map(|f| f.name.clone()).collect();
        if !self.strict {
            columns.extend(extras.iter().map(|&i| table.columns[i].clone()));
        }
        DataTable::new(columns, rows)
    }
}

/// Contracts shipped with the scaffold, by name.
pub fn builtin(name: &str) -> Option<DataContract> {
    use ColumnType::*;
    let (fields, strict) = match name {
        "product_api" => (
            vec![
                ContractField::required("id", Integer),
                ContractField::required("name", String),
                ContractField::required("price", Float),
                ContractField::required("created_at", DateTime),
                ContractField::required("active", Boolean),
            ],
            false,
        ),
        "user_api" => (
            vec![
                ContractField::required("user_id", Integer),
                ContractField::required("username", String),
                ContractField::required("registered_at", DateTime),
                ContractField::required("is_active", Boolean),
            ],
            false,
        ),
        "product_csv" => (
            vec![
                ContractField::required("product_id", Integer),
                ContractField::required("product_name", String),
                ContractField::optional("category", String),
                ContractField::required("price", Float),
                ContractField::required("available", Boolean),
            ],
            false,
        ),
        "sale_csv" => (
            vec![
                ContractField::required("sale_id", Integer),
                ContractField::required("product_id", Integer),
                ContractField::required("quantity", Integer),
                ContractField::required("sale_date", DateTime),
                ContractField::required("total_value", Float),
            ],
            false,
        ),
        "user_csv" => (
            vec![
                ContractField::required("user_id", Integer),
                ContractField::required("username", String),
                ContractField::required("email", String),
                ContractField::required("signup_date", DateTime),
                ContractField::required("is_active", Boolean),
            ],
            false,
        ),
        "customer_database" => (
            vec![
                ContractField::required("customer_id", Integer),
                ContractField::required("customer_name", String),
                ContractField::required("registration_date", DateTime),
                ContractField::required("active", Boolean),
            ],
            false,
        ),
        "article_webscraping" => (
            vec![
                ContractField::required("article_id", Integer),
                ContractField::required("title", String),
                ContractField::required("published_at", DateTime),
                ContractField::required("url", String),
            ],
            false,
        ),
        _ => return None,
    };
    Some(DataContract {
        name: name.to_string(),
        strict,
        fields,
    })
}

/// Names accepted by [`builtin`].
pub const BUILTIN_CONTRACTS: &[&str] = &[
    "product_api",
    "user_api",
    "product_csv",
    "sale_csv",
    "user_csv",
    "customer_database",
    "article_webscraping",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn users() -> DataTable {
        DataTable::new(
            vec![
                "is_active".into(),
                "user_id".into(),
                "username".into(),
                "registered_at".into(),
                "source".into(),
            ],
            vec![
                vec![json!("true"), json!("1"), json!("ana"), json!("2024-01-15"), json!("crm")],
                vec![json!(false), json!(2), json!("bia"), json!("2024-02-01T10:00:00Z"), json!("crm")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_coerces_and_orders_columns() {
        let contract = builtin("user_api").unwrap();
        let out = contract.validate(&users()).unwrap();
        assert_eq!(
            out.columns,
            vec!["user_id", "username", "registered_at", "is_active", "source"]
        );
        assert_eq!(
            out.rows[0],
            vec![json!(1), json!("ana"), json!("2024-01-15T00:00:00Z"), json!(true), json!("crm")]
        );
    }

    #[test]
    fn test_strict_rejects_extra_columns() {
        let mut contract = builtin("user_api").unwrap();
        contract.strict = true;
        let err = contract.validate(&users()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QualityRejected);
        assert!(err.to_string().contains("unexpected column 'source'"));
    }

    #[test]
    fn test_missing_and_invalid_values() {
        let contract = builtin("product_csv").unwrap();
        let table = DataTable::new(
            vec!["product_id".into(), "product_name".into(), "price".into(), "available".into()],
            vec![vec![json!("x1"), Value::Null, json!(3.5), json!("yes")]],
        )
        .unwrap();
        let err = contract.validate(&table).unwrap_err().to_string();
        assert!(err.contains("missing column 'category'"));
        assert!(err.contains("'product_id' value \"x1\" is not a valid integer"));
        assert!(err.contains("'product_name' must not be null"));
    }

    #[test]
    fn test_violation_list_is_capped() {
        let contract = DataContract {
            name: "ids".into(),
            strict: false,
            fields: vec![ContractField::required("id", ColumnType::Integer)],
        };
        let rows = (0..15).map(|_| vec![json!("nope")]).collect();
        let table = DataTable::new(vec!["id".into()], rows).unwrap();
        match contract.validate(&table).unwrap_err() {
            PipelineError::ContractViolation { violations, .. } => {
                assert_eq!(violations.len(), 11);
                assert_eq!(violations[10], "... and 5 more");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("orders.toml");
        std::fs::write(
            &path,
            r#"
name = "orders"
strict = true

[[fields]]
name = "order_id"
dtype = "int"

[[fields]]
name = "note"
dtype = "string"
nullable = true
"#,
        )
        .unwrap();
        let contract = DataContract::resolve(path.to_str().unwrap()).unwrap();
        assert_eq!(contract.name, "orders");
        assert!(contract.strict);
        assert_eq!(contract.fields[0].dtype, ColumnType::Integer);
        assert!(contract.fields[1].nullable);
        assert!(DataContract::resolve("/no/such/contract.toml").is_err());
    }
}
