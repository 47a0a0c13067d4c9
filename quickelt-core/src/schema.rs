//! Column types, schema inference and cell coercion.

use crate::table::DataTable;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[serde(alias = "int", alias = "int64", alias = "integer64")]
    Integer,
    #[serde(alias = "float64", alias = "double", alias = "number")]
    Float,
    #[serde(alias = "str", alias = "text", alias = "utf8")]
    String,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "datetime", alias = "timestamp", alias = "date")]
    DateTime,
    Json,
    Null,
    Unknown,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::DateTime => "date_time",
            Self::Json => "json",
            Self::Null => "null",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema definition for a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub columns: Vec<ColumnSchema>,
}

/// Schema for a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: ColumnType,
    pub nullable: bool,
}

/// Infer column type from its values.
pub fn infer_column_type(values: &[Value]) -> ColumnType {
    let non_null: Vec<_> = values.iter().filter(|v| !v.is_null()).collect();
    if non_null.is_empty() {
        return ColumnType::Null;
    }

    let mut has_int = false;
    let mut has_float = false;
    let mut has_bool = false;
    let mut has_string = false;
    let mut has_nested = false;
    let mut all_datetimes = true;

    for v in &non_null {
        match v {
            Value::Number(n) => {
                if n.is_f64() {
                    has_float = true;
                } else {
                    has_int = true;
                }
                all_datetimes = false;
            }
            Value::Bool(_) => {
                has_bool = true;
                all_datetimes = false;
            }
            Value::String(s) => {
                has_string = true;
                if all_datetimes && parse_datetime(s).is_none() {
                    all_datetimes = false;
                }
            }
            Value::Array(_) | Value::Object(_) => {
                has_nested = true;
                all_datetimes = false;
            }
            Value::Null => {}
        }
    }

    if has_nested {
        return ColumnType::Json;
    }
    if has_string {
        return if all_datetimes {
            ColumnType::DateTime
        } else {
            ColumnType::String
        };
    }
    if has_float {
        return ColumnType::Float;
    }
    if has_int {
        return ColumnType::Integer;
    }
    if has_bool {
        return ColumnType::Boolean;
    }
    ColumnType::Unknown
}

/// Infer the schema of a table.
pub fn infer_schema(table: &DataTable) -> SchemaDefinition {
    let columns = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values = table.column_values(i);
            ColumnSchema {
                name: name.clone(),
                dtype: infer_column_type(&values),
                nullable: values.iter().any(|v| v.is_null()),
            }
        })
        .collect();
    SchemaDefinition { columns }
}

/// Parse RFC 3339, ISO-like `YYYY-MM-DD[ T]HH:MM:SS[.f]` or plain dates.
/// Naive values are taken as UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.len() < 8 {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
        }
    }
    None
}

/// Canonical rendering of a datetime cell.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Convert a cell to the given type.
///
/// Nulls stay null. Returns `None` when a non-null value cannot be represented
/// in the target type.
pub fn coerce_value(value: &Value, dtype: ColumnType) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    match dtype {
        ColumnType::Integer => to_integer(value),
        ColumnType::Float => to_float(value),
        ColumnType::Boolean => to_boolean(value),
        ColumnType::String => Some(Value::String(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        ColumnType::DateTime => match value {
            Value::String(s) => parse_datetime(s).map(|dt| Value::String(format_datetime(&dt))),
            _ => None,
        },
        ColumnType::Json | ColumnType::Null | ColumnType::Unknown => Some(value.clone()),
    }
}

/// Numeric view of a cell, used by the statistics in quality and cleaning.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn to_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => n.as_f64().and_then(integral_f64),
        Value::String(s) => {
            let t = s.trim();
            t.parse::<i64>()
                .ok()
                .map(Value::from)
                .or_else(|| t.parse::<f64>().ok().and_then(integral_f64))
        }
        Value::Bool(b) => Some(Value::from(i64::from(*b))),
        _ => None,
    }
}

fn integral_f64(f: f64) -> Option<Value> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(Value::from(f as i64))
    } else {
        None
    }
}

fn to_float(value: &Value) -> Option<Value> {
    let f = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    serde_json::Number::from_f64(f).map(Value::Number)
}

fn to_boolean(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" | "sim" => Some(Value::Bool(true)),
            "false" | "f" | "no" | "n" | "0" | "nao" | "não" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_column_type_int() {
        let values = vec![json!(1), json!(2), Value::Null];
        assert_eq!(infer_column_type(&values), ColumnType::Integer);
    }

    #[test]
    fn test_infer_column_type_string_and_datetime() {
        assert_eq!(
            infer_column_type(&[json!("a"), json!("b")]),
            ColumnType::String
        );
        assert_eq!(
            infer_column_type(&[json!("2024-01-15"), json!("2024-02-01T10:00:00Z")]),
            ColumnType::DateTime
        );
        assert_eq!(
            infer_column_type(&[json!("2024-01-15"), json!("soon")]),
            ColumnType::String
        );
    }

    #[test]
    fn test_infer_column_type_nested_and_null() {
        assert_eq!(infer_column_type(&[json!({"a": 1})]), ColumnType::Json);
        assert_eq!(infer_column_type(&[Value::Null]), ColumnType::Null);
    }

    #[test]
    fn test_infer_schema() {
        let table = DataTable::new(
            vec!["name".into(), "age".into()],
            vec![
                vec![json!("Alice"), json!(30)],
                vec![json!("Bob"), Value::Null],
            ],
        )
        .unwrap();
        let schema = infer_schema(&table);
        assert_eq!(schema.columns[0].dtype, ColumnType::String);
        assert!(!schema.columns[0].nullable);
        assert_eq!(schema.columns[1].dtype, ColumnType::Integer);
        assert!(schema.columns[1].nullable);
    }

    #[test]
    fn test_coerce_numbers() {
        assert_eq!(coerce_value(&json!("1"), ColumnType::Integer), Some(json!(1)));
        assert_eq!(coerce_value(&json!("2.0"), ColumnType::Integer), Some(json!(2)));
        assert_eq!(coerce_value(&json!("2.5"), ColumnType::Integer), None);
        assert_eq!(coerce_value(&json!(" 2.5 "), ColumnType::Float), Some(json!(2.5)));
        assert_eq!(coerce_value(&json!("abc"), ColumnType::Float), None);
        assert_eq!(coerce_value(&Value::Null, ColumnType::Float), Some(Value::Null));
    }

    #[test]
    fn test_coerce_bool_string_datetime() {
        assert_eq!(coerce_value(&json!("TRUE"), ColumnType::Boolean), Some(json!(true)));
        assert_eq!(coerce_value(&json!(0), ColumnType::Boolean), Some(json!(false)));
        assert_eq!(coerce_value(&json!(12), ColumnType::String), Some(json!("12")));
        assert_eq!(
            coerce_value(&json!("2024-01-15"), ColumnType::DateTime),
            Some(json!("2024-01-15T00:00:00Z"))
        );
        assert_eq!(coerce_value(&json!("yesterday"), ColumnType::DateTime), None);
    }

    #[test]
    fn test_column_type_aliases() {
        let t: ColumnType = serde_json::from_value(json!("int")).unwrap();
        assert_eq!(t, ColumnType::Integer);
        let t: ColumnType = serde_json::from_value(json!("datetime")).unwrap();
        assert_eq!(t, ColumnType::DateTime);
    }
}
