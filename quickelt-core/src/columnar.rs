//! File formats: decoding fetched payloads into a [`DataTable`] and encoding a
//! table into an artifact.
//!
//! CSV and Parquet go through `arrow`/`parquet`; JSON and JSON Lines through
//! `serde_json`. Encoding is deterministic: identical tables produce identical
//! bytes.

use crate::error::{PipelineError, Result};
use crate::schema::{ColumnType, infer_column_type};
use crate::table::{DataTable, unique_column_names};
use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{
    DataType, Field, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, Schema,
    SchemaRef, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Formats a source payload can arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Json,
    Jsonl,
    Parquet,
}

impl FileFormat {
    /// Token used in naming keys and metadata.
    pub fn token(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Jsonl => "jsonl",
            Self::Parquet => "parquet",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "txt" | "tsv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "jsonl" | "ndjson" => Some(Self::Jsonl),
            "parquet" | "pq" => Some(Self::Parquet),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl std::str::FromStr for FileFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s)
            .ok_or_else(|| PipelineError::invalid_input(format!("unsupported file format '{s}'")))
    }
}

/// Formats an artifact can be written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Parquet,
    Csv,
    Jsonl,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Csv => "csv",
            Self::Jsonl => "jsonl",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "parquet" => Some(Self::Parquet),
            "csv" => Some(Self::Csv),
            "jsonl" => Some(Self::Jsonl),
            _ => None,
        }
    }

    /// The matching input format, for reading an artifact back.
    pub fn as_file_format(self) -> FileFormat {
        match self {
            Self::Parquet => FileFormat::Parquet,
            Self::Csv => FileFormat::Csv,
            Self::Jsonl => FileFormat::Jsonl,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s)
            .ok_or_else(|| PipelineError::invalid_input(format!("unsupported output format '{s}'")))
    }
}

/// Decode a payload into a table.
///
/// JSON accepts an array of records, an object holding a `results_key` array
/// (default `results`), or a single object.
pub fn decode(bytes: Bytes, format: FileFormat, delimiter: u8) -> Result<DataTable> {
    decode_with_key(bytes, format, delimiter, "results")
}

pub fn decode_with_key(
    bytes: Bytes,
    format: FileFormat,
    delimiter: u8,
    results_key: &str,
) -> Result<DataTable> {
    let fail = |e: &dyn std::fmt::Display| {
        PipelineError::invalid_input(format!("failed to decode {} payload: {e}", format.token()))
    };
    match format {
        FileFormat::Csv => decode_csv(&bytes, delimiter).map_err(|e| fail(&e)),
        FileFormat::Parquet => decode_parquet(bytes).map_err(|e| fail(&e)),
        FileFormat::Json => {
            let value: Value = serde_json::from_slice(&bytes).map_err(|e| fail(&e))?;
            json_records(value, results_key).map_err(|e| fail(&e))
        }
        FileFormat::Jsonl => {
            let text = std::str::from_utf8(&bytes).map_err(|e| fail(&e))?;
            let mut records = Vec::new();
            for (i, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let value: Value = serde_json::from_str(line)
                    .map_err(|e| fail(&format!("line {}: {e}", i + 1)))?;
                records.push(value);
            }
            Ok(DataTable::from_records(&records))
        }
    }
}

/// Turn a parsed JSON document into a table.
pub fn json_records(value: Value, results_key: &str) -> Result<DataTable> {
    match value {
        Value::Array(items) => Ok(DataTable::from_records(&items)),
        Value::Object(mut map) => match map.remove(results_key) {
            Some(Value::Array(items)) => Ok(DataTable::from_records(&items)),
            Some(other) => {
                map.insert(results_key.to_string(), other);
                Ok(DataTable::from_records(&[Value::Object(map)]))
            }
            None => Ok(DataTable::from_records(&[Value::Object(map)])),
        },
        _ => Err(PipelineError::invalid_input(
            "JSON payload must be an array or object",
        )),
    }
}

fn decode_csv(bytes: &[u8], delimiter: u8) -> std::result::Result<DataTable, arrow::error::ArrowError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(DataTable::empty());
    }
    let (schema, _) = arrow::csv::reader::Format::default()
        .with_header(true)
        .with_delimiter(delimiter)
        .infer_schema(Cursor::new(bytes), None)?;
    let reader = arrow::csv::ReaderBuilder::new(Arc::new(schema.clone()))
        .with_header(true)
        .with_delimiter(delimiter)
        .build(Cursor::new(bytes))?;

    let columns = schema.fields().iter().map(|f| f.name().clone()).collect();
    let mut rows = Vec::new();
    for batch in reader {
        append_rows(&batch?, &mut rows)?;
    }
    Ok(DataTable {
        columns: unique_column_names(columns),
        rows,
    })
}

fn decode_parquet(bytes: Bytes) -> std::result::Result<DataTable, Box<dyn std::error::Error + Send + Sync>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    let columns = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;
    let mut rows = Vec::new();
    for batch in reader {
        append_rows(&batch?, &mut rows)?;
    }
    Ok(DataTable {
        columns: unique_column_names(columns),
        rows,
    })
}

fn append_rows(
    batch: &RecordBatch,
    rows: &mut Vec<Vec<Value>>,
) -> std::result::Result<(), arrow::error::ArrowError> {
    for row in 0..batch.num_rows() {
        let mut cells = Vec::with_capacity(batch.num_columns());
        for column in batch.columns() {
            cells.push(cell_value(column, row)?);
        }
        rows.push(cells);
    }
    Ok(())
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn cell_value(array: &ArrayRef, row: usize) -> std::result::Result<Value, arrow::error::ArrowError> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }
    let value = match array.data_type() {
        DataType::Null => Value::Null,
        DataType::Boolean => Value::Bool(array.as_boolean().value(row)),
        DataType::Int8 => Value::from(array.as_primitive::<Int8Type>().value(row)),
        DataType::Int16 => Value::from(array.as_primitive::<Int16Type>().value(row)),
        DataType::Int32 => Value::from(array.as_primitive::<Int32Type>().value(row)),
        DataType::Int64 => Value::from(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Value::from(array.as_primitive::<UInt8Type>().value(row)),
        DataType::UInt16 => Value::from(array.as_primitive::<UInt16Type>().value(row)),
        DataType::UInt32 => Value::from(array.as_primitive::<UInt32Type>().value(row)),
        DataType::UInt64 => Value::from(array.as_primitive::<UInt64Type>().value(row)),
        DataType::Float32 => float_value(f64::from(array.as_primitive::<Float32Type>().value(row))),
        DataType::Float64 => float_value(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => Value::String(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::String(array.as_string::<i64>().value(row).to_string()),
        _ => Value::String(arrow::util::display::array_value_to_string(array, row)?),
    };
    Ok(value)
}

/// Encode a table as an artifact.
///
/// `batch_size` bounds the rows per record batch and per Parquet row group.
pub fn encode(table: &DataTable, output: OutputFormat, batch_size: usize) -> Result<Bytes> {
    match output {
        OutputFormat::Jsonl => {
            let mut buf = Vec::new();
            for record in table.to_records() {
                serde_json::to_writer(&mut buf, &record).map_err(PipelineError::serialization)?;
                buf.push(b'\n');
            }
            Ok(Bytes::from(buf))
        }
        OutputFormat::Csv => {
            let (_, batches) = to_record_batches(table, batch_size)?;
            let mut buf = Vec::new();
            {
                let mut writer = arrow::csv::WriterBuilder::new()
                    .with_header(true)
                    .build(&mut buf);
                for batch in &batches {
                    writer.write(batch).map_err(PipelineError::serialization)?;
                }
            }
            Ok(Bytes::from(buf))
        }
        OutputFormat::Parquet => {
            let (schema, batches) = to_record_batches(table, batch_size)?;
            let props = WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .set_max_row_group_size(batch_size.max(1))
                .build();
            let mut buf = Vec::new();
            {
                let mut writer = ArrowWriter::try_new(&mut buf, schema, Some(props))
                    .map_err(PipelineError::serialization)?;
                for batch in &batches {
                    writer.write(batch).map_err(PipelineError::serialization)?;
                }
                writer.close().map_err(PipelineError::serialization)?;
            }
            Ok(Bytes::from(buf))
        }
    }
}

/// Arrow type each inferred column is stored as. Datetimes, nested values and
/// mixed columns are stored as UTF-8 text.
fn storage_type(values: &[Value]) -> DataType {
    match infer_column_type(values) {
        ColumnType::Integer if values.iter().all(|v| v.is_null() || v.as_i64().is_some()) => {
            DataType::Int64
        }
        ColumnType::Integer | ColumnType::Float => DataType::Float64,
        ColumnType::Boolean => DataType::Boolean,
        _ => DataType::Utf8,
    }
}

fn text_cell(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn build_array(values: &[Value], dtype: &DataType) -> ArrayRef {
    match dtype {
        DataType::Int64 => Arc::new(values.iter().map(Value::as_i64).collect::<Int64Array>()),
        DataType::Float64 => Arc::new(values.iter().map(Value::as_f64).collect::<Float64Array>()),
        DataType::Boolean => Arc::new(values.iter().map(Value::as_bool).collect::<BooleanArray>()),
        _ => Arc::new(values.iter().map(text_cell).collect::<StringArray>()),
    }
}

fn to_record_batches(table: &DataTable, batch_size: usize) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    if table.columns.is_empty() {
        return Err(PipelineError::serialization(
            "cannot encode a table without columns",
        ));
    }
    let columns: Vec<Vec<Value>> = (0..table.column_count())
        .map(|i| table.column_values(i))
        .collect();
    let types: Vec<DataType> = columns.iter().map(|c| storage_type(c)).collect();
    let schema: SchemaRef = Arc::new(Schema::new(
        table
            .columns
            .iter()
            .zip(&types)
            .map(|(name, dtype)| Field::new(name, dtype.clone(), true))
            .collect::<Vec<_>>(),
    ));

    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + batch_size).min(table.row_count());
        let arrays = columns
            .iter()
            .zip(&types)
            .map(|(values, dtype)| build_array(&values[start..end], dtype))
            .collect();
        batches.push(
            RecordBatch::try_new(schema.clone(), arrays).map_err(PipelineError::serialization)?,
        );
        start = end;
        if start >= table.row_count() {
            break;
        }
    }
    Ok((schema, batches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn demo() -> DataTable {
        DataTable::new(
            vec!["id".into(), "name".into(), "price".into(), "active".into()],
            vec![
                vec![json!(1), json!("Ana"), json!(9.5), json!(true)],
                vec![json!(2), json!("Bia, Jr"), Value::Null, json!(false)],
                vec![json!(3), Value::Null, json!(3.25), Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_decode_csv_infers_types() {
        let table = decode(Bytes::from_static(b"id,name\n1,Ana\n2,Bia\n3,\n"), FileFormat::Csv, b',').unwrap();
        assert_eq!(table.columns, vec!["id", "name"]);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.rows[0], vec![json!(1), json!("Ana")]);
        assert_eq!(table.rows[2][1], Value::Null);
    }

    #[test]
    fn test_decode_csv_with_semicolon() {
        let table = decode(Bytes::from_static(b"a;b\n1.5;x\n"), FileFormat::Csv, b';').unwrap();
        assert_eq!(table.rows[0], vec![json!(1.5), json!("x")]);
    }

    #[test]
    fn test_decode_empty_csv() {
        let table = decode(Bytes::from_static(b""), FileFormat::Csv, b',').unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_decode_json_shapes() {
        let list = decode(Bytes::from_static(br#"[{"id":1},{"id":2}]"#), FileFormat::Json, b',').unwrap();
        assert_eq!(list.row_count(), 2);

        let wrapped = decode(
            Bytes::from_static(br#"{"count":2,"results":[{"id":1},{"id":2}]}"#),
            FileFormat::Json,
            b',',
        )
        .unwrap();
        assert_eq!(wrapped.columns, vec!["id"]);
        assert_eq!(wrapped.row_count(), 2);

        let single = decode(Bytes::from_static(br#"{"id":7}"#), FileFormat::Json, b',').unwrap();
        assert_eq!(single.rows, vec![vec![json!(7)]]);

        assert!(decode(Bytes::from_static(b"42"), FileFormat::Json, b',').is_err());
    }

    #[test]
    fn test_decode_jsonl_reports_line() {
        let err = decode(Bytes::from_static(b"{\"a\":1}\nnot json\n"), FileFormat::Jsonl, b',')
            .unwrap_err()
            .to_string();
        assert!(err.contains("line 2"));
    }

    #[test]
    fn test_parquet_roundtrip() {
        let table = demo();
        let bytes = encode(&table, OutputFormat::Parquet, 2).unwrap();
        let decoded = decode(bytes, FileFormat::Parquet, b',').unwrap();
        assert_eq!(decoded, table);
    }

    #[test]
    fn test_csv_encoding_quotes_and_nulls() {
        let bytes = encode(&demo(), OutputFormat::Csv, 10).unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("id,name,price,active"));
        assert_eq!(lines.next(), Some("1,Ana,9.5,true"));
        assert_eq!(lines.next(), Some("2,\"Bia, Jr\",,false"));
    }

    #[test]
    fn test_csv_header_for_empty_table() {
        let table = DataTable::new(vec!["id".into()], vec![]).unwrap();
        let bytes = encode(&table, OutputFormat::Csv, 10).unwrap();
        assert_eq!(&bytes[..], b"id\n");
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let table = demo();
        for output in [OutputFormat::Parquet, OutputFormat::Csv, OutputFormat::Jsonl] {
            let a = encode(&table, output, 2).unwrap();
            let b = encode(&table, output, 2).unwrap();
            assert_eq!(a, b, "{output} output differs between runs");
        }
    }

    #[test]
    fn test_encode_rejects_columnless_table() {
        let table = DataTable::from_records(&[json!({}), json!({})]);
        assert!(encode(&table, OutputFormat::Parquet, 10).is_err());
    }

    #[test]
    fn test_formats_from_paths() {
        assert_eq!(FileFormat::from_path(Path::new("a/b.CSV")), Some(FileFormat::Csv));
        assert_eq!(FileFormat::from_path(Path::new("a/b.xlsx")), None);
        assert_eq!("jsonl".parse::<OutputFormat>().unwrap(), OutputFormat::Jsonl);
    }
}
