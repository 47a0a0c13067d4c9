//! Metadata sidecars.
//!
//! A [`MetadataRecord`] describes one run. [`MetadataWriter::render`] turns any
//! field map into the sidecar payload and refuses to produce something that
//! would not parse back.

use crate::columnar::OutputFormat;
use crate::error::{PipelineError, Result};
use crate::naming::{NamingKey, StorageLayout, Tier};
use crate::quality::QualityReport;
use crate::schema::{ColumnType, infer_schema};
use crate::table::DataTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Fields every sidecar must carry.
pub const REQUIRED_FIELDS: &[&str] = &["origin", "format", "timestamp", "row_count", "column_count"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub dtype: ColumnType,
    pub null_count: usize,
}

/// Descriptive facts about the run that produced an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub origin: String,
    pub format: String,
    pub output_format: OutputFormat,
    pub tier: Tier,
    /// Naming Key timestamp, as rendered in the file names.
    pub timestamp: String,
    pub generated_at: DateTime<Utc>,
    /// Unique per run, even for runs sharing a timestamp.
    #[serde(default)]
    pub run_id: Uuid,
    pub status: String,
    pub source_kind: String,
    pub source_location: String,
    /// File name of the paired artifact.
    pub data_file: String,
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<ColumnMetadata>,
    pub checksum_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Inputs for [`MetadataRecord::describe`] that do not come from the table.
#[derive(Debug, Clone)]
pub struct RunFacts<'a> {
    pub key: &'a NamingKey,
    pub tier: Tier,
    pub output: OutputFormat,
    pub source_kind: &'a str,
    pub source_location: &'a str,
    pub parameters: Map<String, Value>,
}

impl MetadataRecord {
    /// Describe a successful run from its key, table and encoded artifact.
    pub fn describe(
        facts: RunFacts<'_>,
        table: &DataTable,
        artifact: &[u8],
        quality: Option<QualityReport>,
    ) -> Self {
        let schema = infer_schema(table);
        let null_counts = table.null_counts();
        let columns = schema
            .columns
            .into_iter()
            .zip(null_counts)
            .map(|(col, null_count)| ColumnMetadata {
                name: col.name,
                dtype: col.dtype,
                null_count,
            })
            .collect();

        Self {
            origin: facts.key.origin().to_string(),
            format: facts.key.format().to_string(),
            output_format: facts.output,
            tier: facts.tier,
            timestamp: facts.key.timestamp_str(),
            generated_at: Utc::now(),
            run_id: Uuid::new_v4(),
            status: "success".to_string(),
            source_kind: facts.source_kind.to_string(),
            source_location: facts.source_location.to_string(),
            data_file: facts.key.artifact_file_name(facts.output),
            row_count: table.row_count(),
            column_count: table.column_count(),
            columns,
            checksum_sha256: hash_bytes(artifact),
            quality,
            parameters: facts.parameters,
        }
    }

    pub fn to_fields(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self).map_err(PipelineError::serialization)? {
            Value::Object(map) => Ok(map),
            _ => Err(PipelineError::serialization(
                "metadata record did not serialize to an object",
            )),
        }
    }

    /// Read a sidecar back.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path).map_err(|e| {
            PipelineError::invalid_input(format!("cannot read metadata {}: {e}", path.display()))
        })?;
        serde_json::from_slice(&raw).map_err(|e| {
            PipelineError::invalid_input(format!("malformed metadata {}: {e}", path.display()))
        })
    }

    /// The key this record was written under.
    pub fn naming_key(&self) -> Result<NamingKey> {
        NamingKey::parse_stem(&format!("{}_{}_{}", self.origin, self.format, self.timestamp))
    }
}

/// Serializes field maps into sidecar payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataWriter;

impl MetadataWriter {
    /// Render a sidecar. Fails with a write-failure error when a required field
    /// is missing or the output would not parse.
    pub fn render(fields: &Map<String, Value>) -> Result<Vec<u8>> {
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|f| fields.get(*f).is_none_or(Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::serialization(format!(
                "metadata is missing required fields: {}",
                missing.join(", ")
            )));
        }

        let rendered = serde_json::to_vec_pretty(fields).map_err(PipelineError::serialization)?;
        let reparsed: Value =
            serde_json::from_slice(&rendered).map_err(PipelineError::serialization)?;
        if !reparsed.is_object() {
            return Err(PipelineError::serialization("metadata did not render as an object"));
        }
        Ok(rendered)
    }

    pub fn render_record(record: &MetadataRecord) -> Result<Vec<u8>> {
        Self::render(&record.to_fields()?)
    }

    /// Sidecar path for a key, derived from the same key as the artifact.
    pub fn sidecar_path(layout: &StorageLayout, key: &NamingKey, tier: Tier) -> PathBuf {
        layout.metadata_path(key, tier)
    }
}

/// SHA-256 of arbitrary bytes, hex encoded.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn record() -> MetadataRecord {
        let key = NamingKey::now("demo", "csv").unwrap();
        let table = DataTable::new(
            vec!["id".into(), "name".into()],
            vec![vec![json!(1), json!("a")], vec![json!(2), Value::Null]],
        )
        .unwrap();
        let mut parameters = Map::new();
        parameters.insert("path".into(), json!("input.csv"));
        MetadataRecord::describe(
            RunFacts {
                key: &key,
                tier: Tier::Bronze,
                output: OutputFormat::Parquet,
                source_kind: "file",
                source_location: "input.csv",
                parameters,
            },
            &table,
            b"artifact",
            None,
        )
    }

    #[test]
    fn test_describe_fills_counts_and_columns() {
        let record = record();
        assert_eq!(record.row_count, 2);
        assert_eq!(record.column_count, 2);
        assert_eq!(record.columns[1].null_count, 1);
        assert_eq!(record.columns[0].dtype, ColumnType::Integer);
        assert_eq!(record.status, "success");
        assert!(!record.run_id.is_nil());
        assert!(record.data_file.ends_with(".parquet"));
        assert_eq!(record.checksum_sha256, hash_bytes(b"artifact"));
        assert_eq!(record.naming_key().unwrap().origin(), "demo");
    }

    #[test]
    fn test_render_roundtrip() {
        let record = record();
        let bytes = MetadataWriter::render_record(&record).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["origin"], "demo");
        assert_eq!(value["format"], "csv");
        assert_eq!(value["row_count"], 2);
        assert_eq!(value["parameters"]["path"], "input.csv");

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("demo_metadata.json");
        std::fs::write(&path, &bytes).unwrap();
        assert_eq!(MetadataRecord::from_path(&path).unwrap(), record);
    }

    #[test]
    fn test_render_requires_fields() {
        let mut fields = Map::new();
        fields.insert("origin".into(), json!("demo"));
        fields.insert("format".into(), Value::Null);
        let err = MetadataWriter::render(&fields).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteFailure);
        let msg = err.to_string();
        assert!(msg.contains("format"));
        assert!(msg.contains("row_count"));
    }

    #[test]
    fn test_render_accepts_free_form_fields() {
        let fields = json!({
            "origin": "demo",
            "format": "api",
            "timestamp": "2026-01-01_000000_000",
            "row_count": 0,
            "column_count": 0,
            "extra": {"nested": [1, 2]}
        });
        let Value::Object(map) = fields else { unreachable!() };
        let bytes = MetadataWriter::render(&map).unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains("\"nested\""));
    }

    #[test]
    fn test_malformed_sidecar_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken_metadata.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(MetadataRecord::from_path(&path).unwrap_err().to_string().contains("malformed"));
    }
}
