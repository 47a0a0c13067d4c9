//! Bronze to silver runs.

use crate::cleaning::{CleaningConfig, CleaningReport, clean};
use crate::columnar::{self, OutputFormat};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::ingest::fresh_key;
use crate::logging::{Logger, messages};
use crate::metadata::{MetadataRecord, MetadataWriter, RunFacts};
use crate::naming::{NamingKey, StorageLayout, Tier};
use crate::notify::{Notifier, RunSummary};
use crate::persistence;
use crate::quality::QualityGate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverOutcome {
    pub key: NamingKey,
    pub data_path: PathBuf,
    pub metadata_path: PathBuf,
    pub row_count: usize,
    pub column_count: usize,
    pub report: CleaningReport,
}

/// Cleans bronze artifacts into the silver tier.
pub struct SilverRunner {
    config: PipelineConfig,
    layout: StorageLayout,
    output: Option<OutputFormat>,
    notifier: Option<Notifier>,
    logger: Logger,
}

impl SilverRunner {
    pub fn new(config: PipelineConfig, logger: &Logger) -> Self {
        let layout = StorageLayout::from_config(&config.storage, Path::new("."));
        Self {
            config,
            layout,
            output: None,
            notifier: None,
            logger: logger.child("silver"),
        }
    }

    pub fn with_root(mut self, root: &Path) -> Self {
        self.layout = StorageLayout::from_config(&self.config.storage, root);
        self
    }

    /// Write silver artifacts in this format instead of the bronze one.
    pub fn with_output_format(mut self, output: OutputFormat) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_notifications(mut self) -> Result<Self> {
        let timeout = Duration::from_secs(self.config.processing.http_timeout_secs);
        self.notifier = Notifier::from_config(&self.config.notification, timeout)?;
        Ok(self)
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Clean one bronze artifact. The silver pair keeps the origin and format
    /// of the bronze key under a fresh timestamp.
    pub async fn run(&self, bronze: &Path, cleaning: &CleaningConfig) -> Result<SilverOutcome> {
        self.logger.info(messages::cleaning_started(bronze));
        let result = self.execute(bronze, cleaning);

        let origin = NamingKey::from_artifact_path(bronze)
            .map(|(key, _)| key.origin().to_string())
            .unwrap_or_else(|_| bronze.display().to_string());
        let summary = match &result {
            Ok(outcome) => {
                self.logger.info(messages::cleaning_completed(
                    &outcome.data_path,
                    outcome.row_count,
                ));
                let data_file = outcome
                    .data_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                RunSummary::success("clean", &origin, outcome.row_count, &data_file)
            }
            Err(e) => {
                self.logger.error(messages::cleaning_failed(e));
                RunSummary::failure("clean", &origin, e)
            }
        };
        if let Some(notifier) = &self.notifier {
            notifier.notify(&summary, &self.logger).await;
        }
        result
    }

    fn execute(&self, bronze: &Path, cleaning: &CleaningConfig) -> Result<SilverOutcome> {
        let (bronze_key, bronze_output) = NamingKey::from_artifact_path(bronze)?;
        let raw = std::fs::read(bronze).map_err(|e| {
            PipelineError::unreachable("file", bronze.display().to_string(), e.to_string())
        })?;
        let table = columnar::decode(raw.into(), bronze_output.as_file_format(), b',')?;
        self.logger
            .info(messages::source_loaded(table.row_count(), table.column_count()));

        let (cleaned, report) = clean(&table, cleaning)?;
        for pass in report.passes.iter().filter(|p| p.applied) {
            self.logger.debug(messages::cleaning_pass(
                pass.pass.as_str(),
                pass.rows_after,
                pass.columns_after,
            ));
        }

        self.layout.ensure_dirs()?;
        let output = self.output.unwrap_or(bronze_output);
        let key = fresh_key(
            &self.layout,
            bronze_key.origin(),
            bronze_key.format(),
            Tier::Silver,
            output,
        )?;
        let data_path = self.layout.artifact_path(&key, Tier::Silver, output);
        let metadata_path = self.layout.metadata_path(&key, Tier::Silver);

        let artifact = columnar::encode(&cleaned, output, self.config.processing.batch_size)
            .map_err(|e| PipelineError::write(&data_path, e))?;

        let mut parameters = Map::new();
        parameters.insert(
            "parent_artifact".into(),
            Value::String(bronze_key.artifact_file_name(bronze_output)),
        );
        parameters.insert(
            "cleaning".into(),
            serde_json::to_value(&report).map_err(PipelineError::serialization)?,
        );
        let quality = QualityGate::from(&self.config.quality).assess(&cleaned);
        let location = bronze.display().to_string();
        let record = MetadataRecord::describe(
            RunFacts {
                key: &key,
                tier: Tier::Silver,
                output,
                source_kind: "bronze",
                source_location: &location,
                parameters,
            },
            &cleaned,
            &artifact,
            Some(quality),
        );
        let sidecar = MetadataWriter::render_record(&record)?;
        persistence::write_pair(&data_path, &artifact, &metadata_path, &sidecar)
            .inspect_err(|e| self.logger.error(messages::save_failed(e)))?;
        self.logger.info(messages::data_saved(&data_path));
        self.logger.info(messages::metadata_saved(&metadata_path));

        Ok(SilverOutcome {
            key,
            data_path,
            metadata_path,
            row_count: cleaned.row_count(),
            column_count: cleaned.column_count(),
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::logging::{Language, LogLevel};
    use crate::table::DataTable;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_bronze(dir: &TempDir, output: OutputFormat) -> (StorageLayout, PathBuf) {
        let layout = StorageLayout::from_config(&Default::default(), dir.path());
        layout.ensure_dirs().unwrap();
        let key = NamingKey::now("sales", "csv").unwrap();
        let table = DataTable::new(
            vec!["Product Name".into(), "Qty".into()],
            vec![
                vec![json!(" Pen! "), json!(2)],
                vec![json!(" Pen! "), json!(2)],
                vec![json!("INK"), Value::Null],
            ],
        )
        .unwrap();
        let path = layout.artifact_path(&key, Tier::Bronze, output);
        std::fs::write(&path, columnar::encode(&table, output, 100).unwrap()).unwrap();
        (layout, path)
    }

    #[tokio::test]
    async fn test_run_writes_silver_pair() {
        let dir = TempDir::new().unwrap();
        let (layout, bronze) = write_bronze(&dir, OutputFormat::Parquet);
        let (logger, sink) = Logger::new("test", LogLevel::Debug, Language::En).with_memory_sink();
        let runner = SilverRunner::new(PipelineConfig::default(), &logger).with_root(dir.path());

        let outcome = runner.run(&bronze, &CleaningConfig::default()).await.unwrap();
        assert!(outcome.data_path.starts_with(&layout.silver));
        assert_eq!(outcome.key.origin(), "sales");
        assert_eq!(outcome.key.format(), "csv");
        assert_eq!(outcome.row_count, 2);

        let silver = columnar::decode(
            std::fs::read(&outcome.data_path).unwrap().into(),
            columnar::FileFormat::Parquet,
            b',',
        )
        .unwrap();
        assert_eq!(silver.columns, vec!["product_name", "qty"]);
        assert_eq!(silver.rows[0][0], json!("pen"));

        let record = MetadataRecord::from_path(&outcome.metadata_path).unwrap();
        assert_eq!(record.tier, Tier::Silver);
        assert_eq!(
            record.parameters["parent_artifact"],
            bronze.file_name().unwrap().to_str().unwrap()
        );
        assert!(record.parameters["cleaning"]["passes"].is_array());
        assert!(sink.contains(LogLevel::Debug, "Pass 'text' finished"));
        assert!(sink.contains(LogLevel::Info, "Cleaning completed"));
        assert!(bronze.exists());
    }

    #[tokio::test]
    async fn test_output_format_override() {
        let dir = TempDir::new().unwrap();
        let (_, bronze) = write_bronze(&dir, OutputFormat::Jsonl);
        let logger = Logger::new("test", LogLevel::Info, Language::Pt);
        let runner = SilverRunner::new(PipelineConfig::default(), &logger)
            .with_root(dir.path())
            .with_output_format(OutputFormat::Csv);
        let outcome = runner.run(&bronze, &CleaningConfig::default()).await.unwrap();
        assert_eq!(outcome.data_path.extension().unwrap(), "csv");
    }

    #[tokio::test]
    async fn test_rejects_files_outside_the_convention() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("random.parquet");
        std::fs::write(&path, b"x").unwrap();
        let (logger, sink) = Logger::new("test", LogLevel::Info, Language::Pt).with_memory_sink();
        let runner = SilverRunner::new(PipelineConfig::default(), &logger).with_root(dir.path());
        let err = runner.run(&path, &CleaningConfig::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(sink.contains(LogLevel::Error, "Erro ao processar dados"));
    }
}
