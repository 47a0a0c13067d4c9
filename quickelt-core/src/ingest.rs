//! Ingestion orchestrator.
//!
//! One run reads a source, checks the table, and writes a data artifact plus
//! its metadata sidecar under a single [`NamingKey`]. Either both files are
//! written or neither is.

use crate::columnar::{self, OutputFormat};
use crate::config::PipelineConfig;
use crate::contract::DataContract;
use crate::error::{PipelineError, Result};
use crate::logging::{Logger, messages};
use crate::metadata::{MetadataRecord, MetadataWriter, RunFacts};
use crate::naming::{NamingKey, StorageLayout, Tier};
use crate::notify::{Notifier, RunSummary};
use crate::persistence;
use crate::quality::{QualityGate, QualityReport};
use crate::retry::{RetryPolicy, with_retry};
use crate::source::{SourceInfo, SourceReader};
use crate::table::DataTable;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Attempts at finding an unused key before giving up.
const MAX_KEY_ATTEMPTS: u32 = 1_000;

/// What to ingest and where to put it.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub origin: String,
    /// Format token for the Naming Key; defaults to the source's token.
    pub format: Option<String>,
    pub tier: Tier,
    /// Defaults to `storage.default_output_format`.
    pub output_format: Option<OutputFormat>,
    pub contract: Option<DataContract>,
    /// Free-form run parameters copied into the sidecar.
    pub parameters: Map<String, Value>,
}

impl IngestRequest {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_output_format(mut self, output: OutputFormat) -> Self {
        self.output_format = Some(output);
        self
    }

    pub fn with_contract(mut self, contract: DataContract) -> Self {
        self.contract = Some(contract);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub key: NamingKey,
    pub data_path: PathBuf,
    pub metadata_path: PathBuf,
    pub row_count: usize,
    pub column_count: usize,
    pub quality: QualityReport,
}

/// Runs ingestions against one storage layout.
pub struct Ingestor {
    config: PipelineConfig,
    layout: StorageLayout,
    retry: RetryPolicy,
    gate: QualityGate,
    notifier: Option<Notifier>,
    logger: Logger,
}

impl Ingestor {
    /// Storage directories are resolved against the current directory; see
    /// [`with_root`](Self::with_root).
    pub fn new(config: PipelineConfig, logger: &Logger) -> Self {
        let layout = StorageLayout::from_config(&config.storage, Path::new("."));
        Self {
            retry: RetryPolicy::from(&config.retry),
            gate: QualityGate::from(&config.quality),
            layout,
            notifier: None,
            logger: logger.child("ingest"),
            config,
        }
    }

    /// Resolve relative storage directories against `root`.
    pub fn with_root(mut self, root: &Path) -> Self {
        self.layout = StorageLayout::from_config(&self.config.storage, root);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Post a summary after every run, using `notification.*` settings.
    pub fn with_notifications(mut self) -> Result<Self> {
        let timeout = Duration::from_secs(self.config.processing.http_timeout_secs);
        self.notifier = Notifier::from_config(&self.config.notification, timeout)?;
        Ok(self)
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one ingestion. Failures are logged before being returned.
    pub async fn run(
        &self,
        source: &dyn SourceReader,
        request: IngestRequest,
    ) -> Result<IngestOutcome> {
        let info = source.info();
        let origin = request.origin.clone();
        self.logger
            .info(messages::ingest_started(&origin, &info.kind, &info.location));

        let result = self.execute(source, &info, request).await;
        let summary = match &result {
            Ok(outcome) => {
                self.logger.info(messages::ingest_completed(
                    &origin,
                    outcome.row_count,
                    &outcome.data_path,
                ));
                let data_file = outcome
                    .data_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                RunSummary::success("ingest", &origin, outcome.row_count, &data_file)
            }
            Err(e) => {
                self.logger.error(messages::ingest_failed(&origin, e));
                RunSummary::failure("ingest", &origin, e)
            }
        };
        if let Some(notifier) = &self.notifier {
            notifier.notify(&summary, &self.logger).await;
        }
        result
    }

    async fn execute(
        &self,
        source: &dyn SourceReader,
        info: &SourceInfo,
        request: IngestRequest,
    ) -> Result<IngestOutcome> {
        let format_token = request.format.clone().unwrap_or_else(|| info.format.clone());
        // Reject a bad origin or format before touching the source.
        NamingKey::now(&request.origin, &format_token)?;

        self.layout.ensure_dirs()?;
        self.logger
            .debug(messages::directories_ready(self.layout.tier_dir(request.tier)));

        let mut table = with_retry(&self.retry, &self.logger, || source.read()).await?;
        self.logger
            .info(messages::source_loaded(table.row_count(), table.column_count()));

        if let Some(limit) = self.config.processing.row_limit {
            if table.row_count() > limit {
                table.truncate(limit);
                self.logger.info(messages::row_limit_applied(limit));
            }
        }

        if let Some(contract) = &request.contract {
            table = contract.validate(&table).inspect_err(|e| {
                if let PipelineError::ContractViolation { violations, .. } = e {
                    self.logger
                        .error(messages::contract_failed(&contract.name, violations.len()));
                }
            })?;
        }

        let quality = self.check_quality(&table)?;

        let output = request
            .output_format
            .unwrap_or(self.config.storage.default_output_format);
        let key = self.fresh_key(&request.origin, &format_token, request.tier, output)?;
        let data_path = self.layout.artifact_path(&key, request.tier, output);
        let metadata_path = self.layout.metadata_path(&key, request.tier);

        let artifact = columnar::encode(&table, output, self.config.processing.batch_size)
            .map_err(|e| PipelineError::write(&data_path, e))?;

        let mut parameters = request.parameters;
        if let Some(contract) = &request.contract {
            parameters.insert("contract".into(), Value::String(contract.name.clone()));
        }
        if let Some(limit) = self.config.processing.row_limit {
            parameters.insert("row_limit".into(), Value::from(limit));
        }
        let record = MetadataRecord::describe(
            RunFacts {
                key: &key,
                tier: request.tier,
                output,
                source_kind: &info.kind,
                source_location: &info.location,
                parameters,
            },
            &table,
            &artifact,
            Some(quality.clone()),
        );
        let sidecar = MetadataWriter::render_record(&record)?;

        persistence::write_pair(&data_path, &artifact, &metadata_path, &sidecar)
            .inspect_err(|e| self.logger.error(messages::save_failed(e)))?;
        self.logger.info(messages::data_saved(&data_path));
        self.logger.info(messages::metadata_saved(&metadata_path));

        Ok(IngestOutcome {
            key,
            data_path,
            metadata_path,
            row_count: table.row_count(),
            column_count: table.column_count(),
            quality,
        })
    }

    fn check_quality(&self, table: &DataTable) -> Result<QualityReport> {
        if table.is_empty() {
            self.logger.warn(messages::empty_table());
        }
        self.gate.enforce(table).inspect_err(|e| {
            if let PipelineError::QualityRejected { reason } = e {
                self.logger.warn(messages::quality_rejected(reason));
            }
        })
    }

    /// A key for "now" whose artifact and sidecar are both unused. Two runs in
    /// the same millisecond get consecutive timestamps.
    fn fresh_key(
        &self,
        origin: &str,
        format: &str,
        tier: Tier,
        output: OutputFormat,
    ) -> Result<NamingKey> {
        fresh_key(&self.layout, origin, format, tier, output)
    }
}

pub(crate) fn fresh_key(
    layout: &StorageLayout,
    origin: &str,
    format: &str,
    tier: Tier,
    output: OutputFormat,
) -> Result<NamingKey> {
    let start = Utc::now();
    for offset in 0..MAX_KEY_ATTEMPTS {
        let key = NamingKey::new(origin, format, start + ChronoDuration::milliseconds(offset.into()))?;
        let taken = layout.artifact_path(&key, tier, output).exists()
            || layout.metadata_path(&key, tier).exists();
        if !taken {
            return Ok(key);
        }
    }
    Err(PipelineError::write(
        layout.tier_dir(tier),
        format!("no unused file name for '{origin}_{format}'"),
    ))
}
