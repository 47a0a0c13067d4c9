//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::IngestArgs;
use crate::IngestSource;
use anyhow::Context;
use quickelt_core::config::{self, DatabaseKind, PipelineConfig};
use quickelt_core::logging::{self, LogLevel, Logger};
use quickelt_core::{
    Catalog, CleaningConfig, DataContract, IngestRequest, Ingestor, OutputFormat, SilverRunner,
    SourceDescriptor, StorageLayout, Tier,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// `-v`/`-q` flags, applied on top of the configured log level.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbosity {
    pub verbose: u8,
    pub quiet: bool,
}

impl Verbosity {
    fn overrides(self) -> Vec<(String, Value)> {
        let level = match self.verbose {
            0 if self.quiet => Some(LogLevel::Error),
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        };
        level
            .map(|l| vec![("logging.level".to_string(), Value::from(l.as_str()))])
            .unwrap_or_default()
    }
}

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    verbosity: Verbosity,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, verbosity),
        Commands::Setup => crate::setup::run_setup(workspace),
        command => {
            let config = config::load_validated(Some(workspace), &verbosity.overrides())
                .context("Failed to load configuration")?;
            let _guard = logging::init_tracing(&resolve_log_file(config.logging.clone(), workspace))?;
            let logger = Logger::from_config(&config.logging);
            match command {
                Commands::Ingest { source } => {
                    handle_ingest(source, config, workspace, &logger).await
                }
                Commands::Clean {
                    artifact,
                    config: cleaning,
                    output_format,
                } => handle_clean(&artifact, cleaning, output_format, config, workspace, &logger).await,
                Commands::List { tier, origin } => handle_list(&config, workspace, tier, origin),
                Commands::Verify => handle_verify(&config, workspace),
                Commands::Config { .. } | Commands::Setup => Ok(()),
            }
        }
    }
}

fn resolve_log_file(
    mut logging: config::LoggingConfig,
    workspace: &Path,
) -> config::LoggingConfig {
    if let Some(file) = logging.file.as_mut() {
        if file.is_relative() {
            *file = workspace.join(&*file);
        }
    }
    logging
}

/// A serialized ingestion: what to read and how to store it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobFile {
    pub origin: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub output_format: Option<OutputFormat>,
    /// Built-in contract name or a path relative to the job file.
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub source: SourceDescriptor,
}

impl JobFile {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file {}", path.display()))?;
        let mut job: JobFile = toml::from_str(&raw)
            .with_context(|| format!("Invalid job file {}", path.display()))?;

        // Local paths in a job are relative to the job file.
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        match &mut job.source {
            SourceDescriptor::File { path, .. } => *path = rebase(base, path),
            SourceDescriptor::Database {
                path: Some(path), ..
            } => *path = rebase(base, path),
            _ => {}
        }
        if let Some(contract) = job.contract.as_mut() {
            if quickelt_core::contract::builtin(contract).is_none() {
                *contract = rebase(base, Path::new(contract.as_str())).display().to_string();
            }
        }
        Ok(job)
    }

    fn request(&self) -> anyhow::Result<IngestRequest> {
        let mut request = IngestRequest::new(&self.origin).with_tier(self.tier);
        request.format = self.format.clone();
        request.output_format = self.output_format;
        request.parameters = self.parameters.clone();
        if let Some(contract) = &self.contract {
            request = request.with_contract(DataContract::resolve(contract)?);
        }
        Ok(request)
    }
}

fn rebase(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Parse a `key=value` run parameter. Values that parse as JSON keep their type.
pub fn parse_param(raw: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Parameter '{}' is not in key=value form", raw))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Parameter '{}' has an empty key", raw);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn build_request(args: &IngestArgs) -> anyhow::Result<IngestRequest> {
    let mut request = IngestRequest::new(&args.origin).with_tier(args.tier);
    if let Some(token) = &args.format_token {
        request = request.with_format(token);
    }
    if let Some(output) = args.output_format {
        request = request.with_output_format(output);
    }
    if let Some(contract) = &args.contract {
        request = request.with_contract(DataContract::resolve(contract)?);
    }
    for raw in &args.params {
        let (key, value) = parse_param(raw)?;
        request = request.with_parameter(key, value);
    }
    Ok(request)
}

fn descriptor(source: IngestSource) -> anyhow::Result<(SourceDescriptor, IngestRequest)> {
    let (descriptor, args) = match source {
        IngestSource::File {
            path,
            format,
            delimiter,
            args,
        } => (
            SourceDescriptor::File {
                path,
                format,
                delimiter,
            },
            args,
        ),
        IngestSource::Database { query, db, args } => {
            (SourceDescriptor::Database { path: db, query }, args)
        }
        IngestSource::Api {
            endpoint,
            token,
            method,
            results_key,
            args,
        } => (
            SourceDescriptor::Api {
                endpoint,
                token,
                method,
                headers: Default::default(),
                body: None,
                results_key,
            },
            args,
        ),
        IngestSource::Sharepoint {
            file_url,
            token,
            delimiter,
            args,
        } => (
            SourceDescriptor::SharePoint {
                file_url,
                token,
                delimiter,
            },
            args,
        ),
        IngestSource::Web {
            url,
            table_index,
            args,
        } => (
            SourceDescriptor::WebPage {
                url,
                table_index,
                user_agent: None,
            },
            args,
        ),
        IngestSource::S3 {
            key,
            bucket,
            format,
            delimiter,
            args,
        } => (
            SourceDescriptor::ObjectStorage {
                key,
                bucket,
                format,
                delimiter,
            },
            args,
        ),
        IngestSource::Job { path } => {
            let job = JobFile::from_path(&path)?;
            let request = job.request()?;
            return Ok((job.source, request));
        }
    };
    Ok((descriptor, build_request(&args)?))
}

async fn handle_ingest(
    source: IngestSource,
    config: PipelineConfig,
    workspace: &Path,
    logger: &Logger,
) -> anyhow::Result<()> {
    let (descriptor, request) = descriptor(source)?;
    let reader = descriptor.reader(&config)?;
    let ingestor = Ingestor::new(config, logger)
        .with_root(workspace)
        .with_notifications()?;

    let outcome = ingestor.run(reader.as_ref(), request).await?;
    println!("Stored {} rows x {} columns", outcome.row_count, outcome.column_count);
    println!("  data:     {}", outcome.data_path.display());
    println!("  metadata: {}", outcome.metadata_path.display());
    Ok(())
}

async fn handle_clean(
    artifact: &Path,
    cleaning: Option<PathBuf>,
    output_format: Option<OutputFormat>,
    config: PipelineConfig,
    workspace: &Path,
    logger: &Logger,
) -> anyhow::Result<()> {
    let cleaning = match cleaning {
        Some(path) => CleaningConfig::from_path(&path)?,
        None => CleaningConfig::default(),
    };
    let mut runner = SilverRunner::new(config, logger)
        .with_root(workspace)
        .with_notifications()?;
    if let Some(output) = output_format {
        runner = runner.with_output_format(output);
    }

    let outcome = runner.run(artifact, &cleaning).await?;
    println!("Cleaned into {} rows x {} columns", outcome.row_count, outcome.column_count);
    for pass in outcome.report.passes.iter().filter(|p| p.applied) {
        println!(
            "  {:<15} rows {:>6} -> {:<6} changes {}",
            pass.pass.as_str(),
            pass.rows_before,
            pass.rows_after,
            pass.changes
        );
    }
    println!("  data:     {}", outcome.data_path.display());
    println!("  metadata: {}", outcome.metadata_path.display());
    Ok(())
}

fn handle_list(
    config: &PipelineConfig,
    workspace: &Path,
    tier: Option<Tier>,
    origin: Option<String>,
) -> anyhow::Result<()> {
    let layout = StorageLayout::from_config(&config.storage, workspace);
    let catalog = Catalog::scan(&layout)?;

    let entries: Vec<_> = catalog
        .entries(tier)
        .filter(|e| origin.as_deref().is_none_or(|o| e.key.origin() == o))
        .collect();
    if entries.is_empty() {
        println!("No artifacts found.");
    }
    for entry in &entries {
        println!(
            "{:<7} {:<20} {:<8} {:>8} rows  {}",
            entry.tier.as_str(),
            entry.key.origin(),
            entry.key.format(),
            entry.record.row_count,
            entry.data_path.display()
        );
    }
    if !catalog.is_consistent() {
        println!(
            "\n{} unpaired file(s); run `quickelt verify` for details.",
            catalog.issues().len()
        );
    }
    Ok(())
}

fn handle_verify(config: &PipelineConfig, workspace: &Path) -> anyhow::Result<()> {
    let layout = StorageLayout::from_config(&config.storage, workspace);
    let catalog = Catalog::scan(&layout)?;
    if catalog.is_consistent() {
        println!("All {} artifact(s) are paired with metadata.", catalog.len());
        return Ok(());
    }
    for issue in catalog.issues() {
        eprintln!("  {issue}");
    }
    anyhow::bail!("{} pairing issue(s) found", catalog.issues().len())
}

fn handle_config(action: ConfigAction, workspace: &Path, verbosity: Verbosity) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            if config::config_exists(workspace) {
                println!(
                    "Configuration file already exists at: {}",
                    workspace.join(config::CONFIG_FILE_NAME).display()
                );
                return Ok(());
            }
            let path = config::write_config(workspace, &PipelineConfig::default())?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = config::load_config(Some(workspace), &verbosity.overrides())
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            println!("{}", toml::to_string_pretty(&masked(&config))?);
            Ok(())
        }
        ConfigAction::Check => {
            let config = config::load_validated(Some(workspace), &verbosity.overrides())?;
            println!("Configuration is valid.");
            for kind in DatabaseKind::ALL {
                if let Some(url) = config.databases.masked_connection_url(kind) {
                    println!("  {:<10} {}", kind.name(), url);
                }
            }
            Ok(())
        }
    }
}

const MASK: &str = "****";

/// Copy of the configuration with every credential replaced by a mask.
pub fn masked(config: &PipelineConfig) -> PipelineConfig {
    let hide = |value: &mut Option<String>| {
        if value.is_some() {
            *value = Some(MASK.to_string());
        }
    };
    let mut config = config.clone();
    hide(&mut config.s3.access_key_id);
    hide(&mut config.s3.secret_access_key);
    for db in [
        &mut config.databases.postgres,
        &mut config.databases.mysql,
        &mut config.databases.oracle,
        &mut config.databases.sqlserver,
    ] {
        hide(&mut db.password);
    }
    hide(&mut config.sharepoint.client_secret);
    hide(&mut config.sharepoint.token);
    hide(&mut config.api.key);
    hide(&mut config.api.secret);
    config.notification.webhook_url = config.notification.webhook_url.as_deref().map(mask_url_path);
    config
}

/// Keep a URL's scheme and host; webhook paths usually carry the token.
fn mask_url_path(url: &str) -> String {
    let host_start = url.find("://").map_or(0, |i| i + 3);
    match url[host_start..].find('/') {
        Some(slash) => format!("{}/{MASK}", &url[..host_start + slash]),
        None => MASK.to_string(),
    }
}
