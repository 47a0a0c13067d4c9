//! Source readers: everything that can produce a [`DataTable`] for a run.
//!
//! A [`SourceDescriptor`] is the serializable description of where data comes
//! from (used by CLI flags and job files); [`SourceDescriptor::reader`] turns it
//! into a [`SourceReader`] using the connection settings in [`PipelineConfig`].

pub mod api;
pub mod database;
pub mod file;
pub mod object_storage;
pub mod sharepoint;
pub mod web;

use crate::columnar::FileFormat;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::table::DataTable;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub use self::api::ApiSource;
pub use self::database::SqliteSource;
pub use self::file::FileSource;
pub use self::object_storage::ObjectStoreSource;
pub use self::sharepoint::SharePointSource;
pub use self::web::WebPageSource;

/// Where a table came from, as recorded in logs and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Reader kind (`file`, `database`, `api`, ...).
    pub kind: String,
    /// Path, URL or object key.
    pub location: String,
    /// Token used as the `format` part of the Naming Key.
    pub format: String,
}

/// Trait for reading a table from a source.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Fetch the table. Transient failures are reported as retryable errors.
    async fn read(&self) -> Result<DataTable>;

    fn info(&self) -> SourceInfo;
}

/// Serializable description of a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceDescriptor {
    File {
        path: PathBuf,
        /// Defaults to the file extension.
        #[serde(default)]
        format: Option<FileFormat>,
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
    Database {
        /// SQLite file; defaults to `databases.sqlite_path`.
        #[serde(default)]
        path: Option<PathBuf>,
        query: String,
    },
    Api {
        /// Absolute URL, or a path joined to `api.base_url`.
        endpoint: String,
        /// Bearer token; defaults to `api.key`.
        #[serde(default)]
        token: Option<String>,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        body: Option<serde_json::Value>,
        #[serde(default = "default_results_key")]
        results_key: String,
    },
    SharePoint {
        file_url: String,
        /// Bearer token; defaults to `sharepoint.token`, then client credentials.
        #[serde(default)]
        token: Option<String>,
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
    WebPage {
        /// Defaults to `scraping.url`.
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        table_index: usize,
        #[serde(default)]
        user_agent: Option<String>,
    },
    ObjectStorage {
        key: String,
        /// Defaults to `s3.bucket`.
        #[serde(default)]
        bucket: Option<String>,
        /// Defaults to the key's extension.
        #[serde(default)]
        format: Option<FileFormat>,
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
}

fn default_delimiter() -> char {
    ','
}
fn default_method() -> String {
    "GET".to_string()
}
fn default_results_key() -> String {
    "results".to_string()
}

impl SourceDescriptor {
    /// Build the reader for this descriptor.
    pub fn reader(&self, config: &PipelineConfig) -> Result<Box<dyn SourceReader>> {
        let timeout = Duration::from_secs(config.processing.http_timeout_secs);
        let reader: Box<dyn SourceReader> = match self {
            Self::File {
                path,
                format,
                delimiter,
            } => Box::new(FileSource::new(path.clone(), *format, delimiter_byte(*delimiter)?)?),
            Self::Database { path, query } => {
                let path = path
                    .clone()
                    .or_else(|| config.databases.sqlite_path.clone())
                    .ok_or_else(|| {
                        PipelineError::config(
                            "database source needs a path or databases.sqlite_path",
                        )
                    })?;
                Box::new(SqliteSource::new(path, query.clone()))
            }
            Self::Api {
                endpoint,
                token,
                method,
                headers,
                body,
                results_key,
            } => {
                let url = api::resolve_endpoint(config.api.base_url.as_deref(), endpoint)?;
                let timeout = Duration::from_secs(config.api.timeout_secs);
                Box::new(
                    ApiSource::new(url, http_client(timeout, None)?)
                        .with_token(token.clone().or_else(|| config.api.key.clone()))
                        .with_method(method)
                        .with_headers(headers.clone())
                        .with_body(body.clone())
                        .with_results_key(results_key),
                )
            }
            Self::SharePoint {
                file_url,
                token,
                delimiter,
            } => Box::new(
                SharePointSource::new(
                    file_url.clone(),
                    config.sharepoint.clone(),
                    http_client(timeout, None)?,
                )
                .with_token(token.clone())
                .with_delimiter(delimiter_byte(*delimiter)?),
            ),
            Self::WebPage {
                url,
                table_index,
                user_agent,
            } => {
                let url = url.clone().or_else(|| config.scraping.url.clone()).ok_or_else(|| {
                    PipelineError::config("web source needs a url or scraping.url")
                })?;
                let agent = user_agent
                    .clone()
                    .unwrap_or_else(|| config.scraping.user_agent.clone());
                Box::new(WebPageSource::new(
                    url,
                    *table_index,
                    http_client(timeout, Some(&agent))?,
                ))
            }
            Self::ObjectStorage {
                key,
                bucket,
                format,
                delimiter,
            } => Box::new(ObjectStoreSource::from_s3_config(
                &config.s3,
                bucket.as_deref(),
                key,
                *format,
                delimiter_byte(*delimiter)?,
            )?),
        };
        Ok(reader)
    }
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| PipelineError::invalid_input(format!("delimiter '{delimiter}' is not ASCII")))
}

/// Shared HTTP client construction for the network readers.
pub(crate) fn http_client(timeout: Duration, user_agent: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(agent) = user_agent {
        builder = builder.user_agent(agent.to_string());
    }
    builder
        .build()
        .map_err(|e| PipelineError::config(format!("cannot build HTTP client: {e}")))
}
