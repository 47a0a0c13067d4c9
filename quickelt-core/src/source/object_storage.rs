//! Object storage (S3 and compatible) source.

use super::{SourceInfo, SourceReader};
use crate::columnar::{self, FileFormat};
use crate::config::S3Config;
use crate::error::{PipelineError, Result};
use crate::table::DataTable;
use async_trait::async_trait;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use std::sync::Arc;

/// Reads one object and decodes it as a table.
pub struct ObjectStoreSource {
    store: Arc<dyn ObjectStore>,
    location: String,
    key: ObjectPath,
    format: FileFormat,
    delimiter: u8,
}

impl std::fmt::Debug for ObjectStoreSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreSource")
            .field("location", &self.location)
            .field("format", &self.format)
            .finish()
    }
}

impl ObjectStoreSource {
    /// Read `key` from any store. `location` is only used for logs and metadata.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        location: impl Into<String>,
        key: &str,
        format: Option<FileFormat>,
        delimiter: u8,
    ) -> Result<Self> {
        let format = match format {
            Some(f) => f,
            None => FileFormat::from_path(std::path::Path::new(key)).ok_or_else(|| {
                PipelineError::invalid_input(format!(
                    "cannot tell the format of object '{key}' from its extension"
                ))
            })?,
        };
        let key = ObjectPath::parse(key)
            .map_err(|e| PipelineError::invalid_input(format!("invalid object key '{key}': {e}")))?;
        Ok(Self {
            store,
            location: location.into(),
            key,
            format,
            delimiter,
        })
    }

    /// Build an S3 reader from the `[s3]` section. `key` may be a full
    /// `s3://bucket/key` URL, otherwise the bucket comes from `bucket` or
    /// `s3.bucket` and `s3.prefix` is prepended.
    pub fn from_s3_config(
        config: &S3Config,
        bucket: Option<&str>,
        key: &str,
        format: Option<FileFormat>,
        delimiter: u8,
    ) -> Result<Self> {
        let (bucket, key) = resolve_bucket_and_key(config, bucket, key)?;

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&bucket)
            .with_region(&config.region)
            .with_allow_http(config.allow_http);
        if let (Some(id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder
                .with_access_key_id(id)
                .with_secret_access_key(secret);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        let store = builder
            .build()
            .map_err(|e| PipelineError::config(format!("invalid S3 configuration: {e}")))?;

        let location = format!("s3://{bucket}/{key}");
        Self::new(Arc::new(store), location, &key, format, delimiter)
    }
}

fn resolve_bucket_and_key(
    config: &S3Config,
    bucket: Option<&str>,
    key: &str,
) -> Result<(String, String)> {
    if let Some(rest) = key.strip_prefix("s3://") {
        let (bucket, key) = rest.split_once('/').ok_or_else(|| {
            PipelineError::invalid_input(format!("'{key}' has no object key after the bucket"))
        })?;
        return Ok((bucket.to_string(), key.to_string()));
    }
    let bucket = bucket
        .map(str::to_string)
        .or_else(|| config.bucket.clone())
        .ok_or_else(|| PipelineError::config("object storage source needs a bucket or s3.bucket"))?;
    let prefix = config.prefix.trim_matches('/');
    let key = key.trim_start_matches('/');
    let key = if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    };
    Ok((bucket, key))
}

#[async_trait]
impl SourceReader for ObjectStoreSource {
    async fn read(&self) -> Result<DataTable> {
        let fetched = async {
            let result = self.store.get(&self.key).await?;
            result.bytes().await
        }
        .await;
        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e @ (object_store::Error::NotFound { .. } | object_store::Error::InvalidPath { .. })) => {
                return Err(PipelineError::unreachable("s3", &self.location, e.to_string()));
            }
            Err(e) => return Err(PipelineError::transient("s3", &self.location, e.to_string())),
        };
        columnar::decode(bytes, self.format, self.delimiter)
            .map_err(|e| PipelineError::unreachable("s3", &self.location, e.to_string()))
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            kind: "s3".to_string(),
            location: self.location.clone(),
            format: "s3".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use object_store::memory::InMemory;
    use serde_json::json;

    #[tokio::test]
    async fn test_reads_object_from_store() {
        let store = Arc::new(InMemory::new());
        store
            .put(
                &ObjectPath::from("raw/sales.jsonl"),
                bytes::Bytes::from_static(b"{\"id\":1,\"total\":9.5}\n{\"id\":2,\"total\":3}\n").into(),
            )
            .await
            .unwrap();

        let source =
            ObjectStoreSource::new(store, "memory://raw/sales.jsonl", "raw/sales.jsonl", None, b',')
                .unwrap();
        let table = source.read().await.unwrap();
        assert_eq!(table.columns, vec!["id", "total"]);
        assert_eq!(table.rows[0], vec![json!(1), json!(9.5)]);
        assert_eq!(source.info().format, "s3");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_retryable() {
        let source = ObjectStoreSource::new(
            Arc::new(InMemory::new()),
            "memory://missing.csv",
            "missing.csv",
            None,
            b',',
        )
        .unwrap();
        let err = source.read().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceUnreachable);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_bucket_and_key_resolution() {
        let mut config = S3Config::default();
        assert!(resolve_bucket_and_key(&config, None, "a.csv").is_err());

        config.bucket = Some("lake".into());
        config.prefix = "landing/".into();
        assert_eq!(
            resolve_bucket_and_key(&config, None, "/a.csv").unwrap(),
            ("lake".to_string(), "landing/a.csv".to_string())
        );
        assert_eq!(
            resolve_bucket_and_key(&config, Some("other"), "a.csv").unwrap().0,
            "other"
        );
        assert_eq!(
            resolve_bucket_and_key(&config, None, "s3://raw/x/y.parquet").unwrap(),
            ("raw".to_string(), "x/y.parquet".to_string())
        );
    }

    #[test]
    fn test_s3_reader_from_config() {
        let config = S3Config {
            bucket: Some("lake".into()),
            access_key_id: Some("AKIA".into()),
            secret_access_key: Some("secret".into()),
            endpoint: Some("http://localhost:9000".into()),
            allow_http: true,
            ..S3Config::default()
        };
        let source = ObjectStoreSource::from_s3_config(&config, None, "raw/a.csv", None, b',').unwrap();
        assert_eq!(source.info().location, "s3://lake/raw/a.csv");
    }
}
