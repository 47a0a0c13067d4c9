//! Local flat files.

use super::{SourceInfo, SourceReader};
use crate::columnar::{self, FileFormat};
use crate::error::{PipelineError, Result};
use crate::table::DataTable;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;

/// CSV, JSON, JSON Lines or Parquet file on local disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
    pub format: FileFormat,
    pub delimiter: u8,
}

impl FileSource {
    /// `format` defaults to the file extension.
    pub fn new(path: PathBuf, format: Option<FileFormat>, delimiter: u8) -> Result<Self> {
        let format = match format {
            Some(f) => f,
            None => FileFormat::from_path(&path).ok_or_else(|| {
                PipelineError::invalid_input(format!(
                    "cannot tell the format of '{}' from its extension",
                    path.display()
                ))
            })?,
        };
        Ok(Self {
            path,
            format,
            delimiter,
        })
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[async_trait]
impl SourceReader for FileSource {
    async fn read(&self) -> Result<DataTable> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| PipelineError::unreachable("file", self.location(), e.to_string()))?;
        columnar::decode(Bytes::from(bytes), self.format, self.delimiter)
            .map_err(|e| PipelineError::unreachable("file", self.location(), e.to_string()))
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            kind: "file".to_string(),
            location: self.location(),
            format: self.format.token().to_string(),
        }
    }
}
