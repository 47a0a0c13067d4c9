//! SQLite database source. Loads data via a SQL query.

use super::{SourceInfo, SourceReader};
use crate::error::{PipelineError, Result};
use crate::table::{DataTable, unique_column_names};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SqliteSource {
    pub db_path: PathBuf,
    pub query: String,
}

impl SqliteSource {
    pub fn new(db_path: PathBuf, query: String) -> Self {
        Self { db_path, query }
    }

    fn location(&self) -> String {
        self.db_path.display().to_string()
    }
}

fn classify(location: &str, err: rusqlite::Error) -> PipelineError {
    let busy = matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    );
    if busy {
        PipelineError::transient("database", location, err.to_string())
    } else {
        PipelineError::unreachable("database", location, err.to_string())
    }
}

fn cell(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::from(n),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

fn query_table(db_path: &std::path::Path, query: &str) -> rusqlite::Result<DataTable> {
    let conn = rusqlite::Connection::open_with_flags(
        db_path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let mut stmt = conn.prepare(query)?;
    let column_count = stmt.column_count();
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    let mut result_rows = stmt.query([])?;
    while let Some(row) = result_rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(cell(row.get_ref(i)?));
        }
        rows.push(values);
    }
    Ok(DataTable {
        columns: unique_column_names(columns),
        rows,
    })
}

#[async_trait]
impl SourceReader for SqliteSource {
    async fn read(&self) -> Result<DataTable> {
        let location = self.location();
        if !self.db_path.exists() {
            return Err(PipelineError::unreachable(
                "database",
                location,
                "database file does not exist",
            ));
        }
        let db_path = self.db_path.clone();
        let query = self.query.clone();

        // Run blocking SQLite operations on a blocking thread
        tokio::task::spawn_blocking(move || {
            query_table(&db_path, &query).map_err(|e| classify(&location, e))
        })
        .await
        .map_err(|e| {
            PipelineError::unreachable("database", self.location(), format!("query task failed: {e}"))
        })?
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            kind: "database".to_string(),
            location: self.location(),
            format: "database".to_string(),
        }
    }
}
