//! Bilingual logging.
//!
//! [`init_tracing`] installs the process-wide `tracing` subscriber exactly once.
//! Components never touch global state directly: they receive a [`Logger`]
//! handle, which renders every [`Bilingual`] message in both languages and
//! drops anything below its threshold before it reaches `tracing`.

pub mod messages;

use crate::config::LoggingConfig;
use crate::error::PipelineError;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Severity threshold, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "critical" => Ok(Self::Error),
            other => Err(PipelineError::config(format!("unknown log level '{other}'"))),
        }
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Which language a message is rendered in first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Pt,
    En,
}

/// A message carried in Portuguese and English.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bilingual {
    pub pt: String,
    pub en: String,
}

impl Bilingual {
    pub fn new(pt: impl Into<String>, en: impl Into<String>) -> Self {
        Self {
            pt: pt.into(),
            en: en.into(),
        }
    }

    /// `"<first> / <second>"` with `first` in the given language.
    pub fn render(&self, first: Language) -> String {
        match first {
            Language::Pt => format!("{} / {}", self.pt, self.en),
            Language::En => format!("{} / {}", self.en, self.pt),
        }
    }
}

/// A message that passed the threshold, as kept by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub logger: String,
    pub level: LogLevel,
    pub message: String,
}

/// In-memory copy of everything a logger emitted.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }

    fn push(&self, record: LogRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

/// Explicitly constructed logging handle passed to each component.
#[derive(Debug, Clone)]
pub struct Logger {
    name: Arc<str>,
    threshold: LogLevel,
    primary: Language,
    sink: Option<MemorySink>,
}

impl Logger {
    pub fn new(name: impl AsRef<str>, threshold: LogLevel, primary: Language) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            threshold,
            primary,
            sink: None,
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self::new(&config.name, config.level, config.primary_language)
    }

    /// Derive a handle for a sub-component (`quickelt` -> `quickelt.ingest`).
    pub fn child(&self, component: &str) -> Self {
        Self {
            name: Arc::from(format!("{}.{component}", self.name)),
            threshold: self.threshold,
            primary: self.primary,
            sink: self.sink.clone(),
        }
    }

    /// Also keep emitted messages in memory.
    pub fn with_memory_sink(mut self) -> (Self, MemorySink) {
        let sink = MemorySink::default();
        self.sink = Some(sink.clone());
        (self, sink)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threshold(&self) -> LogLevel {
        self.threshold
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.threshold
    }

    pub fn log(&self, level: LogLevel, message: &Bilingual) {
        if !self.enabled(level) {
            return;
        }
        let text = message.render(self.primary);
        let logger = &*self.name;
        match level {
            LogLevel::Trace => tracing::trace!(logger, "{text}"),
            LogLevel::Debug => tracing::debug!(logger, "{text}"),
            LogLevel::Info => tracing::info!(logger, "{text}"),
            LogLevel::Warn => tracing::warn!(logger, "{text}"),
            LogLevel::Error => tracing::error!(logger, "{text}"),
        }
        if let Some(sink) = &self.sink {
            sink.push(LogRecord {
                timestamp: chrono::Utc::now(),
                logger: logger.to_string(),
                level,
                message: text,
            });
        }
    }

    pub fn debug(&self, message: Bilingual) {
        self.log(LogLevel::Debug, &message);
    }

    pub fn info(&self, message: Bilingual) {
        self.log(LogLevel::Info, &message);
    }

    pub fn warn(&self, message: Bilingual) {
        self.log(LogLevel::Warn, &message);
    }

    pub fn error(&self, message: Bilingual) {
        self.log(LogLevel::Error, &message);
    }
}

static TRACING_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the process-wide subscriber: a human-readable stderr layer and an
/// optional file layer, both filtered at the configured threshold.
///
/// Only the first call installs anything; later calls return `Ok(None)`. The
/// returned guard must be held for the lifetime of the process so buffered file
/// output is flushed.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>, PipelineError> {
    if TRACING_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(None);
    }

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::new(config.level.as_str()))
                .boxed(),
        );
    }

    let mut guard = None;
    if let Some(file) = &config.file {
        let (dir, file_name) = split_log_path(file)?;
        std::fs::create_dir_all(dir).map_err(|e| PipelineError::write(dir, e))?;
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(writer);
        let layer = if config.json_file {
            layer
                .json()
                .with_filter(EnvFilter::new(config.level.as_str()))
                .boxed()
        } else {
            layer
                .with_filter(EnvFilter::new(config.level.as_str()))
                .boxed()
        };
        layers.push(layer);
        guard = Some(worker_guard);
    }

    // Another subscriber may already be installed by an embedding process.
    if tracing_subscriber::registry().with(layers).try_init().is_err() {
        return Ok(None);
    }
    Ok(guard)
}

fn split_log_path(file: &Path) -> Result<(&Path, &std::ffi::OsStr), PipelineError> {
    let file_name = file
        .file_name()
        .ok_or_else(|| PipelineError::config(format!("log file '{}' has no file name", file.display())))?;
    let dir = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((dir, file_name))
}
