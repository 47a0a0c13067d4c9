//! Error types for the QuickELT pipeline.
//!
//! Every failure a run can hit is one of four kinds: the source could not be
//! read, the data was rejected by a quality rule, the destination could not be
//! written, or the configuration is unusable. Callers branch on
//! [`PipelineError::kind`] rather than on individual variants.

use std::path::PathBuf;

/// Coarse classification used for logging, notifications and exit handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceUnreachable,
    QualityRejected,
    WriteFailure,
    Configuration,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SourceUnreachable => "source_unreachable",
            Self::QualityRejected => "quality_rejected",
            Self::WriteFailure => "write_failure",
            Self::Configuration => "configuration",
        };
        f.write_str(s)
    }
}

/// Top-level error type for pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Source '{kind}' at {location} unreachable: {message}")]
    SourceUnreachable {
        kind: String,
        location: String,
        message: String,
        /// Transient failures (timeouts, 5xx, throttling) may be retried.
        transient: bool,
    },

    #[error("Quality rejected: {reason}")]
    QualityRejected { reason: String },

    #[error("Contract '{contract}' violated: {}", violations.join("; "))]
    ContractViolation {
        contract: String,
        violations: Vec<String>,
    },

    #[error("Write failed for {}: {message}", path.display())]
    WriteFailure { path: PathBuf, message: String },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    pub fn unreachable(
        kind: impl Into<String>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SourceUnreachable {
            kind: kind.into(),
            location: location.into(),
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(
        kind: impl Into<String>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SourceUnreachable {
            kind: kind.into(),
            location: location.into(),
            message: message.into(),
            transient: true,
        }
    }

    pub fn quality(reason: impl Into<String>) -> Self {
        Self::QualityRejected {
            reason: reason.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::WriteFailure {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn serialization(message: impl std::fmt::Display) -> Self {
        Self::Serialization {
            message: message.to_string(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// The error kind this failure is reported under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceUnreachable { .. } => ErrorKind::SourceUnreachable,
            Self::QualityRejected { .. } | Self::ContractViolation { .. } => {
                ErrorKind::QualityRejected
            }
            Self::WriteFailure { .. } | Self::Serialization { .. } => ErrorKind::WriteFailure,
            Self::Config(_) | Self::InvalidInput(_) => ErrorKind::Configuration,
        }
    }

    /// Only transient source failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnreachable {
                transient: true,
                ..
            }
        )
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Classify a `reqwest` failure for the given source.
pub(crate) fn from_http(kind: &str, location: &str, err: reqwest::Error) -> PipelineError {
    let transient = err.is_timeout()
        || err.is_connect()
        || err
            .status()
            .is_some_and(|s| s.is_server_error() || s.as_u16() == 429);
    PipelineError::SourceUnreachable {
        kind: kind.to_string(),
        location: location.to_string(),
        message: err.to_string(),
        transient,
    }
}

/// Classify a non-success HTTP status for the given source.
pub(crate) fn from_status(kind: &str, location: &str, status: reqwest::StatusCode) -> PipelineError {
    PipelineError::SourceUnreachable {
        kind: kind.to_string(),
        location: location.to_string(),
        message: format!("request failed with status {status}"),
        transient: status.is_server_error() || status.as_u16() == 429,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            PipelineError::unreachable("csv", "a.csv", "missing").kind(),
            ErrorKind::SourceUnreachable
        );
        assert_eq!(
            PipelineError::quality("empty").kind(),
            ErrorKind::QualityRejected
        );
        let contract = PipelineError::ContractViolation {
            contract: "products".into(),
            violations: vec!["missing column 'id'".into()],
        };
        assert_eq!(contract.kind(), ErrorKind::QualityRejected);
        assert_eq!(
            PipelineError::write("/x", "denied").kind(),
            ErrorKind::WriteFailure
        );
        assert_eq!(
            PipelineError::serialization("bad float").kind(),
            ErrorKind::WriteFailure
        );
        assert_eq!(PipelineError::config("x").kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_only_transient_source_errors_retry() {
        assert!(PipelineError::transient("api", "http://x", "timeout").is_retryable());
        assert!(!PipelineError::unreachable("api", "http://x", "404").is_retryable());
        assert!(!PipelineError::quality("empty").is_retryable());
        assert!(!PipelineError::write("/x", "denied").is_retryable());
    }

    #[test]
    fn test_status_classification() {
        let e = from_status("api", "http://x", reqwest::StatusCode::SERVICE_UNAVAILABLE);
        assert!(e.is_retryable());
        let e = from_status("api", "http://x", reqwest::StatusCode::TOO_MANY_REQUESTS);
        assert!(e.is_retryable());
        let e = from_status("api", "http://x", reqwest::StatusCode::NOT_FOUND);
        assert!(!e.is_retryable());
    }

    #[test]
    fn test_display_includes_context() {
        let e = PipelineError::write("/data/bronze/a.parquet", "permission denied");
        assert_eq!(
            e.to_string(),
            "Write failed for /data/bronze/a.parquet: permission denied"
        );
        assert_eq!(ErrorKind::QualityRejected.to_string(), "quality_rejected");
    }
}
