//! Run notifications through a JSON webhook.

use crate::config::NotificationConfig;
use crate::error::{ErrorKind, PipelineError, Result, from_http, from_status};
use crate::logging::{Logger, messages};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

/// Payload posted after an ingest or clean run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    /// `ingest` or `clean`.
    pub stage: String,
    pub origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl RunSummary {
    pub fn success(stage: &str, origin: &str, rows: usize, data_file: &str) -> Self {
        Self {
            status: RunStatus::Success,
            stage: stage.to_string(),
            origin: origin.to_string(),
            rows: Some(rows),
            data_file: Some(data_file.to_string()),
            error: None,
            kind: None,
        }
    }

    pub fn failure(stage: &str, origin: &str, err: &PipelineError) -> Self {
        Self {
            status: RunStatus::Failure,
            stage: stage.to_string(),
            origin: origin.to_string(),
            rows: None,
            data_file: None,
            error: Some(err.to_string()),
            kind: Some(err.kind()),
        }
    }
}

/// Posts [`RunSummary`] payloads to `notification.webhook_url`.
#[derive(Debug, Clone)]
pub struct Notifier {
    url: String,
    on_success: bool,
    on_failure: bool,
    client: reqwest::Client,
}

impl Notifier {
    /// `None` when no webhook is configured.
    pub fn from_config(config: &NotificationConfig, timeout: Duration) -> Result<Option<Self>> {
        let Some(url) = config.webhook_url.clone() else {
            return Ok(None);
        };
        let client = crate::source::http_client(timeout, None)?;
        Ok(Some(Self {
            url,
            on_success: config.on_success,
            on_failure: config.on_failure,
            client,
        }))
    }

    pub fn wants(&self, status: RunStatus) -> bool {
        match status {
            RunStatus::Success => self.on_success,
            RunStatus::Failure => self.on_failure,
        }
    }

    pub async fn send(&self, summary: &RunSummary) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(summary)
            .send()
            .await
            .map_err(|e| from_http("webhook", &self.url, e))?;
        if !response.status().is_success() {
            return Err(from_status("webhook", &self.url, response.status()));
        }
        Ok(())
    }

    /// Send if the status is enabled. Delivery failures are only logged.
    pub async fn notify(&self, summary: &RunSummary, logger: &Logger) {
        if !self.wants(summary.status) {
            return;
        }
        if let Err(e) = self.send(summary).await {
            logger.warn(messages::notification_failed(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Language, LogLevel};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(url: String, on_success: bool) -> Notifier {
        let config = NotificationConfig {
            webhook_url: Some(url),
            on_success,
            on_failure: true,
        };
        Notifier::from_config(&config, Duration::from_secs(5))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_disabled_without_webhook() {
        let config = NotificationConfig::default();
        assert!(
            Notifier::from_config(&config, Duration::from_secs(1))
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_failure_summary_is_posted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "status": "failure",
                "origin": "demo",
                "kind": "quality_rejected"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = notifier(format!("{}/hook", server.uri()), false);
        let err = PipelineError::quality("table is empty");
        let summary = RunSummary::failure("ingest", "demo", &err);
        let (logger, sink) = Logger::new("test", LogLevel::Debug, Language::En).with_memory_sink();
        notifier.notify(&summary, &logger).await;
        assert!(sink.records().is_empty());

        // success notifications are off
        notifier
            .notify(&RunSummary::success("ingest", "demo", 3, "demo.parquet"), &logger)
            .await;
    }

    #[tokio::test]
    async fn test_delivery_failure_only_warns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = notifier(format!("{}/hook", server.uri()), true);
        let (logger, sink) = Logger::new("test", LogLevel::Debug, Language::En).with_memory_sink();
        notifier
            .notify(&RunSummary::success("clean", "demo", 3, "demo.parquet"), &logger)
            .await;
        assert!(sink.contains(LogLevel::Warn, "notification"));
    }
}
