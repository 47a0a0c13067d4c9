//! REST API source. Fetches JSON records from an HTTP endpoint.

use super::{SourceInfo, SourceReader};
use crate::columnar::json_records;
use crate::error::{PipelineError, Result, from_http, from_status};
use crate::table::DataTable;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Join a relative endpoint to the configured base URL.
pub fn resolve_endpoint(base_url: Option<&str>, endpoint: &str) -> Result<String> {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return url::Url::parse(endpoint)
            .map(|u| u.to_string())
            .map_err(|e| PipelineError::invalid_input(format!("invalid URL '{endpoint}': {e}")));
    }
    let base = base_url.ok_or_else(|| {
        PipelineError::config(format!(
            "endpoint '{endpoint}' is relative and api.base_url is not set"
        ))
    })?;
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    );
    url::Url::parse(&joined)
        .map(|u| u.to_string())
        .map_err(|e| PipelineError::invalid_input(format!("invalid URL '{joined}': {e}")))
}

pub struct ApiSource {
    pub url: String,
    token: Option<String>,
    method: reqwest::Method,
    headers: BTreeMap<String, String>,
    body: Option<serde_json::Value>,
    results_key: String,
    client: reqwest::Client,
}

impl ApiSource {
    pub fn new(url: String, client: reqwest::Client) -> Self {
        Self {
            url,
            token: None,
            method: reqwest::Method::GET,
            headers: BTreeMap::new(),
            body: None,
            results_key: "results".to_string(),
            client,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Only `POST` is honoured besides the default `GET`.
    pub fn with_method(mut self, method: &str) -> Self {
        self.method = match method.to_uppercase().as_str() {
            "POST" => reqwest::Method::POST,
            _ => reqwest::Method::GET,
        };
        self
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Option<serde_json::Value>) -> Self {
        self.body = body;
        self
    }

    pub fn with_results_key(mut self, key: &str) -> Self {
        self.results_key = key.to_string();
        self
    }
}

#[async_trait]
impl SourceReader for ApiSource {
    async fn read(&self) -> Result<DataTable> {
        let mut request = self.client.request(self.method.clone(), &self.url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        for (k, v) in &self.headers {
            request = request.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &self.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| from_http("api", &self.url, e))?;
        if !response.status().is_success() {
            return Err(from_status("api", &self.url, response.status()));
        }
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::unreachable("api", &self.url, format!("invalid JSON body: {e}")))?;

        json_records(value, &self.results_key)
            .map_err(|e| PipelineError::unreachable("api", &self.url, e.to_string()))
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            kind: "api".to_string(),
            location: self.url.clone(),
            format: "api".to_string(),
        }
    }
}
