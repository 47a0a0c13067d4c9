//! SharePoint-hosted files, downloaded through Microsoft Graph.
//!
//! Only delimited text payloads are decoded. Authentication uses, in order, an
//! explicit token, `sharepoint.token`, or the client-credentials grant against
//! the configured tenant.

use super::{SourceInfo, SourceReader};
use crate::columnar::{self, FileFormat};
use crate::config::SharePointConfig;
use crate::error::{PipelineError, Result, from_http, from_status};
use crate::table::DataTable;
use async_trait::async_trait;
use serde::Deserialize;

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct SharePointSource {
    pub file_url: String,
    token: Option<String>,
    credentials: SharePointConfig,
    delimiter: u8,
    client: reqwest::Client,
}

impl SharePointSource {
    pub fn new(file_url: String, credentials: SharePointConfig, client: reqwest::Client) -> Self {
        Self {
            file_url,
            token: None,
            credentials,
            delimiter: b',',
            client,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.as_ref().or(self.credentials.token.as_ref()) {
            return Ok(token.clone());
        }
        let (Some(tenant), Some(client_id), Some(secret)) = (
            &self.credentials.tenant_id,
            &self.credentials.client_id,
            &self.credentials.client_secret,
        ) else {
            return Err(PipelineError::config(
                "sharepoint source needs a token or tenant_id, client_id and client_secret",
            ));
        };

        let authority = self
            .credentials
            .authority
            .as_deref()
            .unwrap_or(DEFAULT_AUTHORITY)
            .trim_end_matches('/');
        let token_url = format!("{authority}/{tenant}/oauth2/v2.0/token");
        let response = self
            .client
            .post(&token_url)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", secret.as_str()),
                ("scope", GRAPH_SCOPE),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| from_http("sharepoint", &token_url, e))?;
        if !response.status().is_success() {
            return Err(from_status("sharepoint", &token_url, response.status()));
        }
        let body: TokenResponse = response.json().await.map_err(|e| {
            PipelineError::unreachable("sharepoint", &token_url, format!("invalid token response: {e}"))
        })?;
        Ok(body.access_token)
    }
}

#[async_trait]
impl SourceReader for SharePointSource {
    async fn read(&self) -> Result<DataTable> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(&self.file_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| from_http("sharepoint", &self.file_url, e))?;
        if !response.status().is_success() {
            return Err(from_status("sharepoint", &self.file_url, response.status()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| from_http("sharepoint", &self.file_url, e))?;
        columnar::decode(bytes, FileFormat::Csv, self.delimiter)
            .map_err(|e| PipelineError::unreachable("sharepoint", &self.file_url, e.to_string()))
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            kind: "sharepoint".to_string(),
            location: self.file_url.clone(),
            format: "sharepoint".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> reqwest::Client {
        crate::source::http_client(Duration::from_secs(5), None).unwrap()
    }

    #[tokio::test]
    async fn test_client_credentials_then_download() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "graph-token",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sites/data/report.csv"))
            .and(header("authorization", "Bearer graph-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("id;region\n1;south\n2;north\n"))
            .mount(&server)
            .await;

        let credentials = SharePointConfig {
            tenant_id: Some("tenant-1".into()),
            client_id: Some("app".into()),
            client_secret: Some("secret".into()),
            authority: Some(server.uri()),
            ..Default::default()
        };
        let source = SharePointSource::new(
            format!("{}/sites/data/report.csv", server.uri()),
            credentials,
            client(),
        )
        .with_delimiter(b';');
        let table = source.read().await.unwrap();
        assert_eq!(table.columns, vec!["id", "region"]);
        assert_eq!(table.row_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let source = SharePointSource::new(
            "https://example.sharepoint.com/file.csv".into(),
            SharePointConfig::default(),
            client(),
        );
        let err = source.read().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_unauthorized_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let source = SharePointSource::new(
            format!("{}/file.csv", server.uri()),
            SharePointConfig::default(),
            client(),
        )
        .with_token(Some("expired".into()));
        let err = source.read().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceUnreachable);
        assert!(!err.is_retryable());
    }
}
