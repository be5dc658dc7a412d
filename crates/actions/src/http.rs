//! `reqwest`-backed [`HttpClient`] for the `callExternal` action.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::collaborators::{ExternalRequest, ExternalResponse, HttpClient};
use crate::ActionError;

/// Thin wrapper around a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Build a client with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, ActionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ActionError::Fatal(format!("building http client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn request(&self, request: ExternalRequest) -> Result<ExternalResponse, ActionError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ActionError::InvalidConfig(format!("bad method '{}'", request.method)))?;

        debug!("{} {}", method, request.url);
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ActionError::Failed(format!("request to {} failed: {e}", request.url)))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ActionError::Failed(format!("reading response body: {e}")))?;

        // Non-JSON bodies come back as a plain string.
        let data = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ExternalResponse { status, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_json_and_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/orders"))
            .and(header("x-api-key", "secret"))
            .and(body_json(json!({ "id": "42" })))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "queued": true })))
            .mount(&server)
            .await;

        let client = ReqwestHttpClient::new(Duration::from_secs(5)).unwrap();
        let mut headers = BTreeMap::new();
        headers.insert("x-api-key".to_string(), "secret".to_string());

        let response = client
            .request(ExternalRequest {
                url: format!("{}/hooks/orders", server.uri()),
                method: "POST".into(),
                headers,
                body: Some(json!({ "id": "42" })),
            })
            .await
            .unwrap();

        assert_eq!(response.status, 202);
        assert!(response.is_success());
        assert_eq!(response.data, json!({ "queued": true }));
    }

    #[tokio::test]
    async fn plain_text_error_body_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = ReqwestHttpClient::new(Duration::from_secs(5)).unwrap();
        let response = client
            .request(ExternalRequest {
                url: server.uri(),
                method: "GET".into(),
                headers: BTreeMap::new(),
                body: None,
            })
            .await
            .unwrap();

        assert_eq!(response.status, 500);
        assert!(!response.is_success());
        assert_eq!(response.data, json!("boom"));
    }

    #[tokio::test]
    async fn connection_failure_is_retryable() {
        let client = ReqwestHttpClient::new(Duration::from_millis(500)).unwrap();
        let err = client
            .request(ExternalRequest {
                url: "http://127.0.0.1:1/unreachable".into(),
                method: "GET".into(),
                headers: BTreeMap::new(),
                body: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
