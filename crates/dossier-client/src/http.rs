//! `reqwest`-backed transport for the record service.

use std::time::Duration;

use async_trait::async_trait;
use dossier_core::{ApiRequest, ApiResponse, Method, Transport, TransportError};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::client::{ClientConfig, ClientError};

/// Carries requests to the record service over HTTPS.
///
/// The access credential travels as a bearer header. Any response the
/// service produced, including errors, is returned as an [`ApiResponse`];
/// only failures below the HTTP layer become [`TransportError`], which the
/// gateway surfaces as transient.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Builds a transport from the client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the underlying HTTP client cannot
    /// be initialized.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = build_http_client(config.connect_timeout, config.request_timeout)?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        access_token: &SecretString,
    ) -> Result<ApiResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, self.url(&request.path))
            .bearer_auth(access_token.expose_secret());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| TransportError {
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| TransportError {
            message: e.to_string(),
        })?;

        Ok(ApiResponse::new(status, decode_body(&text)))
    }
}

/// Builds the shared HTTP client with explicit timeouts.
pub(crate) fn build_http_client(
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()
        .map_err(|e| ClientError::Http {
            message: e.to_string(),
        })
}

/// Joins the service base URL and a request path.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Decodes a response body, tolerating empty and non-JSON payloads.
pub(crate) fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://api.example.test/", "/records"),
            "https://api.example.test/records"
        );
        assert_eq!(
            join_url("https://api.example.test", "records/rec-1"),
            "https://api.example.test/records/rec-1"
        );
    }

    #[test]
    fn test_decode_body_handles_empty_and_plain_text() {
        assert_eq!(decode_body(""), Value::Null);
        assert_eq!(decode_body("  "), Value::Null);
        assert_eq!(
            decode_body(r#"{"message":"ok"}"#),
            serde_json::json!({"message": "ok"})
        );
        assert_eq!(
            decode_body("Bad Gateway"),
            Value::String("Bad Gateway".to_string())
        );
    }
}
