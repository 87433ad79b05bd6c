//! HTTP implementation of ApiClient
//!
//! Maps every failure onto [`ApiError`] so the scheduler can classify it:
//! transport failures become `Transport`/`Timeout`, failing statuses become
//! `Server` (>= 500) or `Client`, undecodable bodies become `InvalidResponse`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{ApiClient, ApiError};
use crate::config::ApiConfig;

/// reqwest-backed API client
pub struct HttpApiClient {
    base_url: String,
    http: Client,
    timeout: Duration,
}

impl HttpApiClient {
    /// Create a new client from configuration
    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        debug!(?config, "HttpApiClient::from_config: called");
        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, method: &str, path: &str, request: RequestBuilder) -> Result<Value, ApiError> {
        debug!(%method, %path, "HttpApiClient::send: called");
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            debug!(%method, %path, status = status.as_u16(), "HttpApiClient::send: error status");
            return Err(ApiError::from_status(status.as_u16(), text));
        }

        debug!(%method, %path, status = status.as_u16(), "HttpApiClient::send: success");
        parse_body(&text)
    }

    fn transport_error(&self, error: reqwest::Error) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else if error.is_decode() {
            ApiError::InvalidResponse(error.to_string())
        } else {
            ApiError::Transport(error.to_string())
        }
    }
}

/// Empty bodies decode to `Value::Null`
fn parse_body(text: &str) -> Result<Value, ApiError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn get(&self, path: &str, params: &[(String, String)]) -> Result<Value, ApiError> {
        let request = self.http.get(self.url(path)).query(params);
        self.send("GET", path, request).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let request = self.http.post(self.url(path)).json(body);
        self.send("POST", path, request).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let request = self.http.put(self.url(path)).json(body);
        self.send("PUT", path, request).await
    }

    async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        let request = self.http.delete(self.url(path));
        self.send("DELETE", path, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned response per connection, forever
    async fn serve(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    fn client(base_url: String, timeout_ms: u64) -> HttpApiClient {
        HttpApiClient::from_config(&ApiConfig { base_url, timeout_ms }).unwrap()
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let c = client("http://localhost:8080/api/".to_string(), 1000);
        assert_eq!(c.base_url(), "http://localhost:8080/api");
        assert_eq!(c.url("/users"), "http://localhost:8080/api/users");
        assert_eq!(c.url("wallets/3"), "http://localhost:8080/api/wallets/3");
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body("").unwrap(), Value::Null);
        assert_eq!(parse_body("  \n").unwrap(), Value::Null);
        assert_eq!(parse_body(r#"{"ok":true}"#).unwrap(), json!({"ok": true}));
        assert!(matches!(parse_body("<html>"), Err(ApiError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_success_returns_json() {
        let base = serve("200 OK", r#"{"total":3}"#).await;
        let value = client(base, 5000).get("dashboard/summary", &[]).await.unwrap();
        assert_eq!(value, json!({"total": 3}));
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let base = serve("503 Service Unavailable", "down").await;
        let err = client(base, 5000).post("wallets", &json!({"name": "main"})).await.unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 503, ref message } if message == "down"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_error_status() {
        let base = serve("404 Not Found", "").await;
        let err = client(base, 5000).delete("users/42").await.unwrap_err();
        assert!(matches!(err, ApiError::Client { status: 404, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_body() {
        let base = serve("200 OK", "not json").await;
        let err = client(base, 5000).put("users/1", &json!({})).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{}", addr), 5000).get("users", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)), "{:?}", err);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let err = client(format!("http://{}", addr), 100).get("users", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout(_)), "{:?}", err);
    }
}
