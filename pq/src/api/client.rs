//! ApiClient trait definition

use async_trait::async_trait;
use serde_json::Value;

use super::ApiError;

/// Remote API consumed by the views
///
/// Each call is one request/response exchange and does not retry on its own;
/// pacing and retries are the scheduler's job.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn get(&self, path: &str, params: &[(String, String)]) -> Result<Value, ApiError>;

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError>;

    async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError>;

    async fn delete(&self, path: &str) -> Result<Value, ApiError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tracing::debug;

    /// Mock API client for unit tests
    ///
    /// Replays scripted outcomes in order and records every call as
    /// `"METHOD path"`.
    pub struct ScriptedApiClient {
        responses: Mutex<VecDeque<Result<Value, ApiError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedApiClient {
        pub fn new(responses: Vec<Result<Value, ApiError>>) -> Self {
            debug!(response_count = %responses.len(), "ScriptedApiClient::new: called");
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn next(&self, method: &str, path: &str) -> Result<Value, ApiError> {
            self.calls.lock().unwrap().push(format!("{} {}", method, path));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::InvalidResponse("No more mock responses".to_string())))
        }
    }

    #[async_trait]
    impl ApiClient for ScriptedApiClient {
        async fn get(&self, path: &str, _params: &[(String, String)]) -> Result<Value, ApiError> {
            self.next("GET", path)
        }

        async fn post(&self, path: &str, _body: &Value) -> Result<Value, ApiError> {
            self.next("POST", path)
        }

        async fn put(&self, path: &str, _body: &Value) -> Result<Value, ApiError> {
            self.next("PUT", path)
        }

        async fn delete(&self, path: &str) -> Result<Value, ApiError> {
            self.next("DELETE", path)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[tokio::test]
        async fn test_mock_client_replays_responses() {
            let client = ScriptedApiClient::new(vec![
                Ok(json!({"users": []})),
                Err(ApiError::from_status(404, "not found")),
            ]);

            assert_eq!(client.get("users", &[]).await.unwrap(), json!({"users": []}));
            assert!(client.delete("wallets/9").await.is_err());
            assert_eq!(client.calls(), vec!["GET users", "DELETE wallets/9"]);
        }

        #[tokio::test]
        async fn test_mock_client_errors_when_exhausted() {
            let client = ScriptedApiClient::new(vec![]);
            let result = client.post("offerings", &json!({})).await;
            assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
        }
    }
}
