//! ApiClient calls routed through a RequestScheduler

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::{ApiClient, ApiError};
use crate::scheduler::{RequestHandle, RequestScheduler, SubmitOptions};

/// An API client whose calls are paced, serialized and retried
///
/// Each view owns one of these; clones share the same queue.
#[derive(Clone)]
pub struct ScheduledApi {
    client: Arc<dyn ApiClient>,
    scheduler: RequestScheduler<Value, ApiError>,
}

impl ScheduledApi {
    pub fn new(client: Arc<dyn ApiClient>, scheduler: RequestScheduler<Value, ApiError>) -> Self {
        Self { client, scheduler }
    }

    pub fn scheduler(&self) -> &RequestScheduler<Value, ApiError> {
        &self.scheduler
    }

    pub fn get(&self, path: impl Into<String>, params: Vec<(String, String)>) -> RequestHandle<Value, ApiError> {
        self.get_with(path, params, SubmitOptions::default())
    }

    pub fn get_with(
        &self,
        path: impl Into<String>,
        params: Vec<(String, String)>,
        options: SubmitOptions,
    ) -> RequestHandle<Value, ApiError> {
        let path = path.into();
        debug!(%path, "ScheduledApi::get: called");
        let client = Arc::clone(&self.client);
        self.scheduler.submit_with(
            move || {
                let client = Arc::clone(&client);
                let path = path.clone();
                let params = params.clone();
                async move { client.get(&path, &params).await }
            },
            options,
        )
    }

    pub fn post(&self, path: impl Into<String>, body: Value) -> RequestHandle<Value, ApiError> {
        self.post_with(path, body, SubmitOptions::default())
    }

    pub fn post_with(&self, path: impl Into<String>, body: Value, options: SubmitOptions) -> RequestHandle<Value, ApiError> {
        let path = path.into();
        debug!(%path, "ScheduledApi::post: called");
        let client = Arc::clone(&self.client);
        self.scheduler.submit_with(
            move || {
                let client = Arc::clone(&client);
                let path = path.clone();
                let body = body.clone();
                async move { client.post(&path, &body).await }
            },
            options,
        )
    }

    pub fn put(&self, path: impl Into<String>, body: Value) -> RequestHandle<Value, ApiError> {
        self.put_with(path, body, SubmitOptions::default())
    }

    pub fn put_with(&self, path: impl Into<String>, body: Value, options: SubmitOptions) -> RequestHandle<Value, ApiError> {
        let path = path.into();
        debug!(%path, "ScheduledApi::put: called");
        let client = Arc::clone(&self.client);
        self.scheduler.submit_with(
            move || {
                let client = Arc::clone(&client);
                let path = path.clone();
                let body = body.clone();
                async move { client.put(&path, &body).await }
            },
            options,
        )
    }

    pub fn delete(&self, path: impl Into<String>) -> RequestHandle<Value, ApiError> {
        self.delete_with(path, SubmitOptions::default())
    }

    pub fn delete_with(&self, path: impl Into<String>, options: SubmitOptions) -> RequestHandle<Value, ApiError> {
        let path = path.into();
        debug!(%path, "ScheduledApi::delete: called");
        let client = Arc::clone(&self.client);
        self.scheduler.submit_with(
            move || {
                let client = Arc::clone(&client);
                let path = path.clone();
                async move { client.delete(&path).await }
            },
            options,
        )
    }
}
