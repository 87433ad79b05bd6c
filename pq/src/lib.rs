//! pacequeue - paced, single-flight API request scheduling
//!
//! Admin console views call a remote API through a per-view queue that runs
//! one request at a time, leaves a fixed gap between dispatches, and retries
//! transient failures with exponential backoff.
//!
//! # Core Concepts
//!
//! - **Single-flight**: at most one operation executes per scheduler instance
//! - **Pacing**: a minimum interval separates consecutive dispatches
//! - **Deferred backoff**: a retrying request waits on its own timer while the
//!   queue keeps draining
//! - **Typed classification**: retry decisions come from [`ErrorKind`], not
//!   from inspecting error shapes
//!
//! # Modules
//!
//! - [`scheduler`] - RequestScheduler, backoff policies, result handles
//! - [`api`] - ApiClient trait, HTTP client, error classification
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod api;
pub mod cli;
pub mod config;
pub mod scheduler;

// Re-export commonly used types
pub use api::{ApiClient, ApiError, Classify, ErrorKind, HttpApiClient, ScheduledApi};
pub use config::{ApiConfig, Config};
pub use scheduler::{
    BackoffPolicy, RequestError, RequestHandle, RequestScheduler, RetryPlacement, SchedulerConfig, SchedulerStats,
    SchedulerStatus, SubmitOptions,
};
