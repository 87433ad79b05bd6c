//! Request scheduler
//!
//! Serializes outbound API calls through a single paced worker per instance
//! and retries transient failures with backoff.
//!
//! # Example
//!
//! ```no_run
//! use pacequeue::scheduler::{RequestScheduler, SchedulerConfig};
//! use pacequeue::api::ApiError;
//!
//! # async fn demo() {
//! let scheduler: RequestScheduler<u32, ApiError> = RequestScheduler::new(SchedulerConfig::default());
//! let handle = scheduler.submit(|| async { Ok(42) });
//! assert_eq!(handle.await.unwrap(), 42);
//! # }
//! ```

mod backoff;
mod config;
mod core;
mod handle;
mod queue;

pub use backoff::{
    BackoffConfig, BackoffPolicy, BackoffStrategy, ConstantBackoff, ExponentialBackoff, Jittered, LinearBackoff,
};
pub use config::{ConfigError, RetryPlacement, SchedulerConfig};
pub use self::core::RequestScheduler;
pub use handle::{RequestError, RequestHandle, SubmitOptions};
pub use queue::{
    QueueEntry, QueueEntryStatus, QueueState, QueuedRequest, RequestId, SchedulerStats, SchedulerStatus, Thunk,
    ThunkFuture,
};
